//! Identity store: lookups and writes on the `users` table.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use crate::db::models::User;

fn find_one(conn: &Connection, column: &str, value: &str) -> rusqlite::Result<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE {} = ?1", User::COLUMNS, column);
    conn.query_row(&sql, params![value], User::from_row)
        .optional()
}

pub fn find_by_email(conn: &Connection, email: &str) -> rusqlite::Result<Option<User>> {
    find_one(conn, "email", email)
}

pub fn find_by_username(conn: &Connection, username: &str) -> rusqlite::Result<Option<User>> {
    find_one(conn, "username", username)
}

pub fn find_by_id(conn: &Connection, id: &str) -> rusqlite::Result<Option<User>> {
    find_one(conn, "id", id)
}

pub fn insert(conn: &Connection, user: &User) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO users (id, email, username, name, bio, profile_picture, password_hash, \
         reset_token, reset_token_expires, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            user.id,
            user.email,
            user.username,
            user.name,
            user.bio,
            user.profile_picture,
            user.password_hash,
            user.reset_token,
            user.reset_token_expires,
            user.created_at,
            user.updated_at,
        ],
    )?;
    Ok(())
}

/// Profile fields to overwrite. `None` leaves the stored value alone.
#[derive(Debug, Clone, Default)]
pub struct ProfileChanges<'a> {
    pub username: Option<&'a str>,
    pub name: Option<&'a str>,
    pub bio: Option<&'a str>,
    pub profile_picture: Option<&'a str>,
}

/// Applies `changes` column by column, so concurrent writers to other
/// fields are not overwritten. Pointing the picture at a different URL
/// gives up ownership of the uploaded one.
pub fn update_profile(
    conn: &Connection,
    user_id: &str,
    changes: &ProfileChanges<'_>,
    updated_at: DateTime<Utc>,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE users SET \
             username = COALESCE(?2, username), \
             name = COALESCE(?3, name), \
             bio = COALESCE(?4, bio), \
             profile_picture = COALESCE(?5, profile_picture), \
             profile_picture_media_id = CASE \
                 WHEN ?5 IS NULL OR ?5 = profile_picture THEN profile_picture_media_id \
                 ELSE NULL END, \
             updated_at = ?6 \
         WHERE id = ?1",
        params![
            user_id,
            changes.username,
            changes.name,
            changes.bio,
            changes.profile_picture,
            updated_at,
        ],
    )
}

/// Points the account at an uploaded picture and records its media id.
/// Returns the media id of the uploaded picture it replaced, if any.
pub fn set_profile_picture(
    conn: &mut Connection,
    user_id: &str,
    url: &str,
    media_id: &str,
    updated_at: DateTime<Utc>,
) -> rusqlite::Result<Option<String>> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let previous: Option<String> = tx
        .query_row(
            "SELECT profile_picture_media_id FROM users WHERE id = ?1",
            params![user_id],
            |row| row.get(0),
        )
        .optional()?
        .flatten();
    tx.execute(
        "UPDATE users SET profile_picture = ?2, profile_picture_media_id = ?3, updated_at = ?4 \
         WHERE id = ?1",
        params![user_id, url, media_id, updated_at],
    )?;
    tx.commit()?;
    Ok(previous.filter(|id| id != media_id))
}

/// Stores a reset token for the account, superseding any earlier one.
/// Returns the number of rows touched (0 when the email is unknown).
pub fn store_reset_token(
    conn: &Connection,
    email: &str,
    token: &str,
    expires: DateTime<Utc>,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE users SET reset_token = ?2, reset_token_expires = ?3 WHERE email = ?1",
        params![email, token, expires],
    )
}

pub fn find_by_reset_token(
    conn: &Connection,
    token: &str,
    now: DateTime<Utc>,
) -> rusqlite::Result<Option<User>> {
    let sql = format!(
        "SELECT {} FROM users WHERE reset_token = ?1 AND reset_token_expires > ?2",
        User::COLUMNS
    );
    conn.query_row(&sql, params![token, now], User::from_row)
        .optional()
}

/// Replaces the password hash and clears the reset token pair, but only while
/// `token` is still the account's token. Returns false if it was consumed meanwhile.
pub fn consume_reset_token(
    conn: &Connection,
    user_id: &str,
    token: &str,
    password_hash: &str,
    now: DateTime<Utc>,
) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "UPDATE users SET password_hash = ?3, updated_at = ?4, \
         reset_token = NULL, reset_token_expires = NULL \
         WHERE id = ?1 AND reset_token = ?2",
        params![user_id, token, password_hash, now],
    )?;
    Ok(changed == 1)
}

#[cfg(test)]
pub(crate) fn sample_user(email: &str, username: &str) -> User {
    let now = Utc::now();
    User {
        id: uuid::Uuid::now_v7().to_string(),
        email: email.to_string(),
        username: username.to_string(),
        name: username.to_uppercase(),
        bio: String::new(),
        profile_picture: String::new(),
        password_hash: "hash".to_string(),
        reset_token: None,
        reset_token_expires: None,
        created_at: now,
        updated_at: now,
    }
}
