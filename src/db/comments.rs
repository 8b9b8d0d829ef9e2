//! Content store: comments.

use rusqlite::{params, Connection, OptionalExtension};

use crate::db::models::Comment;

pub fn insert(conn: &Connection, comment: &Comment) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO comments (id, post_id, parent_comment_id, content, author_id, author_name, \
         author_username, author_profile_picture, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            comment.id,
            comment.post_id,
            comment.parent_comment_id,
            comment.content,
            comment.author.author_id,
            comment.author.author_name,
            comment.author.author_username,
            comment.author.author_profile_picture,
            comment.created_at,
            comment.updated_at,
        ],
    )?;
    Ok(())
}

pub fn find_by_id(conn: &Connection, id: &str) -> rusqlite::Result<Option<Comment>> {
    let sql = format!("SELECT {} FROM comments WHERE id = ?1", Comment::COLUMNS);
    conn.query_row(&sql, params![id], Comment::from_row)
        .optional()
}

/// All comments on a post, oldest first.
pub fn list_for_post(conn: &Connection, post_id: &str) -> rusqlite::Result<Vec<Comment>> {
    let sql = format!(
        "SELECT {} FROM comments WHERE post_id = ?1 ORDER BY created_at ASC, rowid ASC",
        Comment::COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let comments = stmt
        .query_map(params![post_id], Comment::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(comments)
}
