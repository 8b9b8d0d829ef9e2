use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, State};
use axum::Json;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::password::{hash_password, verify_password};
use crate::auth::reset::generate_secure_token;
use crate::db::models::{User, UserProfile};
use crate::db::{is_unique_violation, posts, users};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::media::{self, Upload};
use crate::routes::{read_upload, Message};
use crate::state::AppState;

pub const MAX_PICTURE_BYTES: usize = 5 * 1024 * 1024;

/// Returned by forgot-password whether or not the account exists.
pub const RESET_REQUESTED: &str = "If the email exists, a password reset link has been sent";

// -- Request / response types --

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignupRequest {
    pub email: String,
    pub username: String,
    pub name: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub profile_picture: String,
    pub password: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

/// Only fields that are present are applied.
#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ProfilePatch {
    pub username: Option<String>,
    pub name: Option<String>,
    pub bio: Option<String>,
    pub profile_picture: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

// -- Handlers --

pub async fn signup(
    State(state): State<AppState>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> AppResult<Json<UserProfile>> {
    let Json(req) = payload?;
    let email = req.email.trim().to_string();
    let username = req.username.trim().to_string();
    validate_signup(&email, &username, &req.name, &req.password)?;

    {
        let conn = state.db.get()?;
        if users::find_by_email(&conn, &email)?.is_some() {
            return Err(AppError::Conflict("Email already registered".into()));
        }
        if users::find_by_username(&conn, &username)?.is_some() {
            return Err(AppError::Conflict("Username already taken".into()));
        }
    }

    let password_hash = hash_password(req.password, state.config.auth.bcrypt_cost).await?;

    let now = Utc::now();
    let user = User {
        id: uuid::Uuid::now_v7().to_string(),
        email,
        username,
        name: req.name.trim().to_string(),
        bio: req.bio,
        profile_picture: req.profile_picture,
        password_hash,
        reset_token: None,
        reset_token_expires: None,
        created_at: now,
        updated_at: now,
    };

    let conn = state.db.get()?;
    users::insert(&conn, &user).map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("Email or username already registered".into())
        } else {
            AppError::Database(e)
        }
    })?;

    tracing::info!("Created account {} ({})", user.username, user.id);
    Ok(Json(user.profile()))
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<Json<TokenResponse>> {
    let Json(req) = payload?;
    let user = {
        let conn = state.db.get()?;
        users::find_by_email(&conn, req.email.trim())?
    };
    let user = user.ok_or(AppError::Unauthorized)?;

    if !verify_password(req.password, user.password_hash.clone()).await {
        return Err(AppError::Unauthorized);
    }

    let access_token = state.tokens.issue(&user.email)?;
    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
    }))
}

pub async fn me(CurrentUser(user): CurrentUser) -> Json<UserProfile> {
    Json(user.profile())
}

pub async fn update_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    payload: Result<Json<ProfilePatch>, JsonRejection>,
) -> AppResult<Json<UserProfile>> {
    let Json(patch) = payload?;
    let username = patch.username.as_deref().map(str::trim);
    let name = patch.name.as_deref().map(str::trim);
    if username.is_some_and(str::is_empty) {
        return Err(AppError::BadRequest("Username must not be empty".into()));
    }
    if name.is_some_and(str::is_empty) {
        return Err(AppError::BadRequest("Name must not be empty".into()));
    }

    let conn = state.db.get()?;
    if let Some(username) = username {
        if let Some(owner) = users::find_by_username(&conn, username)? {
            if owner.id != user.id {
                return Err(AppError::Conflict("Username already taken".into()));
            }
        }
    }

    let changes = users::ProfileChanges {
        username,
        name,
        bio: patch.bio.as_deref(),
        profile_picture: patch.profile_picture.as_deref(),
    };
    users::update_profile(&conn, &user.id, &changes, Utc::now()).map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("Username already taken".into())
        } else {
            AppError::Database(e)
        }
    })?;

    let updated = users::find_by_id(&conn, &user.id)?.ok_or(AppError::Unauthorized)?;
    Ok(Json(updated.profile()))
}

pub async fn public_profile(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> AppResult<Json<UserProfile>> {
    let conn = state.db.get()?;
    let user = users::find_by_username(&conn, &username)?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok(Json(user.profile()))
}

pub async fn forgot_password(
    State(state): State<AppState>,
    payload: Result<Json<ForgotPasswordRequest>, JsonRejection>,
) -> AppResult<Json<Message>> {
    let Json(req) = payload?;
    let user = {
        let conn = state.db.get()?;
        users::find_by_email(&conn, req.email.trim())?
    };

    if let Some(user) = user {
        let token = generate_secure_token();
        let expires = Utc::now() + Duration::hours(state.config.auth.reset_token_hours);

        let stored = {
            let conn = state.db.get()?;
            users::store_reset_token(&conn, &user.email, &token, expires)
        };
        match stored {
            Ok(1) => {}
            Ok(n) => {
                tracing::error!("Reset token stored on {} rows for {}", n, user.id);
                return Err(AppError::Internal(
                    "Failed to process password reset request".into(),
                ));
            }
            Err(e) => {
                tracing::error!("Failed to store reset token for {}: {}", user.id, e);
                return Err(AppError::Internal(
                    "Failed to process password reset request".into(),
                ));
            }
        }

        if let Err(e) = state
            .mailer
            .send_password_reset(&user.email, &user.name, &token)
            .await
        {
            tracing::error!("Failed to send password reset email for {}: {}", user.id, e);
            return Err(AppError::Internal(
                "Failed to send password reset email".into(),
            ));
        }
    } else {
        tracing::debug!("Password reset requested for unknown email");
    }

    Ok(Json(Message::new(RESET_REQUESTED)))
}

pub async fn reset_password(
    State(state): State<AppState>,
    payload: Result<Json<ResetPasswordRequest>, JsonRejection>,
) -> AppResult<Json<Message>> {
    let Json(req) = payload?;
    if req.new_password.trim().is_empty() {
        return Err(AppError::BadRequest("Password must not be empty".into()));
    }

    let user = {
        let conn = state.db.get()?;
        users::find_by_reset_token(&conn, &req.token, Utc::now())?
    };
    let user = user.ok_or_else(invalid_reset_token)?;

    let password_hash = hash_password(req.new_password, state.config.auth.bcrypt_cost).await?;

    let conn = state.db.get()?;
    if !users::consume_reset_token(&conn, &user.id, &req.token, &password_hash, Utc::now())? {
        return Err(invalid_reset_token());
    }

    tracing::info!("Password reset for {}", user.id);
    Ok(Json(Message::new("Password has been reset successfully")))
}

pub async fn update_profile_picture(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    mut multipart: Multipart,
) -> AppResult<Json<UserProfile>> {
    let mut file: Option<Upload> = None;
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => file = Some(read_upload(field).await?),
            other => return Err(AppError::BadRequest(format!("Unexpected field: {}", other))),
        }
    }
    let file = file.ok_or_else(|| AppError::BadRequest("File is required".into()))?;
    validate_picture(&file)?;

    let stored = state
        .media
        .upload(media::PROFILE_PICTURES, &file)
        .await
        .map_err(|e| {
            tracing::error!("Profile picture upload failed for {}: {:#}", user.id, e);
            AppError::Internal("Failed to upload profile picture".into())
        })?;

    let (replaced, user) = {
        let mut conn = state.db.get()?;
        let replaced =
            users::set_profile_picture(&mut conn, &user.id, &stored.url, &stored.id, Utc::now())?;
        let user = users::find_by_id(&conn, &user.id)?.ok_or(AppError::Unauthorized)?;
        (replaced, user)
    };

    // Only pictures uploaded here are ever removed; a hand-set URL is left alone.
    if let Some(id) = replaced {
        if let Err(e) = state.media.delete(&id).await {
            tracing::warn!("Could not delete old profile picture {}: {:#}", id, e);
        }
    }

    let propagated = state
        .db
        .get()
        .map_err(AppError::from)
        .and_then(|conn| {
            posts::update_author_picture(&conn, &user.username, &stored.url).map_err(AppError::from)
        });
    match propagated {
        Ok(n) => tracing::info!("Updated profile picture on {} posts by @{}", n, user.username),
        Err(e) => tracing::warn!(
            "Could not update posts by @{} with new profile picture: {}",
            user.username,
            e
        ),
    }

    Ok(Json(user.profile()))
}

// -- Validation --

fn validate_signup(email: &str, username: &str, name: &str, password: &str) -> AppResult<()> {
    if !looks_like_email(email) {
        return Err(AppError::BadRequest("Invalid email address".into()));
    }
    if username.is_empty() {
        return Err(AppError::BadRequest("Username is required".into()));
    }
    if name.trim().is_empty() {
        return Err(AppError::BadRequest("Name is required".into()));
    }
    if password.trim().is_empty() {
        return Err(AppError::BadRequest("Password is required".into()));
    }
    Ok(())
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

fn validate_picture(file: &Upload) -> AppResult<()> {
    let is_image = file
        .content_type
        .as_deref()
        .is_some_and(|ct| ct.starts_with("image/"));
    if !is_image {
        return Err(AppError::BadRequest("File must be an image".into()));
    }
    if file.data.len() > MAX_PICTURE_BYTES {
        return Err(AppError::BadRequest("File size must be less than 5MB".into()));
    }
    Ok(())
}

fn invalid_reset_token() -> AppError {
    AppError::BadRequest("Invalid or expired reset token".into())
}
