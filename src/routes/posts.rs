use axum::extract::rejection::QueryRejection;
use axum::extract::{Multipart, Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;

use crate::db::models::{Post, PostType};
use crate::db::posts::{self, PostQuery};
use crate::db::users;
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::media::{self, Upload};
use crate::routes::read_upload;
use crate::state::AppState;

pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 100;

// -- Forms --

/// Fields of the multipart create-post form.
#[derive(Debug, Default)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub post_type: Option<PostType>,
    pub tags: String,
    pub job_link: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub document: Option<Upload>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ListParams {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
    pub post_type: Option<PostType>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PageParams {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

// -- Router --

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list_posts).post(create_post))
        .route("/posts/{id}", get(get_post))
        .route("/posts/user/{username}", get(list_posts_by_author))
}

// -- Handlers --

async fn create_post(
    State(state): State<AppState>,
    CurrentUser(author): CurrentUser,
    multipart: Multipart,
) -> AppResult<Json<Post>> {
    let form = read_form(multipart).await?;

    if form.title.trim().is_empty() {
        return Err(AppError::BadRequest("Title is required".into()));
    }
    if form.content.trim().is_empty() {
        return Err(AppError::BadRequest("Content is required".into()));
    }
    let post_type = form
        .post_type
        .ok_or_else(|| AppError::BadRequest("Post type is required".into()))?;

    if post_type == PostType::Jobs && form.job_link.is_none() {
        return Err(AppError::BadRequest("Job link is required for job posts".into()));
    }

    let (mut document_url, mut document_name) = (None, None);
    if let Some(document) = form.document {
        if post_type == PostType::Notes {
            let stored = state
                .media
                .upload(media::DOCUMENTS, &document)
                .await
                .map_err(|e| {
                    tracing::error!("Document upload failed for @{}: {:#}", author.username, e);
                    AppError::Internal("Failed to upload document".into())
                })?;
            document_url = Some(stored.url);
            document_name = document.file_name;
        } else {
            tracing::debug!("Ignoring document attached to a {} post", post_type);
        }
    }

    let (job_link, company, location) = match post_type {
        PostType::Jobs => (form.job_link, form.company, form.location),
        _ => (None, None, None),
    };

    let now = Utc::now();
    let post = Post {
        id: uuid::Uuid::now_v7().to_string(),
        post_type,
        title: form.title,
        content: form.content,
        tags: parse_tags(&form.tags),
        author: author.author(),
        document_url,
        document_name,
        job_link,
        company,
        location,
        comments_count: 0,
        created_at: now,
        updated_at: now,
    };

    let conn = state.db.get()?;
    posts::insert(&conn, &post)?;

    tracing::info!("@{} created {} post {}", author.username, post.post_type, post.id);
    Ok(Json(post))
}

async fn list_posts(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> AppResult<Json<Vec<Post>>> {
    let Query(params) = params?;
    let (skip, limit) = validate_page(params.skip, params.limit)?;
    let search = params
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let conn = state.db.get()?;
    let posts = posts::list(
        &conn,
        &PostQuery {
            post_type: params.post_type,
            search,
            author_id: None,
            skip,
            limit,
        },
    )?;
    Ok(Json(posts))
}

async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Post>> {
    let conn = state.db.get()?;
    let post = posts::find_by_id(&conn, &id)?
        .ok_or_else(|| AppError::NotFound("Post not found".into()))?;
    Ok(Json(post))
}

async fn list_posts_by_author(
    State(state): State<AppState>,
    Path(username): Path<String>,
    params: Result<Query<PageParams>, QueryRejection>,
) -> AppResult<Json<Vec<Post>>> {
    let Query(params) = params?;
    let (skip, limit) = validate_page(params.skip, params.limit)?;

    let conn = state.db.get()?;
    let user = users::find_by_username(&conn, &username)?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    let posts = posts::list(
        &conn,
        &PostQuery {
            author_id: Some(user.id.as_str()),
            skip,
            limit,
            ..Default::default()
        },
    )?;
    Ok(Json(posts))
}

// -- Helpers --

async fn read_form(mut multipart: Multipart) -> AppResult<NewPost> {
    let mut form = NewPost::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "document" => {
                let upload = read_upload(field).await?;
                // Browsers send an empty part when no file was chosen.
                if !upload.data.is_empty() {
                    form.document = Some(upload);
                }
            }
            "title" => form.title = field.text().await?,
            "content" => form.content = field.text().await?,
            "tags" => form.tags = field.text().await?,
            "post_type" => {
                let value = field.text().await?;
                let post_type = value
                    .trim()
                    .parse::<PostType>()
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                form.post_type = Some(post_type);
            }
            "job_link" => form.job_link = non_blank(field.text().await?),
            "company" => form.company = non_blank(field.text().await?),
            "location" => form.location = non_blank(field.text().await?),
            other => {
                return Err(AppError::BadRequest(format!("Unexpected field: {}", other)));
            }
        }
    }

    Ok(form)
}

/// Split a comma-separated tag string. Entries are trimmed and blanks dropped.
pub fn parse_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

/// Resolve paging parameters, rejecting anything outside `skip >= 0`, `1 <= limit <= 100`.
pub fn validate_page(skip: Option<i64>, limit: Option<i64>) -> AppResult<(i64, i64)> {
    let skip = skip.unwrap_or(0);
    let limit = limit.unwrap_or(DEFAULT_LIMIT);
    if skip < 0 {
        return Err(AppError::BadRequest("skip must be at least 0".into()));
    }
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(AppError::BadRequest(format!(
            "limit must be between 1 and {}",
            MAX_LIMIT
        )));
    }
    Ok((skip, limit))
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
