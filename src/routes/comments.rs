use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;

use crate::db::models::Comment;
use crate::db::{comments, posts};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::state::AppState;
use crate::thread::{build_forest, CommentThread};

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewComment {
    pub post_id: String,
    pub content: String,
    #[serde(default)]
    pub parent_comment_id: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/comments", post(create_comment))
        .route("/comments/{post_id}", get(list_comments))
}

async fn create_comment(
    State(state): State<AppState>,
    CurrentUser(author): CurrentUser,
    payload: Result<Json<NewComment>, JsonRejection>,
) -> AppResult<Json<CommentThread>> {
    let Json(req) = payload?;
    if req.content.trim().is_empty() {
        return Err(AppError::BadRequest("Content is required".into()));
    }
    let parent_comment_id = req.parent_comment_id.filter(|id| !id.is_empty());

    let conn = state.db.get()?;
    if posts::find_by_id(&conn, &req.post_id)?.is_none() {
        return Err(AppError::NotFound("Post not found".into()));
    }
    if let Some(parent_id) = parent_comment_id.as_deref() {
        let parent = comments::find_by_id(&conn, parent_id)?
            .ok_or_else(|| AppError::NotFound("Parent comment not found".into()))?;
        if parent.post_id != req.post_id {
            return Err(AppError::BadRequest(
                "Parent comment belongs to a different post".into(),
            ));
        }
    }

    let now = Utc::now();
    let comment = Comment {
        id: uuid::Uuid::now_v7().to_string(),
        post_id: req.post_id,
        parent_comment_id,
        content: req.content,
        author: author.author(),
        created_at: now,
        updated_at: now,
    };
    comments::insert(&conn, &comment)?;

    // The counter is a separate write; a failure here leaves an undercount.
    match posts::increment_comment_count(&conn, &comment.post_id) {
        Ok(1) => {}
        Ok(_) => tracing::warn!("Post {} vanished before its comment count was bumped", comment.post_id),
        Err(e) => tracing::error!("Failed to bump comment count on {}: {}", comment.post_id, e),
    }

    Ok(Json(CommentThread::leaf(comment)))
}

async fn list_comments(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> AppResult<Json<Vec<CommentThread>>> {
    let conn = state.db.get()?;
    if posts::find_by_id(&conn, &post_id)?.is_none() {
        return Err(AppError::NotFound("Post not found".into()));
    }
    let comments = comments::list_for_post(&conn, &post_id)?;
    Ok(Json(build_forest(comments)))
}
