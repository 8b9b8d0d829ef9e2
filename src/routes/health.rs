use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::db;
use crate::error::AppResult;
use crate::routes::Message;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
}

async fn index() -> Json<Message> {
    Json(Message::new("StudyHall API is running"))
}

async fn health(State(state): State<AppState>) -> AppResult<Json<Value>> {
    db::ping(&state.db)?;
    Ok(Json(json!({ "status": "ok" })))
}
