use axum::routing::{get, post, put};
use axum::Router;

use crate::auth::handlers;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(handlers::signup))
        .route("/auth/login", post(handlers::login))
        .route("/auth/me", get(handlers::me))
        .route("/auth/profile", put(handlers::update_profile))
        .route("/auth/profile/picture", post(handlers::update_profile_picture))
        .route("/auth/user/{username}", get(handlers::public_profile))
        .route("/auth/forgot-password", post(handlers::forgot_password))
        .route("/auth/reset-password", post(handlers::reset_password))
}
