use axum::extract::DefaultBodyLimit;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::routes;
use crate::state::AppState;

/// The full HTTP surface. Stored media is served read-only under the path of
/// `media.public_url` (see [`Config::media_mount`](crate::config::Config::media_mount)).
pub fn router(state: AppState) -> Router {
    let media_root = state.config.media_path();
    let media_mount = state.config.media_mount();
    let max_body = state.config.server.max_body_bytes;

    Router::new()
        .merge(routes::health::router())
        .merge(routes::auth::router())
        .merge(routes::posts::router())
        .merge(routes::comments::router())
        .nest_service(&media_mount, ServeDir::new(media_root))
        .layer(DefaultBodyLimit::max(max_body))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
