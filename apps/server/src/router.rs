use crate::handlers::{health, media};
use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use tower_http::trace::TraceLayer;

pub(crate) const API_PREFIX: &str = "/api";

pub(crate) fn init(state: AppState) -> Router {
    let body_limit = state.config.server.body_limit;

    let api: Router<AppState> = Router::new()
        .route("/resource", get(media::get_resource))
        .route(
            "/uploads",
            get(media::list_uploads).post(media::upload_one).delete(media::delete_upload),
        )
        .route("/uploads/all", delete(media::delete_all))
        .route("/uploads/multi", post(media::upload_many));

    Router::new()
        .route("/health", get(health::health_handler))
        .nest(API_PREFIX, api)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
