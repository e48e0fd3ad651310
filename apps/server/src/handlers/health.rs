use crate::state::AppState;
use amora_storage::QuotaMode;
use axum::extract::State;
use axum::http::header;
use axum::{Json, response::IntoResponse};
use serde::Serialize;

/// Health check response
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    /// Uptime in seconds
    uptime: u64,
    media: MediaLimits,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MediaLimits {
    max_files: usize,
    quota: &'static str,
}

pub(crate) async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let body = HealthResponse {
        status: "up",
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started.elapsed().as_secs(),
        media: MediaLimits {
            max_files: state.storage.ceiling(),
            quota: match state.storage.quota_mode() {
                QuotaMode::Advisory => "advisory",
                QuotaMode::Strict => "strict",
            },
        },
    };

    (
        [
            (header::CACHE_CONTROL, "no-store, no-cache, must-revalidate"),
            (header::PRAGMA, "no-cache"),
        ],
        Json(body),
    )
}
