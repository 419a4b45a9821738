use crate::AppState;
use crate::services::transcoder::TranscodeMethod;
use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct TranscoderHealth {
    pub ffmpeg: String,
    pub handbrake: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub staging: String,
    pub pending_cleanups: usize,
    pub transcoders: TranscoderHealth,
    pub version: String,
}

fn availability(available: bool) -> String {
    if available { "available" } else { "missing" }.to_string()
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "System health status", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let staging_status = if state.staging.is_writable().await {
        "writable"
    } else {
        "unavailable"
    };

    let ffmpeg = state.transcoders.for_method(TranscodeMethod::Ffmpeg);
    let handbrake = state.transcoders.for_method(TranscodeMethod::Handbrake);
    let (ffmpeg, handbrake) = tokio::join!(ffmpeg.is_available(), handbrake.is_available());

    Json(HealthResponse {
        status: "ok".to_string(),
        staging: staging_status.to_string(),
        pending_cleanups: state.cleanup.pending_count(),
        transcoders: TranscoderHealth {
            ffmpeg: availability(ffmpeg),
            handbrake: availability(handbrake),
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
