use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

pub const NO_VIDEO_UPLOADED: &str = "No video file uploaded";
pub const EMPTY_VIDEO: &str = "Uploaded video is empty";
pub const MULTIPLE_VIDEOS: &str = "Only one video file may be uploaded";
pub const PROCESSING_FAILED: &str = "Error processing video";

/// Body of every error response
#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Multipart error: {0}")]
    Multipart(#[from] MultipartError),

    #[error("Processing error: {0:#}")]
    Processing(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Multipart(e) => {
                tracing::warn!("Rejected multipart body: {}", e);
                (e.status(), e.body_text())
            }
            AppError::Processing(e) => {
                tracing::error!("Error processing video: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    PROCESSING_FAILED.to_string(),
                )
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
