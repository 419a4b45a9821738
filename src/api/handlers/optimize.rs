use crate::AppState;
use crate::api::error::{AppError, EMPTY_VIDEO, MULTIPLE_VIDEOS, NO_VIDEO_UPLOADED};
use crate::services::staging::{StagingArea, UploadRecord};
use crate::services::transcoder::TranscodeMethod;
use anyhow::Context;
use axum::{
    Json,
    extract::{Multipart, State},
};
use futures::TryStreamExt;
use serde::Serialize;
use std::path::Path;
use tokio_util::io::StreamReader;
use utoipa::ToSchema;

/// Size comparison returned once a video has been re-encoded
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationResult {
    pub original_size: u64,
    pub optimized_size: u64,
    pub original_url: String,
    pub optimized_url: String,
    /// Percentage saved, two decimals
    #[schema(example = "40.00")]
    pub reduction: String,
}

/// Multipart body accepted by `POST /api/optimize`
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct OptimizeForm {
    #[schema(value_type = String, format = Binary)]
    video: Vec<u8>,
    /// Defaults to ffmpeg when absent or unrecognized
    method: Option<TranscodeMethod>,
}

/// `(original - optimized) / original * 100`, formatted with two decimals.
///
/// Grows negative when the encoder produced a larger file. An empty original yields "0.00".
pub fn reduction_percent(original: u64, optimized: u64) -> String {
    if original == 0 {
        return "0.00".to_string();
    }
    let reduction = (original as f64 - optimized as f64) / original as f64 * 100.0;
    to_fixed_2(reduction)
}

/// Two-decimal rendering that rounds halves away from zero.
///
/// `{:.2}` rounds exact ties such as 90.625 to even, which would print "90.62".
fn to_fixed_2(value: f64) -> String {
    let sign = if value < 0.0 { "-" } else { "" };
    // Long enough that the first three fractional digits are never rounded
    let expanded = format!("{:.40}", value.abs());
    let (whole, fraction) = expanded.split_once('.').unwrap_or((expanded.as_str(), ""));
    let digit = |i: usize| {
        fraction
            .as_bytes()
            .get(i)
            .map_or(0, |b| u64::from(b.saturating_sub(b'0')))
    };

    let mut hundredths = whole.parse::<u64>().unwrap_or(0) * 100 + digit(0) * 10 + digit(1);
    if digit(2) >= 5 {
        hundredths += 1;
    }
    format!("{}{}.{:02}", sign, hundredths / 100, hundredths % 100)
}

#[utoipa::path(
    post,
    path = "/api/optimize",
    request_body(content = OptimizeForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Video optimized", body = OptimizationResult),
        (status = 400, description = "No video uploaded, video empty, or more than one video", body = ErrorResponse),
        (status = 500, description = "Transcoding failed", body = ErrorResponse)
    ),
    tag = "videos"
)]
pub async fn optimize_video(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<OptimizationResult>, AppError> {
    // The job owns the staged pair, so it still schedules or discards it if the client goes away
    tokio::spawn(run_job(state, multipart))
        .await
        .map_err(|e| anyhow::anyhow!("Optimization task aborted: {}", e))?
        .map(Json)
}

async fn run_job(state: AppState, mut multipart: Multipart) -> Result<OptimizationResult, AppError> {
    let mut upload: Option<UploadRecord> = None;

    let method = match read_form(&state.staging, &mut multipart, &mut upload).await {
        Ok(method) => method,
        Err(e) => {
            if let Some(record) = &upload {
                discard(&state.staging, &[record.path.as_path()]).await;
            }
            return Err(e);
        }
    };

    let upload = upload.ok_or_else(|| AppError::Validation(NO_VIDEO_UPLOADED.to_string()))?;
    let output_path = state.staging.output_path_for(&upload.path);

    tracing::info!(
        method = %method,
        filename = %upload.original_filename,
        size = upload.size,
        "📼 Received video"
    );

    match process(&state, &upload, &output_path, method).await {
        Ok(result) => {
            state
                .cleanup
                .schedule(vec![upload.path.clone(), output_path.clone()]);
            Ok(result)
        }
        Err(e) => {
            discard(&state.staging, &[upload.path.as_path(), output_path.as_path()]).await;
            Err(e)
        }
    }
}

/// Reads the form fields, streaming the `video` file part into staging.
///
/// A second `video` file part is rejected.
async fn read_form(
    staging: &StagingArea,
    multipart: &mut Multipart,
    upload: &mut Option<UploadRecord>,
) -> Result<TranscodeMethod, AppError> {
    let mut method = TranscodeMethod::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(|s| s.to_string());

        match (name.as_str(), file_name) {
            ("video", Some(_)) if upload.is_some() => {
                return Err(AppError::Validation(MULTIPLE_VIDEOS.to_string()));
            }
            ("video", Some(file_name)) => {
                let body = field.map_err(std::io::Error::other);
                let record = staging.persist_upload(&file_name, StreamReader::new(body)).await?;
                *upload = Some(record);
            }
            ("method", None) => {
                method = TranscodeMethod::from_form(&field.text().await?);
            }
            _ => {}
        }
    }

    Ok(method)
}

async fn process(
    state: &AppState,
    upload: &UploadRecord,
    output_path: &Path,
    method: TranscodeMethod,
) -> Result<OptimizationResult, AppError> {
    let original_size = state.staging.file_size(&upload.path).await?;
    if original_size == 0 {
        return Err(AppError::Validation(EMPTY_VIDEO.to_string()));
    }

    let _permit = match &state.job_slots {
        Some(slots) => Some(
            slots
                .clone()
                .acquire_owned()
                .await
                .context("Transcoding slots closed")?,
        ),
        None => None,
    };

    let transcoder = state.transcoders.for_method(method);
    let stats = transcoder
        .transcode(&upload.path, output_path)
        .await
        .with_context(|| format!("Transcoding {} failed", upload.original_filename))?;

    let optimized_size = state.staging.file_size(output_path).await?;
    let reduction = reduction_percent(original_size, optimized_size);

    tracing::info!(
        tool = stats.tool,
        elapsed_ms = stats.elapsed.as_millis() as u64,
        original_size,
        optimized_size,
        reduction = %reduction,
        "✅ Video optimized"
    );

    Ok(OptimizationResult {
        original_size,
        optimized_size,
        original_url: state.staging.public_url(&upload.path),
        optimized_url: state.staging.public_url(output_path),
        reduction,
    })
}

async fn discard(staging: &StagingArea, paths: &[&Path]) {
    for path in paths {
        if let Err(e) = staging.remove(path).await {
            tracing::warn!("Failed to discard {}: {}", path.display(), e);
        }
    }
}
