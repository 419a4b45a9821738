pub mod api;
pub mod config;
pub mod infrastructure;
pub mod services;
pub mod utils;

use crate::config::AppConfig;
use crate::services::cleanup::CleanupScheduler;
use crate::services::staging::{PUBLIC_PREFIX, StagingArea};
use crate::services::transcoder::Transcoders;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::optimize::optimize_video,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            api::handlers::optimize::OptimizationResult,
            api::handlers::optimize::OptimizeForm,
            api::error::ErrorResponse,
            services::transcoder::TranscodeMethod,
            api::handlers::health::HealthResponse,
            api::handlers::health::TranscoderHealth,
        )
    ),
    tags(
        (name = "videos", description = "Video optimization endpoints"),
        (name = "system", description = "Service status")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub staging: Arc<StagingArea>,
    pub transcoders: Transcoders,
    pub cleanup: CleanupScheduler,
    /// Present only when `max_concurrent_jobs` bounds transcoding
    pub job_slots: Option<Arc<Semaphore>>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        staging: Arc<StagingArea>,
        transcoders: Transcoders,
        cleanup: CleanupScheduler,
    ) -> Self {
        let job_slots = config
            .is_bounded()
            .then(|| Arc::new(Semaphore::new(config.max_concurrent_jobs)));

        Self {
            config,
            staging,
            transcoders,
            cleanup,
            job_slots,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    let static_dir = state.config.static_dir.clone();
    let presentation =
        ServeDir::new(&static_dir).fallback(ServeFile::new(static_dir.join("index.html")));

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &axum::http::Request<_>| {
            let request_id = request
                .headers()
                .get(&api::middleware::request_id::REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id,
            )
        })
        .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
            info!("📥 {} {}", request.method(), request.uri());
        })
        .on_response(
            |response: &axum::http::Response<_>,
             latency: std::time::Duration,
             _span: &tracing::Span| {
                info!(
                    "📤 Finished in {:?} with status {}",
                    latency,
                    response.status()
                );
            },
        );

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route(
            "/api/optimize",
            post(api::handlers::optimize::optimize_video)
                .layer(DefaultBodyLimit::max(state.config.max_upload_size)),
        )
        .nest_service(PUBLIC_PREFIX, ServeDir::new(state.staging.root()))
        .fallback_service(presentation)
        .layer(trace_layer)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any),
        )
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .with_state(state)
}
