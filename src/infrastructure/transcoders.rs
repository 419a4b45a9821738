use crate::config::AppConfig;
use crate::services::transcoder::{TranscodeMethod, Transcoders, create_transcoders};
use tracing::{info, warn};

pub async fn setup_transcoders(config: &AppConfig) -> Transcoders {
    let transcoders = create_transcoders(&config.ffmpeg_path, &config.handbrake_path);

    for method in [TranscodeMethod::Ffmpeg, TranscodeMethod::Handbrake] {
        if transcoders.for_method(method).is_available().await {
            info!("🎬 {} is available", method);
        } else {
            warn!("⚠️  {} could not be executed, requests using it will fail", method);
        }
    }

    transcoders
}
