use crate::config::AppConfig;
use crate::services::staging::StagingArea;
use anyhow::Result;
use std::sync::Arc;
use tracing::info;

pub async fn setup_staging(config: &AppConfig) -> Result<Arc<StagingArea>> {
    let staging = StagingArea::new(&config.staging_dir);
    staging.ensure_exists().await?;
    info!("📁 Staging area: {}", staging.root().display());

    if config.purge_stale_on_startup {
        let removed = staging.purge_stale(config.cleanup_delay).await?;
        info!("🧹 Purged {} stale file(s) left by a previous run", removed);
    }

    Ok(Arc::new(staging))
}
