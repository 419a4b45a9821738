use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration for the optimizer service
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Bind address (default: "0.0.0.0")
    pub host: String,

    /// Bind port (default: 3000)
    pub port: u16,

    /// Directory holding uploaded and optimized videos (default: "./uploads")
    pub staging_dir: PathBuf,

    /// Directory holding the presentation bundle (default: "client/dist")
    pub static_dir: PathBuf,

    /// Delay before staged files are deleted (default: 1 hour)
    pub cleanup_delay: Duration,

    /// Maximum multipart body size in bytes (default: 2 GiB)
    pub max_upload_size: usize,

    /// ffmpeg binary (default: "ffmpeg")
    pub ffmpeg_path: String,

    /// HandBrake command line binary (default: "HandBrakeCLI")
    pub handbrake_path: String,

    /// Concurrent transcoding jobs, 0 means unbounded (default: 0)
    pub max_concurrent_jobs: usize,

    /// Remove files leaked by a previous process on startup (default: false)
    pub purge_stale_on_startup: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            staging_dir: PathBuf::from("./uploads"),
            static_dir: PathBuf::from("client/dist"),
            cleanup_delay: Duration::from_secs(3600),
            max_upload_size: 2 * 1024 * 1024 * 1024, // 2 GiB
            ffmpeg_path: "ffmpeg".to_string(),
            handbrake_path: "HandBrakeCLI".to_string(),
            max_concurrent_jobs: 0,
            purge_stale_on_startup: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            host: env::var("HOST").unwrap_or(default.host),

            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.port),

            staging_dir: env::var("STAGING_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.staging_dir),

            static_dir: env::var("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.static_dir),

            cleanup_delay: env::var("CLEANUP_DELAY_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.cleanup_delay),

            max_upload_size: env::var("MAX_UPLOAD_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_upload_size),

            ffmpeg_path: env::var("FFMPEG_PATH").unwrap_or(default.ffmpeg_path),

            handbrake_path: env::var("HANDBRAKE_PATH").unwrap_or(default.handbrake_path),

            max_concurrent_jobs: env::var("MAX_CONCURRENT_JOBS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_concurrent_jobs),

            purge_stale_on_startup: env::var("PURGE_STALE_ON_STARTUP")
                .map(|v| parse_flag(&v))
                .unwrap_or(default.purge_stale_on_startup),
        }
    }

    /// Config rooted at the given staging directory, used by tests and local runs
    pub fn with_staging_dir(staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            ..Self::default()
        }
    }

    /// Whether transcoding is limited to a fixed number of concurrent jobs
    pub fn is_bounded(&self) -> bool {
        self.max_concurrent_jobs > 0
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
