use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use utoipa::ToSchema;

/// HandBrake preset used for every job
pub const HANDBRAKE_PRESET: &str = "Very Fast 1080p30";

/// ffmpeg output options: H.264 at CRF 23 / medium preset, AAC audio at 128k
pub const FFMPEG_OUTPUT_OPTIONS: &[&str] = &[
    "-c:v", "libx264", "-crf", "23", "-preset", "medium", "-c:a", "aac", "-b:a", "128k",
];

/// Bytes of stderr kept for error reports
const STDERR_TAIL: usize = 2048;

/// Encoder selected by the `method` form field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TranscodeMethod {
    #[default]
    Ffmpeg,
    Handbrake,
}

impl TranscodeMethod {
    /// Parses the form value, falling back to ffmpeg for anything unrecognized
    pub fn from_form(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "handbrake" => TranscodeMethod::Handbrake,
            "ffmpeg" => TranscodeMethod::Ffmpeg,
            other => {
                tracing::debug!("Unknown method '{}', using ffmpeg", other);
                TranscodeMethod::Ffmpeg
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TranscodeMethod::Ffmpeg => "ffmpeg",
            TranscodeMethod::Handbrake => "handbrake",
        }
    }
}

impl std::fmt::Display for TranscodeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a successful transcoding run
#[derive(Debug, Clone)]
pub struct TranscodeStats {
    pub tool: &'static str,
    pub elapsed: Duration,
}

#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("Failed to spawn {tool}: {source}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with {}: {stderr}", .code.map_or_else(|| "signal".to_string(), |c| format!("code {}", c)))]
    Failed {
        tool: &'static str,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{tool} finished but produced no output at {}", .path.display())]
    MissingOutput { tool: &'static str, path: PathBuf },
}

/// Uniform interface over the external encoders
#[async_trait::async_trait]
pub trait Transcoder: Send + Sync {
    /// Short tool name used in logs
    fn name(&self) -> &'static str;

    /// Re-encodes `input` into `output`, resolving once the tool exits
    async fn transcode(&self, input: &Path, output: &Path) -> Result<TranscodeStats, TranscodeError>;

    /// Check if the tool can be executed
    async fn is_available(&self) -> bool;
}

/// ffmpeg with a fixed H.264/AAC configuration
pub struct FfmpegTranscoder {
    binary: String,
}

impl FfmpegTranscoder {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn args(input: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-y".into(), "-i".into(), input.into()];
        args.extend(FFMPEG_OUTPUT_OPTIONS.iter().map(OsString::from));
        args.push(output.into());
        args
    }
}

#[async_trait::async_trait]
impl Transcoder for FfmpegTranscoder {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    async fn transcode(&self, input: &Path, output: &Path) -> Result<TranscodeStats, TranscodeError> {
        run_tool(self.name(), &self.binary, Self::args(input, output), output).await
    }

    async fn is_available(&self) -> bool {
        probe_version(&self.binary, "-version").await
    }
}

/// HandBrakeCLI with a fixed named preset
pub struct HandbrakeTranscoder {
    binary: String,
    preset: String,
}

impl HandbrakeTranscoder {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            preset: HANDBRAKE_PRESET.to_string(),
        }
    }

    fn args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        vec![
            "--input".into(),
            input.into(),
            "--output".into(),
            output.into(),
            "--preset".into(),
            OsString::from(&self.preset),
        ]
    }
}

#[async_trait::async_trait]
impl Transcoder for HandbrakeTranscoder {
    fn name(&self) -> &'static str {
        "handbrake"
    }

    async fn transcode(&self, input: &Path, output: &Path) -> Result<TranscodeStats, TranscodeError> {
        run_tool(self.name(), &self.binary, self.args(input, output), output).await
    }

    async fn is_available(&self) -> bool {
        probe_version(&self.binary, "--version").await
    }
}

async fn run_tool(
    tool: &'static str,
    binary: &str,
    args: Vec<OsString>,
    output_path: &Path,
) -> Result<TranscodeStats, TranscodeError> {
    let started = Instant::now();
    tracing::debug!("Running {} {:?}", binary, args);

    let output = Command::new(binary)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| TranscodeError::Spawn { tool, source })?;

    if !output.status.success() {
        return Err(TranscodeError::Failed {
            tool,
            code: output.status.code(),
            stderr: stderr_tail(&output.stderr),
        });
    }

    match tokio::fs::metadata(output_path).await {
        Ok(m) if m.is_file() => Ok(TranscodeStats {
            tool,
            elapsed: started.elapsed(),
        }),
        _ => Err(TranscodeError::MissingOutput {
            tool,
            path: output_path.to_path_buf(),
        }),
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let start = stderr.len().saturating_sub(STDERR_TAIL);
    String::from_utf8_lossy(&stderr[start..]).trim().to_string()
}

async fn probe_version(binary: &str, flag: &str) -> bool {
    Command::new(binary)
        .arg(flag)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

/// One transcoder per method; the handler only sees the trait object
#[derive(Clone)]
pub struct Transcoders {
    ffmpeg: Arc<dyn Transcoder>,
    handbrake: Arc<dyn Transcoder>,
}

impl Transcoders {
    pub fn new(ffmpeg: Arc<dyn Transcoder>, handbrake: Arc<dyn Transcoder>) -> Self {
        Self { ffmpeg, handbrake }
    }

    pub fn for_method(&self, method: TranscodeMethod) -> Arc<dyn Transcoder> {
        match method {
            TranscodeMethod::Ffmpeg => self.ffmpeg.clone(),
            TranscodeMethod::Handbrake => self.handbrake.clone(),
        }
    }
}

/// Factory function to create the external-process transcoders
pub fn create_transcoders(ffmpeg_path: &str, handbrake_path: &str) -> Transcoders {
    Transcoders::new(
        Arc::new(FfmpegTranscoder::new(ffmpeg_path)),
        Arc::new(HandbrakeTranscoder::new(handbrake_path)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_from_form() {
        assert_eq!(TranscodeMethod::from_form("ffmpeg"), TranscodeMethod::Ffmpeg);
        assert_eq!(TranscodeMethod::from_form("handbrake"), TranscodeMethod::Handbrake);
        assert_eq!(TranscodeMethod::from_form(" HandBrake "), TranscodeMethod::Handbrake);
        assert_eq!(TranscodeMethod::from_form("x265"), TranscodeMethod::Ffmpeg);
        assert_eq!(TranscodeMethod::from_form(""), TranscodeMethod::Ffmpeg);
        assert_eq!(TranscodeMethod::default(), TranscodeMethod::Ffmpeg);
    }

    #[test]
    fn test_ffmpeg_args() {
        let args = FfmpegTranscoder::args(Path::new("in.mp4"), Path::new("out.mp4"));
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec![
                "-y", "-i", "in.mp4", "-c:v", "libx264", "-crf", "23", "-preset", "medium",
                "-c:a", "aac", "-b:a", "128k", "out.mp4"
            ]
        );
    }

    #[test]
    fn test_handbrake_args() {
        let transcoder = HandbrakeTranscoder::new("HandBrakeCLI");
        let args = transcoder.args(Path::new("in.mp4"), Path::new("out.mp4"));
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec!["--input", "in.mp4", "--output", "out.mp4", "--preset", "Very Fast 1080p30"]
        );
    }

    #[test]
    fn test_stderr_tail() {
        let long = vec![b'x'; STDERR_TAIL + 100];
        assert_eq!(stderr_tail(&long).len(), STDERR_TAIL);
        assert_eq!(stderr_tail(b"  boom\n"), "boom");
    }

    #[tokio::test]
    async fn test_missing_binary_fails_to_spawn() {
        let transcoder = FfmpegTranscoder::new("/nonexistent/ffmpeg-binary");
        let err = transcoder
            .transcode(Path::new("in.mp4"), Path::new("out.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, TranscodeError::Spawn { tool: "ffmpeg", .. }));
        assert!(!transcoder.is_available().await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_is_failure() {
        let transcoder = HandbrakeTranscoder::new("false");
        let err = transcoder
            .transcode(Path::new("in.mp4"), Path::new("out.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TranscodeError::Failed { tool: "handbrake", code: Some(1), .. }
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_success_without_output_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        let transcoder = FfmpegTranscoder::new("true");
        let err = transcoder
            .transcode(Path::new("in.mp4"), &output)
            .await
            .unwrap_err();
        assert!(matches!(err, TranscodeError::MissingOutput { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_success_with_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        tokio::fs::write(&output, b"encoded").await.unwrap();
        let transcoder = FfmpegTranscoder::new("true");
        let stats = transcoder
            .transcode(Path::new("in.mp4"), &output)
            .await
            .unwrap();
        assert_eq!(stats.tool, "ffmpeg");
    }

    #[test]
    fn test_registry_selects_by_method() {
        let transcoders = create_transcoders("ffmpeg", "HandBrakeCLI");
        assert_eq!(transcoders.for_method(TranscodeMethod::Ffmpeg).name(), "ffmpeg");
        assert_eq!(transcoders.for_method(TranscodeMethod::Handbrake).name(), "handbrake");
    }
}
