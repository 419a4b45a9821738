use std::path::Path;

/// Longest basename kept from a client-supplied filename, in bytes
pub const MAX_FILENAME_LEN: usize = 120;

/// Extension appended when the upload carries none, so encoders can pick a container
pub const DEFAULT_EXTENSION: &str = "mp4";

const FALLBACK_STEM: &str = "video";

/// Turns a client-supplied filename into a basename that is safe to stage on disk
/// and to embed in a `/videos/<name>` URL.
///
/// Path components are dropped, anything outside `[A-Za-z0-9._-]` becomes `_`,
/// leading dots are stripped and the result always carries an extension.
pub fn sanitize_filename(filename: &str) -> String {
    // Only the last component; both separators count regardless of platform
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    if name.contains("..") || filename.contains('/') || filename.contains('\\') {
        tracing::debug!("Stripped path components from upload name: {}", filename);
    }

    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let sanitized = sanitized.trim_start_matches('.');

    let (stem, ext) = match Path::new(sanitized).extension().and_then(|e| e.to_str()) {
        Some(ext) if !ext.is_empty() && ext.len() < sanitized.len() => {
            (&sanitized[..sanitized.len() - ext.len() - 1], ext.to_lowercase())
        }
        _ => (sanitized.trim_end_matches('.'), DEFAULT_EXTENSION.to_string()),
    };

    let stem = if stem.is_empty() { FALLBACK_STEM } else { stem };

    // ASCII only at this point, so any byte index is a char boundary
    let budget = MAX_FILENAME_LEN.saturating_sub(ext.len() + 1);
    let stem = &stem[..stem.len().min(budget)];

    format!("{}.{}", stem, ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("clip.mp4"), "clip.mp4");
        assert_eq!(sanitize_filename("my clip.MOV"), "my_clip.mov");
        assert_eq!(sanitize_filename("test<script>.webm"), "test_script_.webm");
        assert_eq!(sanitize_filename("日本語.mp4"), "___.mp4");
    }

    #[test]
    fn test_sanitize_strips_paths() {
        assert_eq!(sanitize_filename("../../../etc/passwd"), "passwd.mp4");
        assert_eq!(sanitize_filename("..\\..\\videos\\holiday.mkv"), "holiday.mkv");
        assert_eq!(sanitize_filename("/abs/path/clip.avi"), "clip.avi");
    }

    #[test]
    fn test_sanitize_hidden_and_empty() {
        assert_eq!(sanitize_filename(".hidden.mp4"), "hidden.mp4");
        assert_eq!(sanitize_filename(".mp4"), "mp4.mp4");
        assert_eq!(sanitize_filename(""), "video.mp4");
        assert_eq!(sanitize_filename("dir/"), "video.mp4");
        assert_eq!(sanitize_filename("..."), "video.mp4");
    }

    #[test]
    fn test_sanitize_adds_extension() {
        assert_eq!(sanitize_filename("recording"), "recording.mp4");
        assert_eq!(sanitize_filename("recording."), "recording.mp4");
    }

    #[test]
    fn test_sanitize_limits_length() {
        let long = format!("{}.mp4", "a".repeat(500));
        let sanitized = sanitize_filename(&long);
        assert_eq!(sanitized.len(), MAX_FILENAME_LEN);
        assert!(sanitized.ends_with(".mp4"));
    }
}
