use crate::utils::validation::sanitize_filename;
use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::io::{AsyncRead, AsyncWriteExt};
use uuid::Uuid;

/// Public path prefix under which staged files are served
pub const PUBLIC_PREFIX: &str = "/videos";

/// Prefix of the file a transcoder writes next to its input
pub const OPTIMIZED_PREFIX: &str = "optimized-";

/// A video received from a client and written to the staging area
#[derive(Debug, Clone)]
pub struct UploadRecord {
    pub original_filename: String,
    pub path: PathBuf,
    pub size: u64,
}

/// Local directory holding uploaded and optimized videos until cleanup
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the staging directory if it does not exist yet
    pub async fn ensure_exists(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("Failed to create staging dir {}", self.root.display()))
    }

    /// Creates and removes a marker file to confirm uploads can be written
    pub async fn is_writable(&self) -> bool {
        let marker = self.root.join(format!(".write-check-{}", Uuid::new_v4()));
        match tokio::fs::write(&marker, b"").await {
            Ok(()) => {
                if let Err(e) = tokio::fs::remove_file(&marker).await {
                    tracing::warn!("Failed to remove {}: {}", marker.display(), e);
                }
                true
            }
            Err(e) => {
                tracing::debug!("Staging dir {} is not writable: {}", self.root.display(), e);
                false
            }
        }
    }

    /// Allocates a collision-free path for an upload: `<uuid>-<sanitized name>`
    pub fn allocate(&self, original_filename: &str) -> PathBuf {
        let name = format!("{}-{}", Uuid::new_v4(), sanitize_filename(original_filename));
        self.root.join(name)
    }

    /// Streams an upload to disk and returns its record.
    ///
    /// A partially written file is removed before the error is returned.
    pub async fn persist_upload<R>(&self, original_filename: &str, mut reader: R) -> Result<UploadRecord>
    where
        R: AsyncRead + Unpin + Send,
    {
        let path = self.allocate(original_filename);

        let written = async {
            let mut file = tokio::fs::File::create(&path).await?;
            let size = tokio::io::copy(&mut reader, &mut file).await?;
            file.flush().await?;
            Ok::<u64, std::io::Error>(size)
        }
        .await;

        match written {
            Ok(size) => Ok(UploadRecord {
                original_filename: original_filename.to_string(),
                path,
                size,
            }),
            Err(e) => {
                let _ = self.remove(&path).await;
                Err(e).with_context(|| format!("Failed to stage upload {}", path.display()))
            }
        }
    }

    /// Output path derived from an input path: `optimized-<input name>` in the same directory
    pub fn output_path_for(&self, input: &Path) -> PathBuf {
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.root.join(format!("{}{}", OPTIMIZED_PREFIX, name))
    }

    /// URL under which a staged file is served, keyed by its basename
    pub fn public_url(&self, path: &Path) -> String {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("{}/{}", PUBLIC_PREFIX, name)
    }

    pub async fn file_size(&self, path: &Path) -> Result<u64> {
        let metadata = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("Failed to stat {}", path.display()))?;
        Ok(metadata.len())
    }

    /// Removes a staged file. Returns `false` if it was already gone.
    pub async fn remove(&self, path: &Path) -> std::io::Result<bool> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Deletes regular files last modified more than `max_age` ago.
    ///
    /// Only used on startup to reclaim files a previous process scheduled
    /// for deletion but never got to remove.
    pub async fn purge_stale(&self, max_age: Duration) -> Result<usize> {
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .with_context(|| format!("Failed to read staging dir {}", self.root.display()))?;

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", entry.path().display(), e);
                    continue;
                }
            };

            if !metadata.is_file() {
                continue;
            }

            let stale = metadata.modified().map(|m| m < cutoff).unwrap_or(false);
            if !stale {
                continue;
            }

            match self.remove(&entry.path()).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!("Failed to purge {}: {}", entry.path().display(), e),
            }
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_is_unique() {
        let staging = StagingArea::new("/srv/uploads");
        let a = staging.allocate("clip.mp4");
        let b = staging.allocate("clip.mp4");
        assert_ne!(a, b);
        assert!(a.starts_with("/srv/uploads"));
        assert!(a.file_name().unwrap().to_str().unwrap().ends_with("-clip.mp4"));
    }

    #[test]
    fn test_output_path_and_url() {
        let staging = StagingArea::new("/srv/uploads");
        let input = PathBuf::from("/srv/uploads/abc-clip.mp4");
        let output = staging.output_path_for(&input);
        assert_eq!(output, PathBuf::from("/srv/uploads/optimized-abc-clip.mp4"));
        assert_eq!(staging.public_url(&input), "/videos/abc-clip.mp4");
        assert_eq!(staging.public_url(&output), "/videos/optimized-abc-clip.mp4");
    }

    #[tokio::test]
    async fn test_persist_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let staging = StagingArea::new(dir.path().join("uploads"));
        staging.ensure_exists().await.unwrap();
        assert!(staging.is_writable().await);
        assert!(tokio::fs::read_dir(staging.root()).await.unwrap().next_entry().await.unwrap().is_none());

        let content = b"not really a video".to_vec();
        let record = staging
            .persist_upload("../holiday.mov", std::io::Cursor::new(content.clone()))
            .await
            .unwrap();

        assert_eq!(record.size, content.len() as u64);
        assert_eq!(record.original_filename, "../holiday.mov");
        assert_eq!(record.path.parent().unwrap(), staging.root());
        assert_eq!(tokio::fs::read(&record.path).await.unwrap(), content);
        assert_eq!(staging.file_size(&record.path).await.unwrap(), content.len() as u64);

        assert!(staging.remove(&record.path).await.unwrap());
        assert!(!staging.remove(&record.path).await.unwrap());
        assert!(staging.file_size(&record.path).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_dir_is_not_writable() {
        let dir = tempfile::tempdir().unwrap();
        let staging = StagingArea::new(dir.path().join("never-created"));
        assert!(!staging.is_writable().await);
    }

    #[tokio::test]
    async fn test_purge_stale() {
        let dir = tempfile::tempdir().unwrap();
        let staging = StagingArea::new(dir.path());
        let leaked = dir.path().join("leaked.mp4");
        tokio::fs::write(&leaked, b"x").await.unwrap();
        tokio::fs::create_dir(dir.path().join("nested")).await.unwrap();

        // Nothing is older than an hour yet
        assert_eq!(staging.purge_stale(Duration::from_secs(3600)).await.unwrap(), 0);
        assert!(leaked.exists());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(staging.purge_stale(Duration::ZERO).await.unwrap(), 1);
        assert!(!leaked.exists());
        assert!(dir.path().join("nested").exists());
    }
}
