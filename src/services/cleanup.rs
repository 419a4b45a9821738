use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio_util::time::DelayQueue;
use uuid::Uuid;

/// Longest delay accepted by the timer wheel, larger values are clamped
const MAX_DELAY: Duration = Duration::from_secs(365 * 24 * 3600);

#[derive(Error, Debug)]
pub enum CleanupError {
    #[error("Failed to remove {}: {source}", .path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Files waiting for their deferred deletion
#[derive(Debug, Clone)]
pub struct PendingDeletion {
    pub id: Uuid,
    pub paths: Vec<PathBuf>,
    pub due_at: DateTime<Utc>,
}

type PendingMap = Arc<Mutex<HashMap<Uuid, PendingDeletion>>>;

fn lock(pending: &PendingMap) -> MutexGuard<'_, HashMap<Uuid, PendingDeletion>> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Handle used by request handlers to schedule deletions
#[derive(Clone)]
pub struct CleanupScheduler {
    delay: Duration,
    jobs: mpsc::UnboundedSender<(Uuid, Duration)>,
    pending: PendingMap,
}

impl CleanupScheduler {
    pub fn new(delay: Duration, shutdown: watch::Receiver<bool>) -> (Self, CleanupWorker) {
        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        let scheduler = Self {
            delay: delay.min(MAX_DELAY),
            jobs: jobs_tx,
            pending: pending.clone(),
        };

        let worker = CleanupWorker {
            jobs: jobs_rx,
            pending,
            shutdown,
        };

        (scheduler, worker)
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedules unconditional deletion of `paths` once the delay has elapsed
    pub fn schedule(&self, paths: Vec<PathBuf>) -> Uuid {
        let id = Uuid::new_v4();
        let due_at = chrono::Duration::from_std(self.delay)
            .ok()
            .and_then(|d| Utc::now().checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        lock(&self.pending).insert(id, PendingDeletion { id, paths, due_at });

        if self.jobs.send((id, self.delay)).is_err() {
            let dropped = lock(&self.pending).remove(&id);
            tracing::warn!(
                "Cleanup worker is not running, {:?} will not be deleted",
                dropped.map(|d| d.paths).unwrap_or_default()
            );
        }

        id
    }

    pub fn pending(&self) -> Vec<PendingDeletion> {
        let mut pending: Vec<_> = lock(&self.pending).values().cloned().collect();
        pending.sort_by_key(|p| p.due_at);
        pending
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }
}

/// Background task that performs the scheduled deletions
pub struct CleanupWorker {
    jobs: mpsc::UnboundedReceiver<(Uuid, Duration)>,
    pending: PendingMap,
    shutdown: watch::Receiver<bool>,
}

impl CleanupWorker {
    pub async fn run(mut self) {
        tracing::info!("🧹 Cleanup worker started");
        let mut queue: DelayQueue<Uuid> = DelayQueue::new();

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    let left = lock(&self.pending).len();
                    tracing::info!(
                        pending = left,
                        "🛑 Cleanup worker shutting down, pending files stay in staging"
                    );
                    break;
                }
                Some((id, delay)) = self.jobs.recv() => {
                    queue.insert(id, delay);
                }
                Some(expired) = std::future::poll_fn(|cx| queue.poll_expired(cx)), if !queue.is_empty() => {
                    self.execute(expired.into_inner()).await;
                }
            }
        }
    }

    async fn execute(&self, id: Uuid) {
        let entry = lock(&self.pending).remove(&id);
        let Some(entry) = entry else {
            return;
        };

        for path in entry.paths {
            match remove_staged(path).await {
                Ok(Some(path)) => tracing::info!("Deleted staged file {}", path.display()),
                Ok(None) => {}
                Err(e) => tracing::warn!("Cleanup error: {}", e),
            }
        }
    }
}

/// Removes one file; a file that is already gone is not an error
async fn remove_staged(path: PathBuf) -> Result<Option<PathBuf>, CleanupError> {
    match tokio::fs::remove_file(&path).await {
        Ok(()) => Ok(Some(path)),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!("Staged file {} already removed", path.display());
            Ok(None)
        }
        Err(source) => Err(CleanupError::Remove { path, source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn write(dir: &std::path::Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        tokio::fs::write(&path, b"video bytes").await.unwrap();
        path
    }

    #[tokio::test]
    async fn test_deletes_after_delay() {
        let dir = tempfile::tempdir().unwrap();
        let input = write(dir.path(), "in.mp4").await;
        let output = write(dir.path(), "optimized-in.mp4").await;

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let (scheduler, worker) = CleanupScheduler::new(Duration::from_millis(100), shutdown_rx);
        tokio::spawn(worker.run());

        let id = scheduler.schedule(vec![input.clone(), output.clone()]);
        assert_eq!(scheduler.pending_count(), 1);
        assert_eq!(scheduler.pending()[0].id, id);
        assert!(input.exists() && output.exists());

        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(!input.exists());
        assert!(!output.exists());
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let present = write(dir.path(), "present.mp4").await;
        let missing = dir.path().join("never-written.mp4");

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let (scheduler, worker) = CleanupScheduler::new(Duration::from_millis(50), shutdown_rx);
        let handle = tokio::spawn(worker.run());

        // Same file twice: second removal finds nothing
        scheduler.schedule(vec![missing, present.clone()]);
        scheduler.schedule(vec![present.clone()]);

        tokio::time::sleep(Duration::from_millis(400)).await;

        assert!(!present.exists());
        assert_eq!(scheduler.pending_count(), 0);
        assert!(!handle.is_finished());
    }

    #[tokio::test]
    async fn test_shutdown_leaves_pending_files() {
        let dir = tempfile::tempdir().unwrap();
        let input = write(dir.path(), "in.mp4").await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (scheduler, worker) = CleanupScheduler::new(Duration::from_secs(3600), shutdown_rx);
        let handle = tokio::spawn(worker.run());

        scheduler.schedule(vec![input.clone()]);
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(input.exists());
        assert_eq!(scheduler.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_schedule_without_worker() {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let (scheduler, worker) = CleanupScheduler::new(Duration::from_secs(1), shutdown_rx);
        drop(worker);

        scheduler.schedule(vec![PathBuf::from("/tmp/does-not-matter.mp4")]);
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[test]
    fn test_delay_is_clamped() {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let (scheduler, _worker) = CleanupScheduler::new(Duration::MAX, shutdown_rx);
        assert_eq!(scheduler.delay(), MAX_DELAY);
    }
}
