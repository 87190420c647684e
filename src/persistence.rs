// src/persistence.rs
use crate::storage::KeyValueStorage;
use log::{debug, error, warn};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

enum Job {
    Write { key: String, value: String },
    Flush(oneshot::Sender<()>),
}

/// Single-writer queue in front of durable storage.
///
/// Jobs are written one at a time in the order they were enqueued, so the
/// last enqueued value for a key is always the last one written.
#[derive(Clone)]
pub struct PersistenceQueue {
    sender: mpsc::UnboundedSender<Job>,
}

impl PersistenceQueue {
    /// Spawns the writer task. Must be called from within a tokio runtime.
    pub fn start(storage: Arc<dyn KeyValueStorage>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(persistence_worker(storage, receiver));
        Self { sender }
    }

    /// Never blocks; the write happens later on the worker.
    pub fn enqueue(&self, key: &str, value: String) {
        let job = Job::Write {
            key: key.to_string(),
            value,
        };
        if self.sender.send(job).is_err() {
            error!("Persistence worker is gone; dropping write for {}", key);
        }
    }

    /// Resolves once every write enqueued before this call has been attempted.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(Job::Flush(tx)).is_err() {
            warn!("Persistence worker is gone; nothing to flush");
            return;
        }
        let _ = rx.await;
    }
}

async fn persistence_worker(
    storage: Arc<dyn KeyValueStorage>,
    mut rx: mpsc::UnboundedReceiver<Job>,
) {
    while let Some(job) = rx.recv().await {
        match job {
            Job::Write { key, value } => match storage.set(&key, &value).await {
                Ok(()) => debug!("Persisted {} ({} bytes)", key, value.len()),
                Err(e) => error!("Failed to persist {}: {}", key, e),
            },
            Job::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Persistence worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[tokio::test]
    async fn test_writes_land_in_enqueue_order() {
        let storage = Arc::new(MemoryStorage::new());
        let queue = PersistenceQueue::start(storage.clone());

        for i in 0..50 {
            queue.enqueue("counter", i.to_string());
        }
        queue.flush().await;

        assert_eq!(storage.value("counter").as_deref(), Some("49"));
        assert_eq!(storage.write_count(), 50);
    }

    #[tokio::test]
    async fn test_failed_write_does_not_stop_the_worker() {
        let storage = Arc::new(MemoryStorage::new());
        let queue = PersistenceQueue::start(storage.clone());

        storage.fail_writes(true);
        queue.enqueue("key", "lost".to_string());
        queue.flush().await;
        assert_eq!(storage.value("key"), None);

        storage.fail_writes(false);
        queue.enqueue("key", "kept".to_string());
        queue.flush().await;
        assert_eq!(storage.value("key").as_deref(), Some("kept"));
    }
}
