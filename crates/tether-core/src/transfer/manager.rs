//! Task table, work queue and control operations.

use super::worker;
use super::{DownloadQueue, FileRef, TransferSnapshot, TransferStatus, TransferTask};
use crate::config::{RpcConfig, TransferConfig};
use crate::error::{Result, TetherError};
use crate::events::EventSink;
use crate::files::LocalFileStore;
use crate::messaging::{MessageStore, peer_http_client};
use crate::store::PeerStore;
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub(super) struct Inner {
    pub(super) config: TransferConfig,
    pub(super) rpc: RpcConfig,
    pub(super) local_id: String,
    pub(super) tasks: DashMap<String, TransferTask>,
    pub(super) inflight: DashMap<String, CancellationToken>,
    pub(super) peers: Arc<dyn PeerStore>,
    pub(super) files: Arc<dyn LocalFileStore>,
    pub(super) messages: Arc<dyn MessageStore>,
    pub(super) events: Arc<dyn EventSink>,
    pub(super) http: reqwest::Client,
    queue: mpsc::Sender<String>,
    snapshot: watch::Sender<TransferSnapshot>,
    pub(super) shutdown: CancellationToken,
}

impl Inner {
    /// Publish the current task set to observers.
    ///
    /// Must not be called while holding a guard into `tasks`.
    pub(super) fn publish(&self) {
        let map: BTreeMap<String, TransferTask> = self
            .tasks
            .iter()
            .map(|t| (t.key().clone(), t.value().clone()))
            .collect();
        self.snapshot.send_replace(Arc::new(map));
    }

    /// Move a pending task to downloading and register its cancel token.
    pub(super) fn claim(&self, id: &str) -> Option<(TransferTask, CancellationToken)> {
        let claimed = {
            let mut task = self.tasks.get_mut(id)?;
            if task.status != TransferStatus::Pending {
                return None;
            }
            task.status = TransferStatus::Downloading;
            task.bytes = 0;
            task.speed = 0;
            task.error = None;
            // registered under the task guard so a concurrent pause sees it
            let token = self.shutdown.child_token();
            self.inflight.insert(id.to_owned(), token.clone());
            (task.clone(), token)
        };
        self.publish();
        Some(claimed)
    }

    async fn push(&self, id: &str) -> Result<()> {
        self.queue
            .send(id.to_owned())
            .await
            .map_err(|_| TetherError::channel("transfer queue closed"))
    }
}

/// Downloads referenced files with a fixed pool of workers.
///
/// Cheap to clone; clones share the same tasks and workers.
#[derive(Clone)]
pub struct TransferManager {
    inner: Arc<Inner>,
    workers: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl TransferManager {
    /// Create the manager and spawn `config.max_concurrent` workers.
    ///
    /// Must be called inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn new(
        config: TransferConfig,
        rpc: RpcConfig,
        local_id: impl Into<String>,
        peers: Arc<dyn PeerStore>,
        files: Arc<dyn LocalFileStore>,
        messages: Arc<dyn MessageStore>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self> {
        if config.max_concurrent == 0 || config.queue_capacity == 0 {
            return Err(TetherError::invalid_config(
                "transfer workers and queue capacity must be non-zero",
            ));
        }
        let http = peer_http_client(config.connect_timeout)?;
        let (queue, rx) = mpsc::channel(config.queue_capacity);
        let (snapshot, _) = watch::channel(TransferSnapshot::default());

        let inner = Arc::new(Inner {
            config,
            rpc,
            local_id: local_id.into(),
            tasks: DashMap::new(),
            inflight: DashMap::new(),
            peers,
            files,
            messages,
            events,
            http,
            queue,
            snapshot,
            shutdown: CancellationToken::new(),
        });

        let rx = Arc::new(Mutex::new(rx));
        let workers = (0..inner.config.max_concurrent)
            .map(|n| tokio::spawn(worker::run(Arc::clone(&inner), Arc::clone(&rx), n)))
            .collect();
        info!(workers = inner.config.max_concurrent, "transfer manager started");

        Ok(Self {
            inner,
            workers: Arc::new(Mutex::new(workers)),
        })
    }

    /// Create a task for `file` unless one exists, and queue it.
    ///
    /// # Errors
    ///
    /// Returns `Channel` if the manager is shut down.
    pub async fn enqueue(&self, file: FileRef, peer_id: &str, message_id: &str) -> Result<bool> {
        let id = file.id.clone();
        match self.inner.tasks.entry(id.clone()) {
            Entry::Occupied(_) => {
                debug!(%id, "transfer already known");
                return Ok(false);
            }
            Entry::Vacant(slot) => {
                slot.insert(TransferTask::new(file, peer_id, message_id));
            }
        }
        self.inner.publish();
        self.inner.push(&id).await?;
        debug!(%id, peer_id, "transfer queued");
        Ok(true)
    }

    /// Stop a pending or downloading task. The partial file is deleted.
    ///
    /// # Errors
    ///
    /// `TransferNotFound` for unknown ids, `InvalidState` for other statuses.
    pub fn pause(&self, id: &str) -> Result<()> {
        {
            let mut task = self
                .inner
                .tasks
                .get_mut(id)
                .ok_or_else(|| TetherError::TransferNotFound(id.to_owned()))?;
            match task.status {
                TransferStatus::Downloading => {
                    if let Some((_, token)) = self.inner.inflight.remove(id) {
                        token.cancel();
                    }
                }
                TransferStatus::Pending => {}
                _ => {
                    return Err(TetherError::invalid_state(
                        "only pending or downloading transfers can be paused",
                    ));
                }
            }
            task.status = TransferStatus::Paused;
            task.speed = 0;
        }
        self.inner.publish();
        info!(id, "transfer paused");
        Ok(())
    }

    /// Requeue a paused task. The download restarts from zero.
    ///
    /// # Errors
    ///
    /// `TransferNotFound` for unknown ids, `InvalidState` unless paused.
    pub async fn resume(&self, id: &str) -> Result<()> {
        self.requeue(id, TransferStatus::Paused, "only paused transfers can be resumed")
            .await?;
        info!(id, "transfer resumed");
        Ok(())
    }

    /// Requeue a failed task with progress and error cleared.
    ///
    /// # Errors
    ///
    /// `TransferNotFound` for unknown ids, `InvalidState` unless failed.
    pub async fn retry(&self, id: &str) -> Result<()> {
        self.requeue(id, TransferStatus::Failed, "only failed transfers can be retried")
            .await?;
        info!(id, "transfer retried");
        Ok(())
    }

    async fn requeue(&self, id: &str, from: TransferStatus, refusal: &'static str) -> Result<()> {
        {
            let mut task = self
                .inner
                .tasks
                .get_mut(id)
                .ok_or_else(|| TetherError::TransferNotFound(id.to_owned()))?;
            if task.status != from {
                return Err(TetherError::invalid_state(refusal));
            }
            task.reset();
        }
        self.inner.publish();
        self.inner.push(id).await
    }

    /// Cancel any in-flight work and forget the task.
    ///
    /// # Errors
    ///
    /// `TransferNotFound` for unknown ids.
    pub fn remove(&self, id: &str) -> Result<()> {
        {
            let mut task = self
                .inner
                .tasks
                .get_mut(id)
                .ok_or_else(|| TetherError::TransferNotFound(id.to_owned()))?;
            if let Some((_, token)) = self.inner.inflight.remove(id) {
                token.cancel();
            }
            task.status = TransferStatus::Canceled;
            task.speed = 0;
        }
        self.inner.publish();
        self.inner.tasks.remove(id);
        self.inner.publish();
        info!(id, "transfer removed");
        Ok(())
    }

    /// Task by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<TransferTask> {
        self.inner.tasks.get(id).map(|t| t.value().clone())
    }

    /// Current snapshot of the live task set.
    #[must_use]
    pub fn snapshot(&self) -> TransferSnapshot {
        self.inner.snapshot.borrow().clone()
    }

    /// Observe every change of the live task set.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<TransferSnapshot> {
        self.inner.snapshot.subscribe()
    }

    /// Cancel all downloads and stop the workers.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let workers: Vec<_> = self.workers.lock().await.drain(..).collect();
        for handle in workers {
            let _ = handle.await;
        }
        info!("transfer manager stopped");
    }
}

#[async_trait]
impl DownloadQueue for TransferManager {
    async fn enqueue(&self, file: FileRef, peer_id: &str, message_id: &str) -> Result<bool> {
        TransferManager::enqueue(self, file, peer_id, message_id).await
    }
}

impl std::fmt::Debug for TransferManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferManager")
            .field("tasks", &self.inner.tasks.len())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}
