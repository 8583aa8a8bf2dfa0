//! Transfer manager
//!
//! Downloads files referenced by received messages from the sending peer's
//! `/fs` endpoint.
//!
//! ```text
//!             enqueue            claim
//!   (none) ───────────► Pending ───────► Downloading ──► Completed
//!                        ▲   │               │ │ └─────► Failed ──┐
//!               resume   │   │ pause   pause │ └───────► Canceled │ retry
//!                        │   ▼               ▼                    │
//!                        └─ Paused ◄─────────┘       Pending ◄────┘
//! ```
//!
//! Completed and canceled tasks leave the live set; paused and failed tasks
//! stay visible until resumed, retried or removed.

mod manager;
mod worker;

pub use manager::TransferManager;

use crate::error::{Result, TetherError};
use crate::files::LocalFileStore;
use crate::store::PeerStore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// A file offered by a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRef {
    /// Remote file id
    pub id: String,
    /// File name
    pub name: String,
    /// Announced size in bytes
    pub size: u64,
}

/// Lifecycle of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransferStatus {
    /// Waiting for a worker
    Pending,
    /// Streaming to disk
    Downloading,
    /// Stopped by the user; resumable
    Paused,
    /// Finished with the full size
    Completed,
    /// Stopped by an error; retryable
    Failed,
    /// Removed by the user
    Canceled,
}

impl TransferStatus {
    /// Whether no further transitions are possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Canceled)
    }
}

/// One download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferTask {
    /// Task id, equal to the remote file id
    pub id: String,
    /// What is downloaded
    pub file: FileRef,
    /// Peer serving the file
    pub peer_id: String,
    /// Message referencing the file
    pub message_id: String,
    /// Current status
    pub status: TransferStatus,
    /// Bytes written so far
    pub bytes: u64,
    /// Last throughput sample in bytes/s
    pub speed: u64,
    /// Error of the last failure
    pub error: Option<String>,
    /// Destination once allocated
    pub local_path: Option<PathBuf>,
}

impl TransferTask {
    pub(crate) fn new(file: FileRef, peer_id: &str, message_id: &str) -> Self {
        Self {
            id: file.id.clone(),
            file,
            peer_id: peer_id.to_owned(),
            message_id: message_id.to_owned(),
            status: TransferStatus::Pending,
            bytes: 0,
            speed: 0,
            error: None,
            local_path: None,
        }
    }

    /// Reset progress for another attempt.
    pub(crate) fn reset(&mut self) {
        self.status = TransferStatus::Pending;
        self.bytes = 0;
        self.speed = 0;
        self.error = None;
        self.local_path = None;
    }
}

/// Immutable view of the live task set.
pub type TransferSnapshot = Arc<BTreeMap<String, TransferTask>>;

/// Something downloads can be queued on.
#[async_trait]
pub trait DownloadQueue: Send + Sync {
    /// Queue `file` from `peer_id` for `message_id`. Returns `false` if a task
    /// for that file already exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue is shut down.
    async fn enqueue(&self, file: FileRef, peer_id: &str, message_id: &str) -> Result<bool>;
}

/// Resolve a `/fs?id=` request from `caller_id` to a local path.
///
/// The caller must be a paired peer and the id must have been registered with
/// [`LocalFileStore::file_id_for`].
///
/// # Errors
///
/// `PeerNotFound`/`NotPaired` for unauthorized callers (403) and
/// `TransferNotFound` for unknown ids (404).
pub fn resolve_file_request(
    peers: &dyn PeerStore,
    files: &dyn LocalFileStore,
    caller_id: &str,
    file_id: &str,
) -> Result<PathBuf> {
    let caller = peers
        .get(caller_id)
        .ok_or_else(|| TetherError::PeerNotFound(caller_id.to_owned()))?;
    caller.paired_keys()?;
    files
        .resolve(file_id)
        .ok_or_else(|| TetherError::TransferNotFound(file_id.to_owned()))
}
