//! Download workers.

use super::manager::Inner;
use super::{TransferStatus, TransferTask};
use crate::error::TetherError;
use crate::events::Event;
use crate::messaging::envelope::{CALLER_ID_HEADER, FILE_PATH};
use crate::messaging::{ensure_lan, peer_endpoint};
use futures_util::TryStreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{Mutex, mpsc};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Why a download stopped early.
enum Stop {
    /// Paused or removed; not an error
    Aborted,
    Failed(TetherError),
}

impl From<TetherError> for Stop {
    fn from(e: TetherError) -> Self {
        Stop::Failed(e)
    }
}

impl From<std::io::Error> for Stop {
    fn from(e: std::io::Error) -> Self {
        Stop::Failed(e.into())
    }
}

impl From<reqwest::Error> for Stop {
    fn from(e: reqwest::Error) -> Self {
        Stop::Failed(e.into())
    }
}

/// Worker loop: take ids off the shared queue until shutdown.
pub(super) async fn run(inner: Arc<Inner>, queue: Arc<Mutex<mpsc::Receiver<String>>>, n: usize) {
    debug!(worker = n, "transfer worker started");
    loop {
        let next = {
            let mut rx = queue.lock().await;
            tokio::select! {
                () = inner.shutdown.cancelled() => None,
                id = rx.recv() => id,
            }
        };
        let Some(id) = next else { break };
        process(&inner, &id).await;
    }
    debug!(worker = n, "transfer worker stopped");
}

async fn process(inner: &Inner, id: &str) {
    let Some((task, token)) = inner.claim(id) else {
        debug!(id, "skipping transfer that is no longer pending");
        return;
    };
    info!(id, name = %task.file.name, size = task.file.size, "download started");

    let mut partial: Option<PathBuf> = None;
    let outcome = tokio::select! {
        biased;
        () = token.cancelled() => Err(Stop::Aborted),
        result = download(inner, &task, &mut partial) => result,
    };

    match outcome {
        Ok(path) => {
            if !complete(inner, &task, &path, &token) {
                discard(partial.as_deref()).await;
            }
        }
        Err(Stop::Aborted) => {
            debug!(id, "download aborted");
            discard(partial.as_deref()).await;
        }
        Err(Stop::Failed(error)) => {
            discard(partial.as_deref()).await;
            fail(inner, id, &error, &token);
        }
    }
}

async fn discard(path: Option<&Path>) {
    if let Some(path) = path {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), "could not delete partial download: {e}");
            }
        }
    }
}

async fn download(
    inner: &Inner,
    task: &TransferTask,
    partial: &mut Option<PathBuf>,
) -> std::result::Result<PathBuf, Stop> {
    let peer = inner
        .peers
        .get(&task.peer_id)
        .ok_or_else(|| TetherError::PeerNotFound(task.peer_id.clone()))?;
    peer.paired_keys()?;
    ensure_lan(&inner.rpc, &peer)?;

    let mut url = peer_endpoint(&inner.rpc.scheme, peer.ip, peer.port, FILE_PATH)?;
    url.query_pairs_mut().append_pair("id", &task.id);

    let path = inner.files.allocate_download_path(&task.file.name)?;
    *partial = Some(path.clone());
    if let Some(mut t) = inner.tasks.get_mut(&task.id) {
        t.local_path = Some(path.clone());
    }

    let response = inner
        .http
        .get(url)
        .header(CALLER_ID_HEADER, &inner.local_id)
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() {
        return Err(TetherError::HttpStatus {
            status: status.as_u16(),
        }
        .into());
    }

    let stream = response.bytes_stream().map_err(std::io::Error::other);
    let mut reader = StreamReader::new(stream);
    let mut file = tokio::fs::File::create(&path).await?;
    let mut buf = vec![0u8; inner.config.read_chunk_size];

    let mut received: u64 = 0;
    let mut window_start = Instant::now();
    let mut window_bytes: u64 = 0;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        received += n as u64;
        if received > task.file.size {
            return Err(TetherError::SizeMismatch {
                expected: task.file.size,
                received,
            }
            .into());
        }
        file.write_all(&buf[..n]).await?;
        window_bytes += n as u64;

        let elapsed = window_start.elapsed();
        if elapsed >= inner.config.progress_interval {
            let millis = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX).max(1);
            let speed = window_bytes.saturating_mul(1000) / millis;
            progress(inner, task, received, Some(speed));
            window_start = Instant::now();
            window_bytes = 0;
        } else {
            progress(inner, task, received, None);
        }
    }
    file.flush().await?;
    file.sync_all().await?;

    if received != task.file.size {
        return Err(TetherError::SizeMismatch {
            expected: task.file.size,
            received,
        }
        .into());
    }
    Ok(path)
}

/// Record cumulative bytes; publish and emit when a speed sample is taken.
fn progress(inner: &Inner, task: &TransferTask, bytes: u64, speed: Option<u64>) {
    {
        let Some(mut t) = inner.tasks.get_mut(&task.id) else {
            return;
        };
        if t.status != TransferStatus::Downloading {
            return;
        }
        t.bytes = bytes;
        if let Some(speed) = speed {
            t.speed = speed;
        }
    }
    if let Some(speed) = speed {
        inner.publish();
        inner.events.emit(Event::TransferProgress {
            id: task.id.clone(),
            bytes,
            total: task.file.size,
            speed,
        });
    }
}

/// Whether `token` is still the live attempt for the task behind `t`.
///
/// Pause and remove cancel the token while holding the task entry, so under
/// that entry an uncancelled token is the one registered in `inflight`.
fn owns(t: &TransferTask, token: &CancellationToken) -> bool {
    t.status == TransferStatus::Downloading && !token.is_cancelled()
}

/// Mark completed and hand the file over. Returns `false` if the attempt
/// behind `token` was paused or removed in the meantime.
pub(super) fn complete(
    inner: &Inner,
    task: &TransferTask,
    path: &Path,
    token: &CancellationToken,
) -> bool {
    {
        let Some(mut t) = inner.tasks.get_mut(&task.id) else {
            return false;
        };
        if !owns(&t, token) {
            return false;
        }
        inner.inflight.remove(&task.id);
        t.status = TransferStatus::Completed;
        t.bytes = task.file.size;
        t.speed = 0;
        t.local_path = Some(path.to_path_buf());
    }
    inner.publish();

    inner.files.index_media(path);
    match inner.messages.replace_file_uri(&task.message_id, &task.id, path) {
        Ok(true) => {}
        Ok(false) => debug!(id = %task.id, "message had no matching reference"),
        Err(e) => warn!(id = %task.id, "could not update message: {e}"),
    }
    info!(id = %task.id, path = %path.display(), "download completed");
    inner.events.emit(Event::TransferCompleted {
        id: task.id.clone(),
        path: path.to_path_buf(),
    });

    inner.tasks.remove(&task.id);
    inner.publish();
    true
}

pub(super) fn fail(inner: &Inner, id: &str, error: &TetherError, token: &CancellationToken) {
    {
        let Some(mut t) = inner.tasks.get_mut(id) else {
            return;
        };
        if !owns(&t, token) {
            return;
        }
        inner.inflight.remove(id);
        t.status = TransferStatus::Failed;
        t.speed = 0;
        t.error = Some(error.to_string());
        t.local_path = None;
    }
    inner.publish();
    warn!(id, "download failed: {error}");
    inner.events.emit(Event::TransferFailed {
        id: id.to_owned(),
        error: error.to_string(),
    });
}
