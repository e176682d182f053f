//! Fetch a remote resource into a destination path.
//!
//! Bytes land in `<destination><nanos>` while in flight and are renamed onto
//! the destination only when the received length matches the declared
//! `Content-Length` (or none was declared). Concurrent requests for the same
//! destination share one transfer; every caller receives the same events.

mod transport;

#[cfg(test)]
pub(crate) mod testing;

use std::collections::HashMap;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::AbortHandle;

pub use transport::{Body, HttpTransport, Transport};

#[derive(Debug, Clone, Error)]
pub enum DownloadError {
    #[error("request failed: {0}")]
    Http(String),
    #[error("server answered with status {0}")]
    Status(u16),
    #[error("incomplete download: received {received} of {expected} bytes")]
    Incomplete { received: u64, expected: u64 },
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },
    #[error("download aborted")]
    Aborted,
}

impl DownloadError {
    fn io(path: &Path) -> impl Fn(io::Error) -> Self + '_ {
        move |source| DownloadError::Io {
            path: path.to_path_buf(),
            source: Arc::new(source),
        }
    }
}

#[derive(Debug, Clone)]
pub enum DownloadEvent {
    Progress { received: u64, total: Option<u64> },
    Done(PathBuf),
    Failed(DownloadError),
}

type Registry = Arc<Mutex<HashMap<PathBuf, Arc<Transfer>>>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Default)]
struct TransferState {
    subscribers: Vec<UnboundedSender<DownloadEvent>>,
    aborted: bool,
}

/// One in-flight transfer and everyone listening to it.
#[derive(Default)]
struct Transfer {
    state: Mutex<TransferState>,
    task: Mutex<Option<AbortHandle>>,
}

impl Transfer {
    fn subscribe(&self) -> Option<UnboundedReceiver<DownloadEvent>> {
        let mut state = lock(&self.state);
        if state.aborted {
            return None;
        }
        let (tx, rx) = unbounded_channel();
        state.subscribers.push(tx);
        Some(rx)
    }

    fn emit(&self, event: DownloadEvent) {
        let mut state = lock(&self.state);
        if state.aborted {
            return;
        }
        state.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn abort(&self) {
        {
            let mut state = lock(&self.state);
            state.aborted = true;
            state.subscribers.clear();
        }
        if let Some(task) = lock(&self.task).take() {
            task.abort();
        }
    }
}

fn unregister(registry: &Registry, destination: &Path, transfer: &Arc<Transfer>) {
    let mut inflight = lock(registry);
    if inflight
        .get(destination)
        .is_some_and(|current| Arc::ptr_eq(current, transfer))
    {
        inflight.remove(destination);
    }
}

/// Handle on a (possibly shared) transfer.
pub struct Download {
    destination: PathBuf,
    events: UnboundedReceiver<DownloadEvent>,
    transfer: Arc<Transfer>,
    registry: Registry,
}

impl Download {
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Next notification; `None` once the transfer finished or was aborted.
    pub async fn next_event(&mut self) -> Option<DownloadEvent> {
        self.events.recv().await
    }

    /// Wait for the outcome, skipping progress notifications.
    pub async fn finish(mut self) -> Result<PathBuf, DownloadError> {
        while let Some(event) = self.next_event().await {
            match event {
                DownloadEvent::Progress { received, total } => {
                    log::trace!("{}: {received}/{total:?} bytes", self.destination.display());
                }
                DownloadEvent::Done(path) => return Ok(path),
                DownloadEvent::Failed(e) => return Err(e),
            }
        }
        Err(DownloadError::Aborted)
    }

    /// Cancel the underlying transfer. No further events reach any subscriber.
    pub fn abort(&self) {
        log::debug!("aborting download to {}", self.destination.display());
        self.transfer.abort();
        unregister(&self.registry, &self.destination, &self.transfer);
    }
}

#[derive(Clone)]
pub struct Downloader {
    transport: Arc<dyn Transport>,
    inflight: Registry,
}

impl Downloader {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            inflight: Arc::default(),
        }
    }

    /// Start (or join) the transfer of `url` into `destination`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn download(&self, url: &str, destination: impl Into<PathBuf>) -> Download {
        let destination = destination.into();
        let mut inflight = lock(&self.inflight);

        if let Some(transfer) = inflight.get(&destination) {
            if let Some(events) = transfer.subscribe() {
                log::debug!("joining in-flight download to {}", destination.display());
                return Download {
                    destination,
                    events,
                    transfer: transfer.clone(),
                    registry: self.inflight.clone(),
                };
            }
        }

        let transfer = Arc::new(Transfer::default());
        let (tx, events) = unbounded_channel();
        lock(&transfer.state).subscribers.push(tx);
        inflight.insert(destination.clone(), transfer.clone());
        drop(inflight);

        log::debug!("downloading {url} to {}", destination.display());
        let task = tokio::spawn(run_transfer(
            self.transport.clone(),
            url.to_string(),
            destination.clone(),
            transfer.clone(),
            self.inflight.clone(),
        ));
        *lock(&transfer.task) = Some(task.abort_handle());

        Download {
            destination,
            events,
            transfer,
            registry: self.inflight.clone(),
        }
    }
}

async fn run_transfer(
    transport: Arc<dyn Transport>,
    url: String,
    destination: PathBuf,
    transfer: Arc<Transfer>,
    registry: Registry,
) {
    let outcome = fetch_to(transport.as_ref(), &url, &destination, &transfer).await;
    unregister(&registry, &destination, &transfer);
    match outcome {
        Ok(()) => {
            log::debug!("download to {} complete", destination.display());
            transfer.emit(DownloadEvent::Done(destination));
        }
        Err(e) => {
            log::warn!("download of {url} failed: {e}");
            transfer.emit(DownloadEvent::Failed(e));
        }
    }
}

/// `<destination><nanos since epoch>`.
fn temp_path(destination: &Path) -> PathBuf {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let mut name: OsString = destination.as_os_str().to_owned();
    name.push(stamp.to_string());
    PathBuf::from(name)
}

async fn fetch_to(
    transport: &dyn Transport,
    url: &str,
    destination: &Path,
    transfer: &Transfer,
) -> Result<(), DownloadError> {
    let mut body = transport.get(url).await?;
    let expected = body.content_length();

    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(DownloadError::io(parent))?;
    }
    let temp = temp_path(destination);
    let mut file = tokio::fs::File::create(&temp)
        .await
        .map_err(DownloadError::io(&temp))?;

    let mut received: u64 = 0;
    loop {
        match body.chunk().await {
            Ok(Some(chunk)) => {
                file.write_all(&chunk)
                    .await
                    .map_err(DownloadError::io(&temp))?;
                received += chunk.len() as u64;
                transfer.emit(DownloadEvent::Progress {
                    received,
                    total: expected,
                });
            }
            Ok(None) => break,
            Err(e) => {
                log::warn!("partial download left at {}", temp.display());
                return Err(match expected {
                    Some(expected) if received < expected => {
                        DownloadError::Incomplete { received, expected }
                    }
                    _ => e,
                });
            }
        }
    }
    file.flush().await.map_err(DownloadError::io(&temp))?;
    drop(file);

    if let Some(expected) = expected {
        if received != expected {
            log::warn!("partial download left at {}", temp.display());
            return Err(DownloadError::Incomplete { received, expected });
        }
    }

    tokio::fs::rename(&temp, destination)
        .await
        .map_err(DownloadError::io(destination))
}

#[cfg(test)]
mod tests;
