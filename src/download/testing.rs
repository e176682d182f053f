//! Scripted transport used by the download and cache tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Semaphore;

use super::DownloadError;
use super::transport::{Body, Transport};

#[derive(Clone)]
pub struct Script {
    pub content_length: Option<u64>,
    pub chunks: Vec<Vec<u8>>,
    /// Fail with this error once `chunks` are exhausted instead of ending cleanly.
    pub trailing_error: Option<DownloadError>,
}

impl Script {
    pub fn complete(payload: &[u8]) -> Self {
        Self {
            content_length: Some(payload.len() as u64),
            chunks: payload.chunks(16).map(<[u8]>::to_vec).collect(),
            trailing_error: None,
        }
    }
}

/// Serves scripted bodies. When `gate` is set, every body blocks before its
/// first chunk until a permit is added.
#[derive(Default)]
pub struct FakeTransport {
    scripts: Mutex<HashMap<String, Result<Script, DownloadError>>>,
    pub gate: Option<Arc<Semaphore>>,
    requests: AtomicUsize,
}

impl FakeTransport {
    pub fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        (
            Self {
                gate: Some(gate.clone()),
                ..Self::default()
            },
            gate,
        )
    }

    pub fn serve(&self, url: &str, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), Ok(script));
    }

    pub fn fail(&self, url: &str, error: DownloadError) {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), Err(error));
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

struct FakeBody {
    content_length: Option<u64>,
    chunks: VecDeque<Bytes>,
    trailing_error: Option<DownloadError>,
    gate: Option<Arc<Semaphore>>,
}

#[async_trait]
impl Body for FakeBody {
    fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    async fn chunk(&mut self) -> Result<Option<Bytes>, DownloadError> {
        if let Some(gate) = self.gate.take() {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        match self.chunks.pop_front() {
            Some(chunk) => Ok(Some(chunk)),
            None => match self.trailing_error.take() {
                Some(e) => Err(e),
                None => Ok(None),
            },
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn get(&self, url: &str) -> Result<Box<dyn Body>, DownloadError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or(Err(DownloadError::Status(404)))?;
        Ok(Box::new(FakeBody {
            content_length: script.content_length,
            chunks: script.chunks.into_iter().map(Bytes::from).collect(),
            trailing_error: script.trailing_error,
            gate: self.gate.clone(),
        }))
    }
}
