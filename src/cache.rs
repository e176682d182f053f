//! Content-addressed asset store (cover art, episode artwork).
//!
//! Entries are files named by the SHA-256 of their bytes, or of their source
//! URL when fetched remotely. Population of a key is coalesced: while one
//! write is in flight every other request for that key waits on it and
//! receives the same outcome.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::download::{DownloadError, Downloader};

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("{0} is not cached")]
    NotCached(String),
    #[error("population of {0} was abandoned")]
    Abandoned(String),
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },
    #[error(transparent)]
    Download(#[from] DownloadError),
}

/// Where a cache entry's bytes come from.
pub enum Source {
    Bytes(Vec<u8>),
    Url(String),
}

type Outcome = Result<PathBuf, CacheError>;

struct CacheInner {
    dir: PathBuf,
    downloader: Downloader,
    inflight: Mutex<HashMap<String, Vec<oneshot::Sender<Outcome>>>>,
    populations: AtomicUsize,
}

#[derive(Clone)]
pub struct AssetCache {
    inner: Arc<CacheInner>,
}

fn hex_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

impl AssetCache {
    pub fn new(dir: impl Into<PathBuf>, downloader: Downloader) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                dir: dir.into(),
                downloader,
                inflight: Mutex::default(),
                populations: AtomicUsize::new(0),
            }),
        }
    }

    pub fn key_for_bytes(bytes: &[u8]) -> String {
        hex_digest(bytes)
    }

    pub fn key_for_url(url: &str) -> String {
        hex_digest(url.as_bytes())
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.inner.path_for(key)
    }

    pub fn is_resident(&self, key: &str) -> bool {
        self.inner.path_for(key).is_file()
    }

    /// Number of disk writes (or downloads) actually issued so far.
    pub fn populations(&self) -> usize {
        self.inner.populations.load(Ordering::SeqCst)
    }

    /// Store `bytes` and return their key once resident.
    pub async fn populate_bytes(&self, bytes: Vec<u8>) -> Result<String, CacheError> {
        let key = Self::key_for_bytes(&bytes);
        self.populate(&key, Source::Bytes(bytes)).await?;
        Ok(key)
    }

    /// Fetch `url` into the cache and return its key once resident.
    pub async fn populate_url(&self, url: &str) -> Result<String, CacheError> {
        let key = Self::key_for_url(url);
        self.populate(&key, Source::Url(url.to_string())).await?;
        Ok(key)
    }

    /// Make `key` resident from `source`.
    ///
    /// A resident key is returned as is. A key already being populated only
    /// registers this caller as a waiter; `source` is then dropped unused.
    pub async fn populate(&self, key: &str, source: Source) -> Outcome {
        let (tx, rx) = oneshot::channel();
        {
            let mut inflight = self.inner.lock_inflight();
            if let Some(waiters) = inflight.get_mut(key) {
                waiters.push(tx);
            } else if self.is_resident(key) {
                return Ok(self.path_for(key));
            } else {
                inflight.insert(key.to_string(), vec![tx]);
                let inner = self.inner.clone();
                let key = key.to_string();
                tokio::spawn(async move { inner.run_population(key, source).await });
            }
        }
        rx.await
            .unwrap_or_else(|_| Err(CacheError::Abandoned(key.to_string())))
    }

    /// Path of a resident key, waiting for an in-flight population if there
    /// is one. Never starts a population itself.
    pub async fn resolve(&self, key: &str) -> Outcome {
        let rx = {
            let mut inflight = self.inner.lock_inflight();
            match inflight.get_mut(key) {
                Some(waiters) => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    rx
                }
                None if self.is_resident(key) => return Ok(self.path_for(key)),
                None => return Err(CacheError::NotCached(key.to_string())),
            }
        };
        rx.await
            .unwrap_or_else(|_| Err(CacheError::Abandoned(key.to_string())))
    }
}

impl CacheInner {
    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    fn lock_inflight(&self) -> MutexGuard<'_, HashMap<String, Vec<oneshot::Sender<Outcome>>>> {
        self.inflight.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn run_population(&self, key: String, source: Source) {
        self.populations.fetch_add(1, Ordering::SeqCst);
        let outcome = self.write(&key, source).await;
        match &outcome {
            Ok(path) => log::debug!("cached {key} at {}", path.display()),
            Err(e) => log::warn!("failed to populate cache entry {key}: {e}"),
        }

        let waiters = self.lock_inflight().remove(&key).unwrap_or_default();
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
    }

    async fn write(&self, key: &str, source: Source) -> Outcome {
        let path = self.path_for(key);
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| CacheError::Io {
                path,
                source: Arc::new(source),
            }
        };

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(io_err(&self.dir))?;

        match source {
            Source::Bytes(bytes) => {
                let part = self.dir.join(format!("{key}.part"));
                tokio::fs::write(&part, bytes).await.map_err(io_err(&part))?;
                tokio::fs::rename(&part, &path).await.map_err(io_err(&path))?;
                Ok(path)
            }
            Source::Url(url) => Ok(self.downloader.download(&url, &path).finish().await?),
        }
    }
}

#[cfg(test)]
mod tests;
