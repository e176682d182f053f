//! The byte-stream seam under the downloader: `reqwest` in production,
//! scripted fakes in tests.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::NetworkSettings;

use super::DownloadError;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue a GET for `url` and hand back the response body.
    async fn get(&self, url: &str) -> Result<Box<dyn Body>, DownloadError>;
}

#[async_trait]
pub trait Body: Send {
    /// The declared `Content-Length`, if any.
    fn content_length(&self) -> Option<u64>;
    /// Next chunk of the body; `Ok(None)` at end of stream.
    async fn chunk(&mut self) -> Result<Option<Bytes>, DownloadError>;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(settings: &NetworkSettings) -> Result<Self, DownloadError> {
        let mut builder = reqwest::Client::builder().user_agent(settings.user_agent.as_str());
        if let Some(secs) = settings.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| DownloadError::Http(e.to_string()))?;
        Ok(Self { client })
    }
}

struct HttpBody {
    response: reqwest::Response,
}

#[async_trait]
impl Body for HttpBody {
    fn content_length(&self) -> Option<u64> {
        self.response.content_length()
    }

    async fn chunk(&mut self) -> Result<Option<Bytes>, DownloadError> {
        self.response
            .chunk()
            .await
            .map_err(|e| DownloadError::Http(e.to_string()))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<Box<dyn Body>, DownloadError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DownloadError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status(status.as_u16()));
        }
        Ok(Box::new(HttpBody { response }))
    }
}
