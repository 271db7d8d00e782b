//! HTTP access for manifests and artifacts.
//!
//! The controller talks to the network only through [`HttpClient`], which
//! keeps endpoint fallback and download sequencing testable without a
//! server. [`ReqwestClient`] is the production implementation.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::UpdateError;

/// Default connect timeout for HTTP requests in seconds.
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Status and body of a completed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Network collaborator used by the update controller.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// GET `url` and return whatever the server answered.
    ///
    /// Only transport failures are errors; non-2xx statuses are returned.
    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, UpdateError>;

    /// Stream `url` into `dest`, reporting progress fractions in `[0.0, 1.0]`.
    ///
    /// `timeout` bounds the wait for each chunk, not the whole transfer.
    async fn download(
        &self,
        url: &str,
        dest: &Path,
        timeout: Duration,
        on_progress: &(dyn Fn(f64) + Send + Sync),
    ) -> Result<(), UpdateError>;
}

/// [`HttpClient`] backed by `reqwest` with rustls.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    pub fn new(user_agent: &str) -> Result<Self, UpdateError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, UpdateError> {
        debug!("GET {}", url);
        let response = self.client.get(url).timeout(timeout).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        debug!("GET {} -> {} ({} bytes)", url, status, body.len());
        Ok(HttpResponse { status, body })
    }

    async fn download(
        &self,
        url: &str,
        dest: &Path,
        timeout: Duration,
        on_progress: &(dyn Fn(f64) + Send + Sync),
    ) -> Result<(), UpdateError> {
        info!("Starting download: {} -> {:?}", url, dest);

        let response = tokio::time::timeout(timeout, self.client.get(url).send())
            .await
            .map_err(|_| UpdateError::Network(format!("timed out connecting to {}", url)))??
            .error_for_status()?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = File::create(dest).await?;

        let total = response.content_length().filter(|t| *t > 0);
        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();
        on_progress(0.0);

        loop {
            let next = tokio::time::timeout(timeout, stream.next())
                .await
                .map_err(|_| UpdateError::Network(format!("download of {} stalled", url)))?;
            let Some(chunk) = next else { break };
            let chunk = chunk?;

            file.write_all(&chunk).await?;
            downloaded = downloaded.saturating_add(chunk.len() as u64);
            if let Some(total) = total {
                on_progress(progress_fraction(downloaded, total));
            }
        }

        file.flush().await?;
        on_progress(1.0);
        info!("Download complete: {} bytes", downloaded);
        Ok(())
    }
}

/// Fraction of `total` covered by `downloaded`, clamped to `[0.0, 1.0]`.
pub fn progress_fraction(downloaded: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (downloaded as f64 / total as f64).clamp(0.0, 1.0)
}
