use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::rate_limiter::RateLimiter;
use crate::config::HttpConfig;
use crate::utils::fs::io_error;
use crate::utils::http_client::build_client;
use crate::{Error, Result};

/// Moves one remote resource into a local file.
#[async_trait]
pub trait SegmentFetcher: Send + Sync {
    /// Download `url` into `dest`, replacing any existing file.
    ///
    /// `received` is incremented as bytes are written so callers can sample
    /// progress while the transfer runs. Returns the number of bytes written.
    async fn fetch(&self, url: &str, dest: &Path, received: &AtomicU64) -> Result<u64>;
}

/// HTTP implementation of [`SegmentFetcher`].
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    limiter: Option<Arc<RateLimiter>>,
}

impl HttpFetcher {
    pub fn new(config: &HttpConfig, limiter: Option<Arc<RateLimiter>>) -> Result<Self> {
        Ok(Self::with_client(build_client(config)?, limiter))
    }

    pub fn with_client(client: reqwest::Client, limiter: Option<Arc<RateLimiter>>) -> Self {
        Self { client, limiter }
    }
}

#[async_trait]
impl SegmentFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest: &Path, received: &AtomicU64) -> Result<u64> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::transfer(url, e))?;

        debug!(
            url = %url,
            dest = %dest.display(),
            content_length = ?response.content_length(),
            "Transfer started"
        );

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| io_error("creating", dest, e))?;

        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::transfer(url, e))?;
            if let Some(limiter) = &self.limiter {
                limiter.acquire(chunk.len() as u64).await;
            }
            file.write_all(&chunk)
                .await
                .map_err(|e| io_error("writing", dest, e))?;
            written += chunk.len() as u64;
            received.fetch_add(chunk.len() as u64, Ordering::Relaxed);
        }

        file.flush().await.map_err(|e| io_error("flushing", dest, e))?;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::routing::get;
    use std::net::SocketAddr;
    use std::time::Duration;

    async fn serve(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn fetcher(limiter: Option<Arc<RateLimiter>>) -> HttpFetcher {
        HttpFetcher::new(&HttpConfig::default(), limiter).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_writes_body() {
        let addr = serve(Router::new().route("/live/1.flv", get(|| async { vec![7u8; 100_000] }))).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("1.flv");
        let received = AtomicU64::new(0);

        let written = fetcher(None)
            .fetch(&format!("http://{addr}/live/1.flv"), &dest, &received)
            .await
            .unwrap();

        assert_eq!(written, 100_000);
        assert_eq!(received.load(Ordering::Relaxed), 100_000);
        let content = tokio::fs::read(&dest).await.unwrap();
        assert_eq!(content.len(), 100_000);
        assert!(content.iter().all(|&b| b == 7));
    }

    #[tokio::test]
    async fn test_fetch_replaces_partial_file() {
        let addr = serve(Router::new().route("/a.flv", get(|| async { "fresh" }))).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a.flv");
        tokio::fs::write(&dest, b"stale partial content").await.unwrap();

        fetcher(None)
            .fetch(&format!("http://{addr}/a.flv"), &dest, &AtomicU64::new(0))
            .await
            .unwrap();
        assert_eq!(tokio::fs::read_to_string(&dest).await.unwrap(), "fresh");
    }

    #[tokio::test]
    async fn test_http_error_is_transfer_error() {
        let addr = serve(Router::new()).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("missing.flv");

        let err = fetcher(None)
            .fetch(&format!("http://{addr}/missing.flv"), &dest, &AtomicU64::new(0))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Transfer { .. }));
        assert!(err.is_segment_scoped());
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_fetch_respects_rate_limit() {
        let addr = serve(Router::new().route("/b.flv", get(|| async { vec![0u8; 150_000] }))).await;
        let dir = tempfile::tempdir().unwrap();
        let limiter = Arc::new(RateLimiter::bytes_per_second(100_000).unwrap());

        let start = std::time::Instant::now();
        fetcher(Some(limiter))
            .fetch(
                &format!("http://{addr}/b.flv"),
                &dir.path().join("b.flv"),
                &AtomicU64::new(0),
            )
            .await
            .unwrap();

        // 150 KB at 100 KB/s starting from an empty bucket.
        assert!(start.elapsed() >= Duration::from_millis(1400));
    }
}
