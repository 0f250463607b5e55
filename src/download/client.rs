//! Primary transport: streamed HTTP GET straight to the destination file.
//!
//! The client carries no overall request timeout. A slow transfer is bounded
//! only by the retry envelope around it; an optional connect timeout can be
//! configured for hosts that never answer.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument};
use url::Url;

use super::error::DownloadError;
use super::transport::Transport;

/// User-Agent sent with every primary request.
const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// HTTP transport with streaming support.
///
/// Created once and shared by every task, so connections are pooled across
/// items and manifests.
///
/// # Example
///
/// ```no_run
/// use batchfetch_core::download::{HttpTransport, Transport};
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = HttpTransport::new()?;
/// transport
///     .fetch("https://example.com/cat.jpg", Path::new("./out/0.jpg"))
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Creates a transport without any timeout.
    ///
    /// # Errors
    ///
    /// Returns [`reqwest::Error`] if the TLS backend cannot be initialised.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_connect_timeout(None)
    }

    /// Creates a transport that gives up on connection establishment after
    /// `connect_timeout`. The transfer itself stays unbounded.
    ///
    /// # Errors
    ///
    /// Returns [`reqwest::Error`] if the TLS backend cannot be initialised.
    #[instrument(level = "debug")]
    pub fn with_connect_timeout(connect_timeout: Option<Duration>) -> Result<Self, reqwest::Error> {
        let mut builder = Client::builder().gzip(true).user_agent(USER_AGENT);
        if let Some(timeout) = connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }

    /// Sends the GET request and maps non-success statuses to errors.
    async fn send_request(&self, url: &str) -> Result<reqwest::Response, DownloadError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DownloadError::network(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url, status.as_u16()));
        }
        Ok(response)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    #[instrument(skip(self), fields(url = %url, dest = %dest.display()))]
    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), DownloadError> {
        Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        // Status is checked before the file is touched so an error page never
        // truncates a partial file the fallback could continue.
        let response = self.send_request(url).await?;

        let mut file = File::create(dest)
            .await
            .map_err(|e| DownloadError::io(dest, e))?;
        let bytes = stream_to_file(&mut file, response, url, dest).await?;

        debug!(bytes, "primary fetch complete");
        Ok(())
    }
}

/// Streams response body to file, returning bytes written.
async fn stream_to_file(
    file: &mut File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::network(url, e))?;

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(file_path, e))?;

        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(file_path, e))?;

    Ok(bytes_written)
}
