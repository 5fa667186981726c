//! HTTP transport seam.
//!
//! The engine never talks to `reqwest` directly. Everything it needs from the
//! network goes through [`Transport`]: fetch a small document as text, fetch a
//! small binary (signatures), or open a streaming, resumable download. Tests
//! substitute an in-memory implementation.

use std::future::Future;
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use thiserror::Error;

/// Connect timeout for every request.
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Maximum time without receiving data before a request is abandoned.
const READ_TIMEOUT_SECS: u64 = 60;

/// User-Agent header for HTTP requests.
const USER_AGENT: &str = concat!("swup/", env!("CARGO_PKG_VERSION"));

/// Failure of a single transport request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The server answered with a non-success status.
    #[error("HTTP error {status}: {url}")]
    Status { url: String, status: u16 },

    /// The request never produced a response, or the body broke off.
    #[error("connection to {url} failed: {message}")]
    Connection { url: String, message: String },

    /// A resumed request asked for a range the server cannot serve.
    #[error("requested range not satisfiable: {url}")]
    RangeNotSatisfiable { url: String },
}

impl TransportError {
    /// Whether retrying the same request may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connection { .. } | Self::RangeNotSatisfiable { .. } => true,
            Self::Status { status, .. } => matches!(status, 408 | 429) || *status >= 500,
        }
    }

    /// User-facing description, spelling out the common statuses.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Status { url, status: 404 } => format!("not found at {url}"),
            Self::Status { url, status } if *status >= 500 => {
                format!("server error ({status}): {url}")
            }
            other => other.to_string(),
        }
    }
}

/// Body of a download, possibly starting at an offset.
pub struct DownloadStream {
    /// Length of this body, when the server announced it.
    pub content_length: Option<u64>,
    /// `true` when the server honoured the requested offset (`206`), `false`
    /// when the body starts at byte zero.
    pub resumed: bool,
    /// The body chunks.
    pub body: BoxStream<'static, Result<Vec<u8>, TransportError>>,
}

impl std::fmt::Debug for DownloadStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadStream")
            .field("content_length", &self.content_length)
            .field("resumed", &self.resumed)
            .finish_non_exhaustive()
    }
}

/// Network operations the engine depends on.
pub trait Transport: Send + Sync {
    /// Fetches a document as UTF-8 text.
    fn get_text(&self, url: &str) -> impl Future<Output = Result<String, TransportError>> + Send;

    /// Fetches a small binary document.
    fn get_bytes(&self, url: &str)
    -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send;

    /// Opens a download stream. A non-zero `offset` requests the remainder of
    /// the resource starting at that byte.
    fn open(
        &self,
        url: &str,
        offset: u64,
    ) -> impl Future<Output = Result<DownloadStream, TransportError>> + Send;
}

/// [`Transport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Builds a client with connect and read timeouts.
    ///
    /// # Errors
    ///
    /// Returns `Connection` if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .read_timeout(Duration::from_secs(READ_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| TransportError::Connection {
                url: String::new(),
                message: format!("Failed to create HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, TransportError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| connection_error(url, &e))?;
        if !response.status().is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(response)
    }
}

fn connection_error(url: &str, error: &reqwest::Error) -> TransportError {
    let message = if error.is_timeout() {
        "timed out".to_string()
    } else {
        error.to_string()
    };
    TransportError::Connection {
        url: url.to_string(),
        message,
    }
}

impl Transport for HttpTransport {
    async fn get_text(&self, url: &str) -> Result<String, TransportError> {
        let response = self.get(url).await?;
        response.text().await.map_err(|e| connection_error(url, &e))
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        let response = self.get(url).await?;
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| connection_error(url, &e))
    }

    async fn open(&self, url: &str, offset: u64) -> Result<DownloadStream, TransportError> {
        let mut request = self.client.get(url);
        if offset > 0 {
            request = request.header(reqwest::header::RANGE, format!("bytes={offset}-"));
        }
        let response = request
            .send()
            .await
            .map_err(|e| connection_error(url, &e))?;

        let status = response.status();
        if status == reqwest::StatusCode::RANGE_NOT_SATISFIABLE {
            return Err(TransportError::RangeNotSatisfiable {
                url: url.to_string(),
            });
        }
        if !status.is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let resumed = offset > 0 && status == reqwest::StatusCode::PARTIAL_CONTENT;
        let content_length = response.content_length();
        let owned_url = url.to_string();
        let body = response
            .bytes_stream()
            .map(move |chunk| {
                chunk
                    .map(|b| b.to_vec())
                    .map_err(|e| connection_error(&owned_url, &e))
            })
            .boxed();

        Ok(DownloadStream {
            content_length,
            resumed,
            body,
        })
    }
}
