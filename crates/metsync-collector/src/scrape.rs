//! HTTP scraper for the Ceph mgr prometheus endpoint.

use std::time::Duration;

use http::{StatusCode, Uri};
use http_body_util::BodyExt;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("invalid endpoint {0:?}")]
    InvalidEndpoint(String),

    #[error("connection to {address} failed: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("http error: {0}")]
    Http(#[from] hyper::Error),

    #[error("failed to build request: {0}")]
    Request(#[from] http::Error),

    #[error("endpoint answered {0}")]
    Status(StatusCode),

    #[error("scrape timed out after {0:?}")]
    Timeout(Duration),

    #[error("response body is not utf-8: {0}")]
    Body(#[from] std::string::FromUtf8Error),
}

/// Fetches the metrics text from one `http://` endpoint.
#[derive(Debug, Clone)]
pub struct Scraper {
    uri: Uri,
    address: String,
    timeout: Duration,
}

impl Scraper {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, ScrapeError> {
        let invalid = || ScrapeError::InvalidEndpoint(endpoint.to_string());
        let uri: Uri = endpoint.parse().map_err(|_| invalid())?;
        if uri.scheme_str() != Some("http") {
            return Err(invalid());
        }
        let host = uri.host().ok_or_else(invalid)?;
        let address = format!("{host}:{}", uri.port_u16().unwrap_or(80));
        Ok(Self {
            uri,
            address,
            timeout,
        })
    }

    pub fn endpoint(&self) -> &Uri {
        &self.uri
    }

    /// GET the endpoint and return the body.
    pub async fn fetch(&self) -> Result<String, ScrapeError> {
        tokio::time::timeout(self.timeout, self.fetch_inner())
            .await
            .map_err(|_| ScrapeError::Timeout(self.timeout))?
    }

    async fn fetch_inner(&self) -> Result<String, ScrapeError> {
        let stream = tokio::net::TcpStream::connect(&self.address)
            .await
            .map_err(|source| ScrapeError::Connect {
                address: self.address.clone(),
                source,
            })?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "scrape connection closed with error");
            }
        });

        let path = self
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let req = http::Request::builder()
            .method("GET")
            .uri(path)
            .header("host", &self.address)
            .header("user-agent", "metsync-collector/0.1")
            .header("accept", "text/plain")
            .body(http_body_util::Empty::<bytes::Bytes>::new())?;

        let resp = sender.send_request(req).await?;
        if !resp.status().is_success() {
            return Err(ScrapeError::Status(resp.status()));
        }

        let body = resp.into_body().collect().await?.to_bytes();
        let text = String::from_utf8(body.to_vec())?;
        debug!(uri = %self.uri, bytes = text.len(), "scrape complete");
        Ok(text)
    }
}
