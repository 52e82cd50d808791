//! Endpoint discovery: fetch endpoint lists from directory sources and merge them.

pub mod aggregate;
pub mod document;

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::transport::{HttpRequest, HttpTransport, TransportError};

pub use aggregate::DirectoryAggregator;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("fetching {url} failed")]
    Network {
        url: String,
        #[source]
        source: TransportError,
    },

    #[error("decoding endpoint list from {url} failed")]
    Decode {
        url: String,
        #[source]
        source: document::DocumentError,
    },

    #[error("all {attempted} directory sources failed{}", summarize(.failures))]
    AllSourcesFailed {
        attempted: usize,
        failures: Vec<String>,
    },
}

fn summarize(failures: &[String]) -> String {
    if failures.is_empty() {
        String::new()
    } else {
        format!(": {}", failures.join("; "))
    }
}

/// A measurement target advertised by a directory source.
///
/// `id` is assigned by the source and is not unique across sources; identity
/// is `(hostname, base_url)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Endpoint {
    pub id: i64,
    pub base_url: String,
    pub hostname: String,
    pub display_name: String,
    pub sponsor: String,
    pub country_name: String,
    pub country_code: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Endpoint {
    pub fn identity(&self) -> (&str, &str) {
        (&self.hostname, &self.base_url)
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ", self.hostname)?;
        if !self.sponsor.is_empty() {
            write!(f, "[{}] ", self.sponsor)?;
        }
        write!(f, "{}, {} (id {})", self.display_name, self.country_code, self.id)
    }
}

/// Anything that can produce the endpoint list behind one source URL.
#[async_trait::async_trait]
pub trait EndpointSource: Send + Sync {
    async fn fetch_endpoints(&self, source_url: &str) -> Result<Vec<Endpoint>, DirectoryError>;
}

/// Fetches one endpoint list over HTTP and decodes it.
#[derive(Clone)]
pub struct EndpointDirectory {
    transport: Arc<dyn HttpTransport>,
    user_agent: String,
}

impl EndpointDirectory {
    pub fn new(transport: Arc<dyn HttpTransport>, user_agent: impl Into<String>) -> Self {
        Self {
            transport,
            user_agent: user_agent.into(),
        }
    }
}

#[async_trait::async_trait]
impl EndpointSource for EndpointDirectory {
    async fn fetch_endpoints(&self, source_url: &str) -> Result<Vec<Endpoint>, DirectoryError> {
        let network = |source| DirectoryError::Network {
            url: source_url.to_string(),
            source,
        };

        let req = HttpRequest::get(source_url).header("User-Agent", self.user_agent.as_str());
        let resp = self
            .transport
            .send(req)
            .await
            .and_then(|r| r.error_for_status(source_url))
            .map_err(network)?;

        let decoded =
            document::decode_endpoints(&resp.body).map_err(|source| DirectoryError::Decode {
                url: source_url.to_string(),
                source,
            })?;

        debug!(
            url = %source_url,
            endpoints = decoded.endpoints.len(),
            skipped = decoded.skipped,
            "Decoded endpoint list"
        );
        Ok(decoded.endpoints)
    }
}
