//! One timed download or upload against a chosen endpoint.

use std::sync::Arc;

use bytes::Bytes;
use rand::RngCore;
use reqwest::Url;
use tracing::debug;

use super::{BandwidthSample, Clock, Direction, ThroughputError};
use crate::directory::Endpoint;
use crate::transport::{HttpRequest, HttpTransport};

/// Runs exactly one transfer per call. Callers must not overlap calls.
#[derive(Clone)]
pub struct TransferProbe {
    transport: Arc<dyn HttpTransport>,
    clock: Arc<dyn Clock>,
    user_agent: String,
}

impl TransferProbe {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        clock: Arc<dyn Clock>,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            clock,
            user_agent: user_agent.into(),
        }
    }

    /// Download a `size`x`size` test image and time it.
    pub async fn download(
        &self,
        endpoint: &Endpoint,
        size: u64,
    ) -> Result<BandwidthSample, ThroughputError> {
        let url = download_url(&endpoint.base_url, size)?;
        let req = HttpRequest::get(url.as_str())
            .header("Cache-Control", "no-cache")
            .header("User-Agent", self.user_agent.as_str());

        debug!(%url, size, "Starting download probe");
        let start = self.clock.now();
        let resp = self
            .transport
            .send(req)
            .await
            .and_then(|r| r.error_for_status(url.as_str()))
            .map_err(|source| ThroughputError::Transfer {
                direction: Direction::Download,
                size,
                source,
            })?;
        let elapsed = self.clock.now().saturating_duration_since(start);

        BandwidthSample::new(Direction::Download, size, resp.body.len() as u64, elapsed)
    }

    /// POST `size` random bytes to the endpoint and time it.
    ///
    /// The body is raw CSPRNG output, not `key=value` pairs. It is labelled
    /// `application/x-www-form-urlencoded` because upload endpoints only
    /// drain the body and ignore its fields; random bytes keep transparent
    /// compression on the path from shrinking the payload.
    pub async fn upload(
        &self,
        endpoint: &Endpoint,
        size: u64,
    ) -> Result<BandwidthSample, ThroughputError> {
        let payload = random_payload(size as usize);
        let req = HttpRequest::post(endpoint.base_url.as_str(), payload)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .header("Cache-Control", "no-cache")
            .header("User-Agent", self.user_agent.as_str());

        debug!(url = %endpoint.base_url, size, "Starting upload probe");
        let start = self.clock.now();
        self.transport
            .send(req)
            .await
            .and_then(|r| r.error_for_status(&endpoint.base_url))
            .map_err(|source| ThroughputError::Transfer {
                direction: Direction::Upload,
                size,
                source,
            })?;
        let elapsed = self.clock.now().saturating_duration_since(start);

        BandwidthSample::new(Direction::Upload, size, size, elapsed)
    }
}

/// Replace the last path segment of `base` with `random{size}x{size}.jpg`.
pub fn download_url(base: &str, size: u64) -> Result<Url, ThroughputError> {
    let invalid = |reason: String| ThroughputError::InvalidUrl {
        direction: Direction::Download,
        base: base.to_string(),
        reason,
    };
    let base = Url::parse(base).map_err(|e| invalid(e.to_string()))?;
    base.join(&format!("random{0}x{0}.jpg", size))
        .map_err(|e| invalid(e.to_string()))
}

fn random_payload(len: usize) -> Bytes {
    let mut buf = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut buf);
    Bytes::from(buf)
}
