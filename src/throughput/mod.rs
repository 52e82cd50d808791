//! Throughput measurement: timed single-stream HTTP downloads and uploads.

pub mod probe;
pub mod report;
pub mod runner;

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::transport::TransportError;

pub use probe::TransferProbe;
pub use runner::{MeasurementReport, MeasurementRunner};

#[derive(Debug, Error)]
pub enum ThroughputError {
    #[error("{direction} probe ({size}) failed")]
    Transfer {
        direction: Direction,
        size: u64,
        #[source]
        source: TransportError,
    },

    #[error("cannot build {direction} URL from {base}: {reason}")]
    InvalidUrl {
        direction: Direction,
        base: String,
        reason: String,
    },

    #[error("{direction} probe measured a non-positive duration ({elapsed:?}); sample discarded")]
    InvalidMeasurement {
        direction: Direction,
        elapsed: Duration,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Download,
    Upload,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(match self {
            Direction::Download => "download",
            Direction::Upload => "upload",
        })
    }
}

/// One probe's bandwidth estimate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandwidthSample {
    pub direction: Direction,
    /// Pixel edge for downloads, byte count for uploads.
    pub requested_size: u64,
    pub payload_bytes: u64,
    pub elapsed_secs: f64,
    pub mbps: f64,
}

impl BandwidthSample {
    /// Build a sample from a byte count and a wall-clock duration.
    ///
    /// A zero duration is rejected instead of being divided into.
    pub fn new(
        direction: Direction,
        requested_size: u64,
        payload_bytes: u64,
        elapsed: Duration,
    ) -> Result<Self, ThroughputError> {
        if elapsed.is_zero() {
            return Err(ThroughputError::InvalidMeasurement { direction, elapsed });
        }
        let elapsed_secs = elapsed.as_secs_f64();
        Ok(Self {
            direction,
            requested_size,
            payload_bytes,
            elapsed_secs,
            mbps: megabits_per_second(payload_bytes, elapsed_secs),
        })
    }
}

/// `(bytes * 8) / 1_000_000 / seconds`
pub fn megabits_per_second(bytes: u64, elapsed_secs: f64) -> f64 {
    (bytes as f64 * 8.0) / 1_000_000.0 / elapsed_secs
}

/// Arithmetic mean of the samples' rates, `None` when there are none.
pub fn average_mbps(samples: &[BandwidthSample]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    Some(samples.iter().map(|s| s.mbps).sum::<f64>() / samples.len() as f64)
}

/// Time source for probes. Tests substitute a frozen clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> tokio::time::Instant;
}

/// Monotonic clock driven by tokio, so paused test time applies to it.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> tokio::time::Instant {
        tokio::time::Instant::now()
    }
}
