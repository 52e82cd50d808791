//! Sequential download-then-upload measurement against one endpoint.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::{average_mbps, BandwidthSample, Direction, ThroughputError, TransferProbe};
use crate::directory::Endpoint;
use crate::location::ClientLocation;
use crate::transport::error_chain;

/// A probe that did not produce a sample.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeFailure {
    pub direction: Direction,
    pub size: u64,
    pub error: String,
}

/// Everything one run measured.
#[derive(Debug, Clone, Serialize)]
pub struct MeasurementReport {
    pub client: ClientLocation,
    pub endpoint: Endpoint,
    pub download_samples: Vec<BandwidthSample>,
    pub upload_samples: Vec<BandwidthSample>,
    pub download_average_mbps: Option<f64>,
    pub upload_average_mbps: Option<f64>,
    pub failures: Vec<ProbeFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl MeasurementReport {
    /// Number of probes attempted in both directions.
    pub fn attempted(&self) -> usize {
        self.download_samples.len() + self.upload_samples.len() + self.failures.len()
    }

    /// True when probes were attempted but none produced a sample.
    pub fn is_void(&self) -> bool {
        self.attempted() > 0 && self.download_samples.is_empty() && self.upload_samples.is_empty()
    }
}

/// Drives the download sizes, then the upload sizes, one probe at a time.
///
/// Probes never overlap: each one has the link to itself. A failed probe is
/// recorded in the report and left out of the average.
pub struct MeasurementRunner {
    probe: TransferProbe,
    download_sizes: Vec<u64>,
    upload_sizes: Vec<u64>,
}

impl MeasurementRunner {
    pub fn new(probe: TransferProbe, download_sizes: Vec<u64>, upload_sizes: Vec<u64>) -> Self {
        Self {
            probe,
            download_sizes,
            upload_sizes,
        }
    }

    /// Run every probe in order. `on_sample` sees each sample as soon as it exists.
    pub async fn run<F>(
        &self,
        client: &ClientLocation,
        endpoint: &Endpoint,
        mut on_sample: F,
    ) -> MeasurementReport
    where
        F: FnMut(&BandwidthSample),
    {
        let started_at = Utc::now();
        let mut failures = Vec::new();

        info!(endpoint = %endpoint.hostname, sizes = ?self.download_sizes, "Download phase");
        let mut download_samples = Vec::with_capacity(self.download_sizes.len());
        for &size in &self.download_sizes {
            let result = self.probe.download(endpoint, size).await;
            record(
                result,
                Direction::Download,
                size,
                &mut download_samples,
                &mut failures,
                &mut on_sample,
            );
        }
        let download_average_mbps = average_mbps(&download_samples);

        info!(endpoint = %endpoint.hostname, sizes = ?self.upload_sizes, "Upload phase");
        let mut upload_samples = Vec::with_capacity(self.upload_sizes.len());
        for &size in &self.upload_sizes {
            let result = self.probe.upload(endpoint, size).await;
            record(
                result,
                Direction::Upload,
                size,
                &mut upload_samples,
                &mut failures,
                &mut on_sample,
            );
        }
        let upload_average_mbps = average_mbps(&upload_samples);

        info!(
            download_mbps = ?download_average_mbps,
            upload_mbps = ?upload_average_mbps,
            failed = failures.len(),
            "Measurement finished"
        );

        MeasurementReport {
            client: client.clone(),
            endpoint: endpoint.clone(),
            download_samples,
            upload_samples,
            download_average_mbps,
            upload_average_mbps,
            failures,
            started_at,
            finished_at: Utc::now(),
        }
    }
}

fn record<F>(
    result: Result<BandwidthSample, ThroughputError>,
    direction: Direction,
    size: u64,
    samples: &mut Vec<BandwidthSample>,
    failures: &mut Vec<ProbeFailure>,
    on_sample: &mut F,
) where
    F: FnMut(&BandwidthSample),
{
    match result {
        Ok(sample) => {
            on_sample(&sample);
            samples.push(sample);
        }
        Err(e) => {
            let error = error_chain(&e);
            warn!(%direction, size, %error, "Probe failed, continuing with next size");
            failures.push(ProbeFailure {
                direction,
                size,
                error,
            });
        }
    }
}
