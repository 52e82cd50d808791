//! whatspeed -- portable download/upload speed test.
//!
//! Finds the client's location, discovers candidate endpoints from several
//! directory feeds at once, picks the nearest one and runs a sequence of
//! timed single-stream HTTP transfers against it.

pub mod config;
pub mod directory;
pub mod geo;
pub mod location;
pub mod select;
pub mod throughput;
pub mod transport;

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use config::Config;
use directory::{DirectoryAggregator, DirectoryError, Endpoint, EndpointDirectory};
use location::{ClientLocation, LocationError};
use select::SelectError;
use throughput::{
    BandwidthSample, Clock, MeasurementReport, MeasurementRunner, TokioClock, TransferProbe,
};
use transport::{HttpTransport, ReqwestTransport, TransportError};

/// A fatal failure, tagged with the stage it happened in.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("location lookup failed")]
    Location(#[source] LocationError),

    #[error("endpoint discovery failed")]
    Discovery(#[source] DirectoryError),

    #[error("endpoint selection failed")]
    Selection(#[source] SelectError),

    #[error(
        "measurement failed: none of the {} probes against {} succeeded",
        .report.attempted(),
        .report.endpoint.hostname
    )]
    Measurement { report: Box<MeasurementReport> },
}

/// Wires configuration, transport and clock into the discovery and
/// measurement pipeline.
pub struct SpeedTest {
    config: Config,
    transport: Arc<dyn HttpTransport>,
    clock: Arc<dyn Clock>,
}

impl SpeedTest {
    pub fn new(config: Config, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            config,
            transport,
            clock: Arc::new(TokioClock),
        }
    }

    /// Build with the pooled reqwest transport and the configured timeouts.
    pub fn from_config(config: Config) -> Result<Self, TransportError> {
        let transport =
            ReqwestTransport::new(config.http.timeout(), config.http.connect_timeout())?;
        Ok(Self::new(config, Arc::new(transport)))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub async fn locate(&self) -> Result<ClientLocation, RunError> {
        location::lookup(
            &self.transport,
            &self.config.discovery.location_url,
            &self.config.http.user_agent,
        )
        .await
        .map_err(RunError::Location)
    }

    /// Fan out to every configured directory source and merge the results.
    pub async fn discover(&self) -> Result<Vec<Endpoint>, RunError> {
        let fetcher = EndpointDirectory::new(self.transport.clone(), &self.config.http.user_agent);
        let aggregator =
            DirectoryAggregator::new(Arc::new(fetcher), self.config.discovery.sources.clone());
        aggregator.aggregate().await.map_err(RunError::Discovery)
    }

    /// Nearest endpoint, or the one with `server_id` when pinned.
    pub fn choose(
        &self,
        location: &ClientLocation,
        endpoints: &[Endpoint],
        server_id: Option<i64>,
    ) -> Result<Endpoint, RunError> {
        let chosen = match server_id {
            Some(id) => select::select_by_id(endpoints, id),
            None => select::select_nearest(location, endpoints),
        }
        .map_err(RunError::Selection)?;
        Ok(chosen.clone())
    }

    /// Run the configured probes. Fails only when every probe failed.
    pub async fn measure<F>(
        &self,
        location: &ClientLocation,
        endpoint: &Endpoint,
        on_sample: F,
    ) -> Result<MeasurementReport, RunError>
    where
        F: FnMut(&BandwidthSample),
    {
        let probe = TransferProbe::new(
            self.transport.clone(),
            self.clock.clone(),
            self.config.http.user_agent.as_str(),
        );
        let runner = MeasurementRunner::new(
            probe,
            self.config.measurement.active_download_sizes(),
            self.config.measurement.active_upload_sizes(),
        );

        let report = runner.run(location, endpoint, on_sample).await;
        if report.is_void() {
            return Err(RunError::Measurement {
                report: Box::new(report),
            });
        }
        Ok(report)
    }

    /// Location, discovery, selection and measurement, in that order.
    pub async fn run<F>(
        &self,
        server_id: Option<i64>,
        on_sample: F,
    ) -> Result<MeasurementReport, RunError>
    where
        F: FnMut(&BandwidthSample),
    {
        let location = self.locate().await?;
        let endpoints = self.discover().await?;
        let endpoint = self.choose(&location, &endpoints, server_id)?;

        let distance_km = geo::distance_meters(
            location.latitude,
            location.longitude,
            endpoint.latitude,
            endpoint.longitude,
        ) / 1000.0;
        info!(endpoint = %endpoint, distance_km, candidates = endpoints.len(), "Endpoint selected");

        self.measure(&location, &endpoint, on_sample).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stage_error_renders_cause_once() {
        let source = reqwest::Client::new().get("no-scheme").send().await.unwrap_err();
        let cause = source.to_string();
        let err = RunError::Location(LocationError::Network(TransportError::Request {
            url: "no-scheme".into(),
            source,
        }));

        let rendered = format!("{:#}", anyhow::Error::from(err));
        assert!(
            rendered.starts_with("location lookup failed: request to no-scheme failed: "),
            "{}",
            rendered
        );
        assert_eq!(rendered.matches(cause.as_str()).count(), 1, "{}", rendered);
    }
}
