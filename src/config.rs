//! Run configuration: directory sources, probe sizes and HTTP limits.
//!
//! Read once from an optional TOML file, overridden by CLI flags, then passed
//! explicitly to the components that need it. Nothing is written back.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub measurement: MeasurementConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

impl Config {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Load `path` when given, otherwise use compiled-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => {
                debug!("no config file given, using compiled-in defaults");
                Ok(Self::default())
            }
        }
    }

    /// Reject settings that would make a run meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.discovery.sources.is_empty() {
            bail!("discovery.sources must list at least one directory URL");
        }
        if self.discovery.location_url.trim().is_empty() {
            bail!("discovery.location_url must not be empty");
        }
        let m = &self.measurement;
        if m.download_sizes.iter().chain(&m.upload_sizes).any(|s| *s == 0) {
            bail!("measurement sizes must be greater than zero");
        }
        if self.measurement.active_download_sizes().is_empty()
            && self.measurement.active_upload_sizes().is_empty()
        {
            bail!("nothing to measure: both download and upload are disabled or empty");
        }
        if self.http.timeout_secs == 0 || self.http.connect_timeout_secs == 0 {
            bail!("http timeouts must be greater than zero");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

pub const DEFAULT_LOCATION_URL: &str = "https://www.speedtest.net/speedtest-config.php";

/// Public directory feeds: two mirror pairs, fetched together.
pub const DEFAULT_SOURCES: &[&str] = &[
    "https://www.speedtest.net/speedtest-servers-static.php",
    "https://c.speedtest.net/speedtest-servers-static.php",
    "https://www.speedtest.net/speedtest-servers.php",
    "https://c.speedtest.net/speedtest-servers.php",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Document describing the client (IP, ISP, coordinates).
    pub location_url: String,
    /// Endpoint-list feeds, in priority order for deduplication.
    pub sources: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            location_url: DEFAULT_LOCATION_URL.to_string(),
            sources: DEFAULT_SOURCES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Measurement
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementConfig {
    /// Square test image edges in pixels, probed in this order.
    pub download_sizes: Vec<u64>,
    /// Upload payload sizes in bytes, probed in this order.
    pub upload_sizes: Vec<u64>,
    pub skip_download: bool,
    pub skip_upload: bool,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            download_sizes: vec![350, 500, 750, 1000, 1500, 2000, 2500, 3000, 3500, 4000],
            upload_sizes: vec![262_144, 524_288, 1_048_576, 1_572_864, 2_097_152],
            skip_download: false,
            skip_upload: false,
        }
    }
}

impl MeasurementConfig {
    pub fn active_download_sizes(&self) -> Vec<u64> {
        if self.skip_download {
            Vec::new()
        } else {
            self.download_sizes.clone()
        }
    }

    pub fn active_upload_sizes(&self) -> Vec<u64> {
        if self.skip_upload {
            Vec::new()
        } else {
            self.upload_sizes.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Upper bound for one whole request, body included.
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            connect_timeout_secs: 10,
            user_agent: concat!("whatspeed/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
