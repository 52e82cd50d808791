//! Client location lookup (country, ISP, public IP, coordinates).

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::geo;
use crate::transport::{HttpRequest, HttpTransport, TransportError};

#[derive(Debug, Error)]
pub enum LocationError {
    #[error(transparent)]
    Network(#[from] TransportError),

    #[error("could not decode location document from {url}: {reason}")]
    Decode { url: String, reason: String },
}

/// Where the client sits, as seen by the directory service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientLocation {
    pub country_code: String,
    pub isp_name: String,
    pub public_ip: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Deserialize)]
struct SettingsDoc {
    client: ClientXml,
}

#[derive(Debug, Deserialize)]
struct ClientXml {
    #[serde(rename = "@ip", default)]
    ip: String,
    #[serde(rename = "@lat")]
    lat: f64,
    #[serde(rename = "@lon")]
    lon: f64,
    #[serde(rename = "@isp", default)]
    isp: String,
    #[serde(rename = "@country", default)]
    country: String,
}

/// Decode the `<settings><client .../></settings>` document.
pub fn decode_location(url: &str, body: &[u8]) -> Result<ClientLocation, LocationError> {
    let decode_err = |reason: String| LocationError::Decode {
        url: url.to_string(),
        reason,
    };

    let text = std::str::from_utf8(body).map_err(|e| decode_err(e.to_string()))?;
    let doc: SettingsDoc = quick_xml::de::from_str(text).map_err(|e| decode_err(e.to_string()))?;
    let c = doc.client;

    if !geo::is_valid_coordinate(c.lat, c.lon) {
        return Err(decode_err(format!(
            "coordinates out of range: lat={} lon={}",
            c.lat, c.lon
        )));
    }

    Ok(ClientLocation {
        country_code: c.country,
        isp_name: c.isp,
        public_ip: c.ip,
        latitude: c.lat,
        longitude: c.lon,
    })
}

/// Fetch and decode the client location once at startup.
pub async fn lookup(
    transport: &Arc<dyn HttpTransport>,
    url: &str,
    user_agent: &str,
) -> Result<ClientLocation, LocationError> {
    debug!(%url, "Looking up client location");
    let resp = transport
        .send(HttpRequest::get(url).header("User-Agent", user_agent))
        .await?
        .error_for_status(url)?;

    let location = decode_location(url, &resp.body)?;
    info!(
        ip = %location.public_ip,
        isp = %location.isp_name,
        country = %location.country_code,
        lat = location.latitude,
        lon = location.longitude,
        "Client location resolved"
    );
    Ok(location)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::HttpResponse;
    use bytes::Bytes;

    const SETTINGS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<settings>
  <client ip="203.0.113.7" lat="52.3702" lon="4.8952" isp="Example Telecom" isprating="3.7" rating="0" ispdlavg="0" ispulavg="0" loggedin="0" country="NL" />
  <server-config threadcount="4" ignoreids="1,2,3" />
</settings>"#;

    struct Canned(u16, &'static str);

    #[async_trait::async_trait]
    impl HttpTransport for Canned {
        async fn send(&self, _req: HttpRequest) -> Result<HttpResponse, TransportError> {
            Ok(HttpResponse {
                status: self.0,
                body: Bytes::from_static(self.1.as_bytes()),
            })
        }
    }

    #[test]
    fn test_decode_settings_document() {
        let loc = decode_location("http://cfg", SETTINGS.as_bytes()).unwrap();
        assert_eq!(loc.public_ip, "203.0.113.7");
        assert_eq!(loc.country_code, "NL");
        assert_eq!(loc.isp_name, "Example Telecom");
        assert!((loc.latitude - 52.3702).abs() < 1e-9);
        assert!((loc.longitude - 4.8952).abs() < 1e-9);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = decode_location("http://cfg", b"<html>nope").unwrap_err();
        assert!(matches!(err, LocationError::Decode { .. }));
    }

    #[test]
    fn test_decode_rejects_out_of_range() {
        let doc = r#"<settings><client ip="1.1.1.1" lat="123.0" lon="0" isp="x" country="US"/></settings>"#;
        let err = decode_location("http://cfg", doc.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[tokio::test]
    async fn test_lookup_non_success_is_network_error() {
        let transport: Arc<dyn HttpTransport> = Arc::new(Canned(500, ""));
        let err = lookup(&transport, "http://cfg", "test").await.unwrap_err();
        assert!(matches!(
            err,
            LocationError::Network(TransportError::Status { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn test_lookup_success() {
        let transport: Arc<dyn HttpTransport> = Arc::new(Canned(200, SETTINGS));
        let loc = lookup(&transport, "http://cfg", "test").await.unwrap();
        assert_eq!(loc.country_code, "NL");
    }
}
