//! Statically typed decode of the endpoint-list document.
//!
//! The feed is third party and versionless: unknown attributes and elements
//! are ignored, and a record missing its url, host, id or a usable lat/lon
//! is skipped instead of failing the whole document.

use serde::Deserialize;
use thiserror::Error;

use super::Endpoint;
use crate::geo;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("body is not UTF-8")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("malformed endpoint list")]
    Xml(#[from] quick_xml::DeError),
}

/// Result of decoding one document.
#[derive(Debug, Default)]
pub struct Decoded {
    pub endpoints: Vec<Endpoint>,
    pub skipped: usize,
}

#[derive(Debug, Deserialize)]
struct ServerListDoc {
    servers: ServersXml,
}

#[derive(Debug, Default, Deserialize)]
struct ServersXml {
    #[serde(rename = "server", default)]
    server: Vec<ServerXml>,
}

// Every attribute is optional here; `into_endpoint` decides what is usable.
#[derive(Debug, Deserialize)]
struct ServerXml {
    #[serde(rename = "@url")]
    url: Option<String>,
    #[serde(rename = "@lat")]
    lat: Option<String>,
    #[serde(rename = "@lon")]
    lon: Option<String>,
    #[serde(rename = "@name")]
    name: Option<String>,
    #[serde(rename = "@country")]
    country: Option<String>,
    #[serde(rename = "@cc")]
    cc: Option<String>,
    #[serde(rename = "@sponsor")]
    sponsor: Option<String>,
    #[serde(rename = "@id")]
    id: Option<String>,
    #[serde(rename = "@host")]
    host: Option<String>,
}

impl ServerXml {
    fn into_endpoint(self) -> Option<Endpoint> {
        let base_url = non_empty(self.url)?;
        let hostname = non_empty(self.host)?;
        let id = self.id?.trim().parse::<i64>().ok()?;
        let latitude = self.lat?.trim().parse::<f64>().ok()?;
        let longitude = self.lon?.trim().parse::<f64>().ok()?;
        if !geo::is_valid_coordinate(latitude, longitude) {
            return None;
        }

        Some(Endpoint {
            id,
            base_url,
            hostname,
            display_name: self.name.unwrap_or_default(),
            sponsor: self.sponsor.unwrap_or_default(),
            country_name: self.country.unwrap_or_default(),
            country_code: self.cc.unwrap_or_default(),
            latitude,
            longitude,
        })
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Decode a `<settings><servers><server .../>...</servers></settings>` body.
pub fn decode_endpoints(body: &[u8]) -> Result<Decoded, DocumentError> {
    let text = std::str::from_utf8(body)?;
    let doc: ServerListDoc = quick_xml::de::from_str(text)?;

    let mut decoded = Decoded::default();
    for record in doc.servers.server {
        match record.into_endpoint() {
            Some(ep) => decoded.endpoints.push(ep),
            None => decoded.skipped += 1,
        }
    }
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<settings>
<servers>
<server url="http://speed.example.nl:8080/speedtest/upload.php" lat="52.3667" lon="4.9000" name="Amsterdam" country="Netherlands" cc="NL" sponsor="Example BV" id="1234" host="speed.example.nl:8080" />
<server url="http://st.example.de/speedtest/upload.php" lat="50.1109" lon="8.6821" name="Frankfurt" country="Germany" cc="DE" sponsor="Beispiel GmbH" id="99" url2="http://alt.example.de/upload.php" host="st.example.de:8080" />
</servers>
</settings>"#;

    #[test]
    fn test_decode_list() {
        let decoded = decode_endpoints(LIST.as_bytes()).unwrap();
        assert_eq!(decoded.skipped, 0);
        assert_eq!(decoded.endpoints.len(), 2);

        let ams = &decoded.endpoints[0];
        assert_eq!(ams.id, 1234);
        assert_eq!(ams.hostname, "speed.example.nl:8080");
        assert_eq!(ams.display_name, "Amsterdam");
        assert_eq!(ams.country_code, "NL");
        assert_eq!(ams.sponsor, "Example BV");
        assert!((ams.latitude - 52.3667).abs() < 1e-9);
    }

    #[test]
    fn test_corrupt_records_are_skipped() {
        let doc = r#"<settings><servers>
<server url="http://a/upload.php" lat="10" lon="20" id="1" host="a:8080" />
<server url="http://b/upload.php" lon="20" id="2" host="b:8080" />
<server url="http://c/upload.php" lat="north" lon="20" id="3" host="c:8080" />
<server url="http://d/upload.php" lat="95" lon="20" id="4" host="d:8080" />
<server lat="1" lon="2" id="5" host="e:8080" />
</servers></settings>"#;
        let decoded = decode_endpoints(doc.as_bytes()).unwrap();
        assert_eq!(decoded.endpoints.len(), 1);
        assert_eq!(decoded.endpoints[0].hostname, "a:8080");
        assert_eq!(decoded.skipped, 4);
    }

    #[test]
    fn test_empty_list_is_ok() {
        let decoded = decode_endpoints(b"<settings><servers></servers></settings>").unwrap();
        assert!(decoded.endpoints.is_empty());
    }

    #[test]
    fn test_wrong_document_is_error() {
        assert!(decode_endpoints(b"<html><body>rate limited</body></html>").is_err());
        assert!(decode_endpoints(b"not xml at all <<<").is_err());
        assert!(matches!(
            decode_endpoints(&[0xff, 0xfe, 0x00]),
            Err(DocumentError::Utf8(_))
        ));
    }
}
