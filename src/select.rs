//! Nearest-endpoint selection by great-circle distance.

use serde::Serialize;
use thiserror::Error;

use crate::directory::Endpoint;
use crate::geo;
use crate::location::ClientLocation;

#[derive(Debug, Error, PartialEq)]
pub enum SelectError {
    #[error("no candidate endpoints to choose from")]
    EmptySet,

    #[error("no discovered endpoint has id {0}")]
    UnknownId(i64),
}

/// An endpoint together with its distance from the client.
#[derive(Debug, Clone, Serialize)]
pub struct RankedEndpoint {
    pub endpoint: Endpoint,
    pub distance_m: f64,
}

fn distance_to(location: &ClientLocation, endpoint: &Endpoint) -> f64 {
    geo::distance_meters(
        location.latitude,
        location.longitude,
        endpoint.latitude,
        endpoint.longitude,
    )
}

/// Return the endpoint closest to `location`.
///
/// On equal distances the first one in iteration order wins.
pub fn select_nearest<'a>(
    location: &ClientLocation,
    endpoints: &'a [Endpoint],
) -> Result<&'a Endpoint, SelectError> {
    let mut best: Option<(&Endpoint, f64)> = None;
    for endpoint in endpoints {
        let d = distance_to(location, endpoint);
        // strict `<` keeps the earlier endpoint on ties
        if best.map_or(true, |(_, best_d)| d < best_d) {
            best = Some((endpoint, d));
        }
    }
    best.map(|(e, _)| e).ok_or(SelectError::EmptySet)
}

/// Pick the first endpoint carrying `id`.
pub fn select_by_id(endpoints: &[Endpoint], id: i64) -> Result<&Endpoint, SelectError> {
    if endpoints.is_empty() {
        return Err(SelectError::EmptySet);
    }
    endpoints
        .iter()
        .find(|e| e.id == id)
        .ok_or(SelectError::UnknownId(id))
}

/// All endpoints sorted by ascending distance; ties keep input order.
pub fn rank_by_distance(location: &ClientLocation, endpoints: &[Endpoint]) -> Vec<RankedEndpoint> {
    let mut ranked: Vec<RankedEndpoint> = endpoints
        .iter()
        .map(|e| RankedEndpoint {
            distance_m: distance_to(location, e),
            endpoint: e.clone(),
        })
        .collect();
    ranked.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));
    ranked
}
