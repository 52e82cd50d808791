//! Great-circle distance between two points on a spherical Earth.

/// Earth radius used for ranking endpoints. Spherical, not WGS-84.
pub const EARTH_RADIUS_M: f64 = 6_378_100.0;

/// Haversine (orthodromic) distance in metres between two lat/lon pairs given in degrees.
///
/// Finite inputs always give a finite, non-negative result. NaN or infinite
/// inputs propagate NaN; validate coordinates before calling.
pub fn distance_meters(lat_a: f64, lon_a: f64, lat_b: f64, lon_b: f64) -> f64 {
    let (lat_a, lon_a) = (lat_a.to_radians(), lon_a.to_radians());
    let (lat_b, lon_b) = (lat_b.to_radians(), lon_b.to_radians());

    let h = hsin(lat_b - lat_a) + lat_a.cos() * lat_b.cos() * hsin(lon_b - lon_a);
    // Rounding can push h a hair above 1.0 for antipodal points.
    2.0 * EARTH_RADIUS_M * h.clamp(0.0, 1.0).sqrt().asin()
}

/// Returns true when `lat` is within [-90, 90] and `lon` within [-180, 180].
pub fn is_valid_coordinate(lat: f64, lon: f64) -> bool {
    (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)
}

fn hsin(theta: f64) -> f64 {
    (theta / 2.0).sin().powi(2)
}
