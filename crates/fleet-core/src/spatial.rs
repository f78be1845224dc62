//! Spatial math for routing, cost modelling and collision checks.

use crate::models::{Point, Waypoint};
use chrono::{DateTime, Utc};

/// Mean Earth radius used by the Haversine formula.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;
pub const EARTH_RADIUS_KM: f64 = 6_371.0;

/// Calculate distance between two points in meters using Haversine formula.
///
/// # Arguments
/// * `lat1`, `lon1` - First point coordinates in decimal degrees
/// * `lat2`, `lon2` - Second point coordinates in decimal degrees
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Horizontal great-circle distance between two points (meters).
pub fn distance_m(a: &Point, b: &Point) -> f64 {
    haversine_distance(a.lat, a.lon, b.lat, b.lon)
}

/// Horizontal great-circle distance between two points (kilometers).
pub fn distance_km(a: &Point, b: &Point) -> f64 {
    distance_m(a, b) / 1000.0
}

/// Calculate bearing from point 1 to point 2 in radians.
/// Returns bearing in radians, 0 = north, π/2 = east.
pub fn bearing(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_lambda = (lon2 - lon1).to_radians();

    let x = delta_lambda.sin() * phi2.cos();
    let y = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * delta_lambda.cos();

    x.atan2(y)
}

/// Initial heading from `start` towards `end`, normalized to [0, 360) degrees.
pub fn initial_heading_deg(start: &Point, end: &Point) -> f64 {
    let heading = bearing(start.lat, start.lon, end.lat, end.lon).to_degrees();
    let normalized = heading.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if normalized >= 360.0 {
        0.0
    } else {
        normalized
    }
}

/// Offset a position by distance and bearing.
///
/// # Arguments
/// * `lat`, `lon` - Starting position in degrees
/// * `distance_m` - Distance in meters
/// * `bearing_rad` - Bearing in radians (0 = north, π/2 = east)
///
/// # Returns
/// (new_lat, new_lon) in degrees
pub fn offset_by_bearing(lat: f64, lon: f64, distance_m: f64, bearing_rad: f64) -> (f64, f64) {
    if distance_m.abs() <= f64::EPSILON {
        return (lat, lon);
    }

    let lat1 = lat.to_radians();
    let lon1 = lon.to_radians();
    let angular_distance = distance_m / EARTH_RADIUS_M;

    let sin_lat1 = lat1.sin();
    let cos_lat1 = lat1.cos();
    let sin_ad = angular_distance.sin();
    let cos_ad = angular_distance.cos();

    let sin_lat2 = sin_lat1 * cos_ad + cos_lat1 * sin_ad * bearing_rad.cos();
    let lat2 = sin_lat2.clamp(-1.0, 1.0).asin();

    let y = bearing_rad.sin() * sin_ad * cos_lat1;
    let x = cos_ad - sin_lat1 * sin_lat2;
    let mut lon2 = lon1 + y.atan2(x);
    lon2 =
        (lon2 + std::f64::consts::PI).rem_euclid(2.0 * std::f64::consts::PI) - std::f64::consts::PI;

    (lat2.to_degrees(), lon2.to_degrees())
}

/// Linear interpolation between two points by fraction `t` in [0, 1].
pub fn lerp_point(start: &Point, end: &Point, t: f64) -> Point {
    Point::new(
        start.lat + (end.lat - start.lat) * t,
        start.lon + (end.lon - start.lon) * t,
        start.altitude_m + (end.altitude_m - start.altitude_m) * t,
    )
}

/// Position between two waypoints at `time`.
///
/// Times outside the pair clamp to the nearest endpoint, which keeps its
/// own timestamp.
pub fn interpolate_waypoint(start: &Waypoint, end: &Waypoint, time: DateTime<Utc>) -> Waypoint {
    if time <= start.timestamp {
        return *start;
    }
    if time >= end.timestamp {
        return *end;
    }

    let span = (end.timestamp - start.timestamp).num_microseconds().unwrap_or(0) as f64;
    if span <= 0.0 {
        return *start;
    }
    let elapsed = (time - start.timestamp).num_microseconds().unwrap_or(0) as f64;
    let ratio = (elapsed / span).clamp(0.0, 1.0);

    Waypoint::new(lerp_point(&start.point(), &end.point(), ratio), time)
}

/// Convert fractional seconds to a chrono duration with microsecond precision.
pub fn secs_to_duration(secs: f64) -> chrono::Duration {
    chrono::Duration::microseconds((secs * 1_000_000.0).round() as i64)
}
