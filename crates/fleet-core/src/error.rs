//! Error types for routing, collision avoidance and configuration.

use thiserror::Error;

/// Failure while building or registering a route.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RoutingError {
    #[error("drone id is required")]
    MissingDroneId,
    #[error("invalid {field} coordinate: lat={lat}, lon={lon}, altitude={altitude_m}")]
    InvalidPoint {
        field: &'static str,
        lat: f64,
        lon: f64,
        altitude_m: f64,
    },
    #[error("no cached route for drone {0}")]
    NoCachedRoute(String),
    #[error("route registration rejected for drone {drone_id}: {source}")]
    Rejected {
        drone_id: String,
        #[source]
        source: CollisionError,
    },
}

/// Internal failure inside the collision avoidance service.
///
/// Registration that returns one of these leaves the active route registry untouched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CollisionError {
    #[error("route has {0} waypoints, need at least 2")]
    TooFewWaypoints(usize),
    #[error("waypoint {index} is earlier than its predecessor")]
    NonMonotonic { index: usize },
    #[error("waypoint {index} has a non-finite coordinate")]
    NonFinite { index: usize },
}

/// Rejected configuration value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("time scale must be positive, got {0}")]
    NonPositiveTimeScale(f64),
    #[error("altitude ladder is empty")]
    EmptyAltitudeLadder,
    #[error("at least one base location is required")]
    NoBases,
    #[error("service area is empty or inverted")]
    InvalidServiceArea,
    #[error("{name} must be positive, got {value}")]
    NonPositive { name: &'static str, value: f64 },
    #[error("{name} is out of range: {value}")]
    OutOfRange { name: &'static str, value: f64 },
}
