//! Errors surfaced by the fleet boundary operations.

use fleet_core::{ConfigError, RoutingError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FleetError {
    #[error("fleet is already running")]
    AlreadyRunning,
    #[error("fleet is not running")]
    NotRunning,
    #[error("fleet is not paused")]
    NotPaused,
    #[error("fleet size must be at least 1, got {0}")]
    InvalidFleetSize(usize),
    #[error("no delivery orders given")]
    EmptyOrders,
    #[error("invalid delivery order #{index}: {reason}")]
    InvalidOrder { index: usize, reason: String },
    #[error("unknown drone: {0}")]
    UnknownDrone(String),
    #[error("unknown delivery: {0}")]
    UnknownDelivery(String),
    #[error("dispatch loop did not shut down cleanly: {0}")]
    ResetIncomplete(String),
    #[error(transparent)]
    Routing(#[from] RoutingError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type FleetResult<T> = Result<T, FleetError>;
