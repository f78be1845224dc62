//! Delivery fleet simulation engine.

pub mod config;
pub mod error;
pub mod events;
pub mod fleet;
pub mod generator;
pub mod logging;
pub mod loops;
pub mod state;
pub mod stats;

pub use config::Config;
pub use error::{FleetError, FleetResult};
pub use events::{EventHub, EventSink, EventType, FleetEvent, SinkError};
pub use fleet::FleetManager;
pub use stats::{FleetStatistics, FleetStatusView, StatusSummary};
