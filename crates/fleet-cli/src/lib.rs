//! Fleet CLI - operator tools for the delivery fleet simulation.
//!
//! Binaries:
//! - simulate: run a fleet until its work drains and print the final status
//! - plan_route: compute one collision-checked flight plan

pub mod input;

pub use input::{load_orders, parse_point};
