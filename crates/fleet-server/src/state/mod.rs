//! Shared state owned by one fleet instance.

mod lifecycle;
mod store;

pub use lifecycle::Lifecycle;
pub use store::FleetStore;

use fleet_core::{FleetRules, RoutingService};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, RwLock};
use std::time::Duration;

use crate::events::{EventHub, FleetEvent};
use crate::stats::{FleetStatistics, FleetStatusView, RunInfo, StatusSummary};

/// Everything the dispatch loop, delivery tasks and the boundary share.
pub struct FleetState {
    pub store: FleetStore,
    pub events: EventHub,
    routing: Mutex<RoutingService>,
    rules: RwLock<FleetRules>,
    time_scale: AtomicU64,
    lifecycle: Mutex<Lifecycle>,
}

impl FleetState {
    pub fn new(rules: FleetRules) -> Self {
        Self {
            store: FleetStore::new(),
            events: EventHub::new(),
            routing: Mutex::new(RoutingService::new(rules.clone())),
            time_scale: AtomicU64::new(rules.simulation.time_scale.to_bits()),
            rules: RwLock::new(rules),
            lifecycle: Mutex::new(Lifecycle::default()),
        }
    }

    pub fn rules(&self) -> FleetRules {
        match self.rules.read() {
            Ok(rules) => rules.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Swap the rules and rebuild the routing service around them.
    pub fn replace_rules(&self, rules: FleetRules) {
        self.set_time_scale(rules.simulation.time_scale);
        *self.routing() = RoutingService::new(rules.clone());
        match self.rules.write() {
            Ok(mut current) => *current = rules,
            Err(poisoned) => *poisoned.into_inner() = rules,
        }
    }

    /// Exclusive access to the routing service and its altitude table.
    ///
    /// A panic elsewhere while holding the lock does not make the table
    /// unusable; the guard is recovered.
    pub fn routing(&self) -> MutexGuard<'_, RoutingService> {
        self.routing.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn time_scale(&self) -> f64 {
        f64::from_bits(self.time_scale.load(Ordering::Relaxed))
    }

    pub fn set_time_scale(&self, scale: f64) {
        self.time_scale.store(scale.to_bits(), Ordering::Relaxed);
    }

    /// Real time to wait for `simulated_secs` at the current time scale.
    pub fn scaled(&self, simulated_secs: f64) -> Duration {
        let secs = simulated_secs / self.time_scale();
        if secs.is_finite() && secs > 0.0 {
            Duration::from_secs_f64(secs)
        } else {
            Duration::ZERO
        }
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle().is_running()
    }

    pub fn is_paused(&self) -> bool {
        self.lifecycle().is_paused()
    }

    pub fn run_info(&self) -> RunInfo {
        let now = tokio::time::Instant::now();
        let lifecycle = self.lifecycle();
        RunInfo {
            run_id: lifecycle.run_id(),
            runtime_secs: lifecycle.runtime(now).as_secs_f64(),
            is_running: lifecycle.is_running(),
            is_paused: lifecycle.is_paused(),
        }
    }

    pub fn summary(&self) -> StatusSummary {
        let drones = self.store.all_drones();
        let deliveries = self.store.all_deliveries();
        let max_payload = self.rules().drone.max_payload_kg;
        StatusSummary::build(&drones, &deliveries, max_payload, self.run_info())
    }

    pub fn status_view(&self) -> FleetStatusView {
        let drones = self.store.all_drones();
        let deliveries = self.store.all_deliveries();
        let max_payload = self.rules().drone.max_payload_kg;
        let stats = StatusSummary::build(&drones, &deliveries, max_payload, self.run_info());
        FleetStatusView {
            drones,
            deliveries,
            stats,
        }
    }

    /// Append a statistics snapshot and broadcast the fleet summary.
    pub fn record_statistics(&self) {
        let drones = self.store.all_drones();
        let deliveries = self.store.all_deliveries();
        self.store
            .push_statistics(FleetStatistics::snapshot(&drones, &deliveries, chrono::Utc::now()));
        self.publish(FleetEvent::fleet_status(self.summary()));
    }

    pub fn publish(&self, event: FleetEvent) {
        self.events.publish(event);
    }
}
