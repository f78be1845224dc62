//! Fleet boundary operations.
//!
//! [`FleetManager`] is a cheap handle around one simulation: its shared
//! state and the control block of its dispatch loop. Clones drive the same
//! fleet.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::{FleetError, FleetResult};
use crate::events::{EventSink, FleetEvent};
use crate::generator::generate_deliveries;
use crate::loops::dispatch_loop::run_dispatch_loop;
use crate::state::FleetState;
use crate::stats::{FleetStatistics, FleetStatusView};
use fleet_core::rules::validate_time_scale;
use fleet_core::{Delivery, DeliveryOrder, Drone, FleetRules, FlightPlan, Point};

#[derive(Default)]
struct Control {
    shutdown: Option<broadcast::Sender<()>>,
    handle: Option<JoinHandle<()>>,
    drone_count: usize,
}

#[derive(Clone)]
pub struct FleetManager {
    state: Arc<FleetState>,
    control: Arc<Mutex<Control>>,
}

impl FleetManager {
    pub fn new(rules: FleetRules) -> FleetResult<Self> {
        rules.validate()?;
        Ok(Self {
            state: Arc::new(FleetState::new(rules)),
            control: Arc::new(Mutex::new(Control::default())),
        })
    }

    pub fn state(&self) -> &Arc<FleetState> {
        &self.state
    }

    pub fn rules(&self) -> FleetRules {
        self.state.rules()
    }

    /// Replace the rules. Only allowed while no run is active.
    pub async fn configure(&self, rules: FleetRules) -> FleetResult<()> {
        rules.validate()?;
        let _control = self.control.lock().await;
        if self.state.is_running() {
            return Err(FleetError::AlreadyRunning);
        }
        self.state.replace_rules(rules);
        tracing::info!("Fleet rules updated");
        Ok(())
    }

    /// Change the time scale, effective from the next wait.
    pub fn set_time_scale(&self, scale: f64) -> FleetResult<()> {
        validate_time_scale(scale)?;
        self.state.set_time_scale(scale);
        tracing::info!("Time scale set to {}", scale);
        Ok(())
    }

    pub fn time_scale(&self) -> f64 {
        self.state.time_scale()
    }

    /// Start a run with `delivery_count` random deliveries.
    pub async fn start(&self, drone_count: usize, delivery_count: usize) -> FleetResult<Uuid> {
        if self.state.is_running() {
            return Err(FleetError::AlreadyRunning);
        }
        let deliveries = self.random_deliveries(delivery_count);
        self.launch(drone_count, deliveries).await
    }

    /// Start a run from caller-supplied orders.
    pub async fn start_with_orders(&self, drone_count: usize, orders: Vec<DeliveryOrder>) -> FleetResult<Uuid> {
        if orders.is_empty() {
            return Err(FleetError::EmptyOrders);
        }
        for (index, order) in orders.iter().enumerate() {
            order
                .validate()
                .map_err(|reason| FleetError::InvalidOrder { index, reason })?;
        }
        if self.state.is_running() {
            return Err(FleetError::AlreadyRunning);
        }

        let now = Utc::now();
        let deliveries: Vec<Delivery> = {
            let routing = self.state.routing();
            orders
                .iter()
                .enumerate()
                .map(|(i, order)| {
                    let mut delivery = Delivery::from_order(format!("delivery_{i}"), order, now);
                    delivery.estimated_time = routing
                        .estimate_route(order.pickup, order.dropoff, now)
                        .ok()
                        .map(|plan| plan.total_time_s);
                    delivery
                })
                .collect()
        };
        self.launch(drone_count, deliveries).await
    }

    async fn launch(&self, drone_count: usize, deliveries: Vec<Delivery>) -> FleetResult<Uuid> {
        if drone_count == 0 {
            return Err(FleetError::InvalidFleetSize(drone_count));
        }

        let mut control = self.control.lock().await;
        if self.state.is_running() {
            return Err(FleetError::AlreadyRunning);
        }
        // A drained loop has already exited; collect it.
        if let Some(handle) = control.handle.take() {
            let _ = handle.await;
        }
        control.shutdown = None;

        self.wipe();
        self.spawn_drones(drone_count);
        let delivery_count = deliveries.len();
        self.load_deliveries(deliveries);

        let run_id = self.state.lifecycle().start(Instant::now())?;
        let (tx, rx) = broadcast::channel(1);
        control.handle = Some(tokio::spawn(run_dispatch_loop(self.state.clone(), rx)));
        control.shutdown = Some(tx);
        control.drone_count = drone_count;

        tracing::info!(
            "Fleet started: run {} with {} drone(s) and {} deliveries",
            run_id,
            drone_count,
            delivery_count
        );
        Ok(run_id)
    }

    /// Stop assigning new work. In-flight deliveries keep flying.
    pub fn pause(&self) -> FleetResult<()> {
        self.state.lifecycle().pause(Instant::now())?;
        tracing::info!("Fleet paused");
        self.state.publish(FleetEvent::fleet_status(self.state.summary()));
        Ok(())
    }

    pub fn resume(&self) -> FleetResult<()> {
        self.state.lifecycle().resume(Instant::now())?;
        tracing::info!("Fleet resumed");
        self.state.publish(FleetEvent::fleet_status(self.state.summary()));
        Ok(())
    }

    /// Stop everything and rebuild the fleet with a fresh delivery batch.
    ///
    /// In-flight delivery tasks are cancelled and awaited before any state
    /// is touched. If the dispatch loop cannot be joined cleanly nothing is
    /// wiped and the call may be retried.
    pub async fn reset(&self) -> FleetResult<()> {
        let mut control = self.control.lock().await;
        if let Some(tx) = control.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = control.handle.take() {
            handle
                .await
                .map_err(|e| FleetError::ResetIncomplete(e.to_string()))?;
        }

        self.state.lifecycle().clear();
        self.wipe();

        let drone_count = control.drone_count;
        let rules = self.state.rules();
        self.spawn_drones(drone_count);
        let deliveries =
            self.random_deliveries(drone_count * rules.simulation.deliveries_per_drone_on_reset);
        self.load_deliveries(deliveries);

        tracing::info!("Fleet reset with {} drone(s)", drone_count);
        self.state.publish(FleetEvent::fleet_status(self.state.summary()));
        Ok(())
    }

    pub fn status(&self) -> FleetStatusView {
        self.state.status_view()
    }

    pub fn statistics_history(&self) -> Vec<FleetStatistics> {
        self.state.store.statistics_history()
    }

    pub fn current_statistics(&self) -> Option<FleetStatistics> {
        self.state.store.last_statistics()
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    pub fn is_paused(&self) -> bool {
        self.state.is_paused()
    }

    pub fn total_pause_duration(&self) -> Duration {
        self.state.lifecycle().total_pause_duration(Instant::now())
    }

    /// Plan and register a route. The caller owns it until [`complete_route`].
    ///
    /// [`complete_route`]: FleetManager::complete_route
    pub fn calculate_route(&self, start: Point, end: Point, drone_id: &str) -> FleetResult<FlightPlan> {
        let plan = self
            .state
            .routing()
            .calculate_route(start, end, drone_id, Utc::now())?;
        Ok(plan)
    }

    pub fn update_route(
        &self,
        drone_id: &str,
        position: Point,
        time: DateTime<Utc>,
    ) -> FleetResult<FlightPlan> {
        let plan = self.state.routing().update_route(drone_id, position, time)?;
        Ok(plan)
    }

    pub fn complete_route(&self, drone_id: &str) {
        self.state.routing().complete_route(drone_id);
    }

    pub fn subscribe(&self, capacity: usize) -> mpsc::Receiver<FleetEvent> {
        self.state.events.subscribe(capacity)
    }

    pub fn add_sink(&self, sink: Box<dyn EventSink>) -> u64 {
        self.state.events.add_sink(sink)
    }

    /// Resolve once the current run has drained or been stopped.
    pub async fn wait_until_stopped(&self) {
        let poll = Duration::from_millis(self.state.rules().simulation.tick_interval_ms.max(1));
        while self.state.is_running() {
            tokio::time::sleep(poll).await;
        }
    }

    fn random_deliveries(&self, count: usize) -> Vec<Delivery> {
        let rules = self.state.rules();
        let routing = self.state.routing();
        let mut rng = rand::rng();
        generate_deliveries(count, 0, &rules, &routing, &mut rng, Utc::now())
    }

    fn wipe(&self) {
        self.state.routing().reset();
        self.state.store.clear_deliveries();
        self.state.store.clear_drones();
        self.state.store.clear_history();
    }

    /// Fresh drones, full and idle, spread round-robin over the bases.
    fn spawn_drones(&self, count: usize) {
        let rules = self.state.rules();
        let now = Utc::now();
        for i in 0..count {
            let base = rules.bases[i % rules.bases.len()];
            let drone = Drone::new(format!("drone_{i}"), base, rules.drone.max_battery, now);
            self.state.publish(FleetEvent::drone_position(&drone));
            self.state.store.insert_drone(drone);
        }
    }

    fn load_deliveries(&self, deliveries: Vec<Delivery>) {
        for delivery in deliveries {
            self.state.store.enqueue(&delivery);
            self.state.publish(FleetEvent::delivery_update(&delivery));
            self.state.store.insert_delivery(delivery);
        }
    }
}
