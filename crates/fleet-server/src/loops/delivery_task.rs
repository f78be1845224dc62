//! One delivery, driven end to end by its assigned drone.
//!
//! Legs: current position to pickup, pickup to dropoff, and a trip to the
//! nearest base when the battery ends below the recharge floor. Every leg
//! holds its route through a [`RouteLease`], so the altitude slot is given
//! back however the leg ends, cancellation included.

use chrono::Utc;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::time::sleep;

use crate::error::{FleetError, FleetResult};
use crate::events::FleetEvent;
use crate::state::FleetState;
use fleet_core::{DeliveryStatus, DroneStatus, FlightPlan, Point};

/// A registered route that is completed when dropped.
pub struct RouteLease {
    state: Arc<FleetState>,
    drone_id: String,
    plan: FlightPlan,
}

impl RouteLease {
    pub fn acquire(
        state: &Arc<FleetState>,
        drone_id: &str,
        start: Point,
        end: Point,
    ) -> FleetResult<Self> {
        let plan = state
            .routing()
            .calculate_route(start, end, drone_id, Utc::now())?;
        Ok(Self {
            state: state.clone(),
            drone_id: drone_id.to_string(),
            plan,
        })
    }

    pub fn plan(&self) -> &FlightPlan {
        &self.plan
    }
}

impl Drop for RouteLease {
    fn drop(&mut self) {
        self.state.routing().complete_route(&self.drone_id);
    }
}

/// Run a delivery to completion, rolling back on failure or panic.
pub async fn run_delivery(state: Arc<FleetState>, drone_id: String, delivery_id: String) {
    let outcome = AssertUnwindSafe(execute(&state, &drone_id, &delivery_id))
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::warn!(
                "Delivery {} failed on drone {}: {}. Returning it to the queue",
                delivery_id,
                drone_id,
                e
            );
            rollback(&state, &drone_id, &delivery_id);
        }
        Err(_) => {
            tracing::error!(
                "Delivery task for {} on drone {} panicked. Rolling back",
                delivery_id,
                drone_id
            );
            rollback(&state, &drone_id, &delivery_id);
        }
    }
}

async fn execute(state: &Arc<FleetState>, drone_id: &str, delivery_id: &str) -> FleetResult<()> {
    let rules = state.rules();
    let drone = state
        .store
        .get_drone(drone_id)
        .ok_or_else(|| FleetError::UnknownDrone(drone_id.to_string()))?;
    let delivery = state
        .store
        .get_delivery(delivery_id)
        .ok_or_else(|| FleetError::UnknownDelivery(delivery_id.to_string()))?;

    set_delivery_status(state, delivery_id, DeliveryStatus::InProgress)?;
    fly_leg(state, drone_id, drone.current_location, delivery.pickup).await?;

    sleep(state.scaled(rules.simulation.pickup_dwell_s)).await;
    set_delivery_status(state, delivery_id, DeliveryStatus::PickedUp)?;
    tracing::debug!("Drone {} picked up {}", drone_id, delivery_id);

    fly_leg(state, drone_id, delivery.pickup, delivery.dropoff).await?;

    let now = Utc::now();
    let completed = state
        .store
        .update_delivery(delivery_id, |d| {
            d.status = DeliveryStatus::Completed;
            d.completion_time = Some(now);
        })
        .ok_or_else(|| FleetError::UnknownDelivery(delivery_id.to_string()))?;
    state.publish(FleetEvent::delivery_update(&completed));

    let drone = state
        .store
        .update_drone(drone_id, |d| {
            d.current_delivery = None;
            d.completed_deliveries += 1;
        })
        .ok_or_else(|| FleetError::UnknownDrone(drone_id.to_string()))?;
    tracing::info!(
        "Drone {} completed {} (battery {:.1}%)",
        drone_id,
        delivery_id,
        drone.battery_level
    );

    if drone.battery_level < rules.drone.recharge_battery_floor {
        recharge(state, drone_id).await;
    } else if let Some(idle) = state
        .store
        .update_drone(drone_id, |d| d.set_status(DroneStatus::Idle, Utc::now()))
    {
        state.publish(FleetEvent::drone_position(&idle));
    }

    Ok(())
}

/// Fly one routed leg segment by segment.
async fn fly_leg(state: &Arc<FleetState>, drone_id: &str, from: Point, to: Point) -> FleetResult<()> {
    let lease = RouteLease::acquire(state, drone_id, from, to)?;
    tracing::debug!(
        "Drone {} flying {:.2} km at {} m",
        drone_id,
        lease.plan().total_distance_km,
        lease.plan().altitude_m
    );

    for segment in &lease.plan().segments {
        sleep(state.scaled(segment.time_secs())).await;
        let drone = state
            .store
            .update_drone(drone_id, |d| d.apply_segment(segment))
            .ok_or_else(|| FleetError::UnknownDrone(drone_id.to_string()))?;
        state.publish(FleetEvent::drone_position(&drone));
    }

    Ok(())
}

/// Return to the nearest base and hold on the charger.
///
/// Failure here leaves the drone idle where it is; the delivery is
/// already complete.
async fn recharge(state: &Arc<FleetState>, drone_id: &str) {
    let rules = state.rules();
    let Some(drone) = state
        .store
        .update_drone(drone_id, |d| d.set_status(DroneStatus::Charging, Utc::now()))
    else {
        return;
    };
    state.publish(FleetEvent::drone_position(&drone));

    let Some(base) = rules.nearest_base(&drone.current_location) else {
        tracing::warn!("No base available for drone {}, skipping recharge", drone_id);
        set_idle(state, drone_id);
        return;
    };

    tracing::info!(
        "Drone {} returning to base at {:.1}% battery",
        drone_id,
        drone.battery_level
    );
    if let Err(e) = fly_leg(state, drone_id, drone.current_location, base).await {
        tracing::warn!("Recharge trip failed for drone {}: {}", drone_id, e);
        set_idle(state, drone_id);
        return;
    }

    sleep(state.scaled(rules.simulation.charge_duration_s)).await;

    if let Some(charged) = state.store.update_drone(drone_id, |d| {
        d.battery_level = rules.drone.max_battery;
        d.current_location = base;
        d.set_status(DroneStatus::Idle, Utc::now());
    }) {
        tracing::info!("Drone {} recharged", drone_id);
        state.publish(FleetEvent::drone_position(&charged));
    }
}

fn set_delivery_status(state: &FleetState, delivery_id: &str, status: DeliveryStatus) -> FleetResult<()> {
    let delivery = state
        .store
        .update_delivery(delivery_id, |d| d.status = status)
        .ok_or_else(|| FleetError::UnknownDelivery(delivery_id.to_string()))?;
    state.publish(FleetEvent::delivery_update(&delivery));
    Ok(())
}

fn set_idle(state: &FleetState, drone_id: &str) {
    if let Some(drone) = state.store.update_drone(drone_id, |d| {
        d.current_delivery = None;
        d.set_status(DroneStatus::Idle, Utc::now());
    }) {
        state.publish(FleetEvent::drone_position(&drone));
    }
}

/// Undo an unfinished delivery: drone idle, delivery pending and queued.
fn rollback(state: &FleetState, drone_id: &str, delivery_id: &str) {
    set_idle(state, drone_id);

    let Some(current) = state.store.get_delivery(delivery_id) else {
        return;
    };
    if current.status == DeliveryStatus::Completed {
        return;
    }
    if let Some(delivery) = state
        .store
        .update_delivery(delivery_id, |d| d.reset_to_pending())
    {
        state.store.enqueue(&delivery);
        state.publish(FleetEvent::delivery_update(&delivery));
    }
}
