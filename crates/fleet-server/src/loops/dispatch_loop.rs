//! Dispatch loop.
//!
//! Matches idle drones with the nearest eligible pending delivery, spawns
//! one task per accepted delivery, snapshots statistics and stops once all
//! work has drained.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time::{interval, Instant, MissedTickBehavior};

use crate::events::FleetEvent;
use crate::loops::delivery_task;
use crate::state::FleetState;
use fleet_core::spatial::distance_km;
use fleet_core::{Delivery, DeliveryStatus, Drone, DroneStatus, FleetRules};

pub async fn run_dispatch_loop(state: Arc<FleetState>, mut shutdown: broadcast::Receiver<()>) {
    let rules = state.rules();
    let mut ticker = interval(Duration::from_millis(rules.simulation.tick_interval_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let stats_every =
        Duration::try_from_secs_f64(rules.simulation.stats_interval_s).unwrap_or(Duration::ZERO);
    let mut last_stats: Option<Instant> = None;
    let mut tasks: JoinSet<()> = JoinSet::new();

    tracing::info!("Dispatch loop started");

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("Dispatch loop shutting down, cancelling {} delivery task(s)", tasks.len());
                tasks.shutdown().await;
                break;
            }
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = joined {
                    if !e.is_cancelled() {
                        tracing::error!("Delivery task ended abnormally: {}", e);
                    }
                }
            }
            _ = ticker.tick() => {
                let now = Utc::now();

                if state.is_paused() {
                    // Paused time does not count as waiting.
                    touch_idle_drones(&state, now);
                } else {
                    for (drone_id, delivery_id) in dispatch_tick(&state, &rules, now) {
                        tasks.spawn(delivery_task::run_delivery(state.clone(), drone_id, delivery_id));
                    }
                }

                let due = last_stats.map_or(true, |at| at.elapsed() >= stats_every);
                if due {
                    state.record_statistics();
                    last_stats = Some(Instant::now());
                }

                if !state.is_paused() && tasks.is_empty() && is_drained(&state) {
                    state.lifecycle().finish(Instant::now());
                    state.record_statistics();
                    let view = state.summary();
                    tracing::info!(
                        "All work drained: {} of {} deliveries completed",
                        view.completed_deliveries,
                        view.total_deliveries
                    );
                    break;
                }
            }
        }
    }
}

/// One assignment pass. Returns the (drone, delivery) pairs that were
/// assigned and still need a task.
pub fn dispatch_tick(state: &FleetState, rules: &FleetRules, now: DateTime<Utc>) -> Vec<(String, String)> {
    let scale = state.time_scale();
    let idle: Vec<Drone> = state
        .store
        .all_drones()
        .into_iter()
        .filter(Drone::is_idle)
        .collect();

    for drone in &idle {
        state.store.update_drone(&drone.id, |d| {
            let waited = (now - d.last_status_change).num_milliseconds().max(0) as f64 / 1000.0;
            d.total_waiting_time += waited * scale;
            d.last_status_change = now;
        });
    }

    let mut assigned = Vec::new();
    for drone in idle {
        if drone.battery_level <= rules.drone.dispatch_battery_floor {
            continue;
        }
        let Some(delivery) = nearest_eligible(state, &drone, rules) else {
            continue;
        };
        if assign(state, &drone.id, &delivery.id, now) {
            assigned.push((drone.id, delivery.id));
        }
    }
    assigned
}

/// Closest queued delivery the drone may carry. Ties go to the more
/// urgent delivery.
fn nearest_eligible(state: &FleetState, drone: &Drone, rules: &FleetRules) -> Option<Delivery> {
    let mut best: Option<(f64, Delivery)> = None;
    for delivery_id in state.store.queued_ids() {
        let Some(delivery) = state.store.get_delivery(&delivery_id) else {
            continue;
        };
        if delivery.status != DeliveryStatus::Pending || delivery.weight_kg > rules.drone.max_payload_kg {
            continue;
        }
        let distance = distance_km(&drone.current_location, &delivery.pickup);
        if best.as_ref().map_or(true, |(closest, _)| distance < *closest) {
            best = Some((distance, delivery));
        }
    }
    best.map(|(_, delivery)| delivery)
}

fn assign(state: &FleetState, drone_id: &str, delivery_id: &str, now: DateTime<Utc>) -> bool {
    if !state.store.dequeue(delivery_id) {
        return false;
    }

    let Some(delivery) = state.store.update_delivery(delivery_id, |d| {
        d.status = DeliveryStatus::Assigned;
        d.assigned_drone = Some(drone_id.to_string());
    }) else {
        return false;
    };

    let Some(drone) = state.store.update_drone(drone_id, |d| {
        d.set_status(DroneStatus::EnRoute, now);
        d.current_delivery = Some(delivery_id.to_string());
    }) else {
        if let Some(restored) = state.store.update_delivery(delivery_id, |d| d.reset_to_pending()) {
            state.store.enqueue(&restored);
        }
        return false;
    };

    tracing::info!(
        "Assigned {} (priority {}, {:.2} kg) to drone {}",
        delivery_id,
        delivery.priority,
        delivery.weight_kg,
        drone_id
    );
    state.publish(FleetEvent::delivery_update(&delivery));
    state.publish(FleetEvent::drone_position(&drone));
    true
}

fn touch_idle_drones(state: &FleetState, now: DateTime<Utc>) {
    for drone in state.store.all_drones().into_iter().filter(Drone::is_idle) {
        state.store.update_drone(&drone.id, |d| d.last_status_change = now);
    }
}

fn is_drained(state: &FleetState) -> bool {
    state.store.queue_len() == 0 && state.store.all_drones().iter().all(Drone::is_idle)
}
