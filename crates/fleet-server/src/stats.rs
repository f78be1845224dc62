//! Aggregate fleet statistics.

use chrono::{DateTime, Utc};
use fleet_core::{Delivery, DeliveryStatus, Drone, DroneStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Periodic snapshot kept in the statistics history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetStatistics {
    pub timestamp: DateTime<Utc>,
    pub total_drones: usize,
    pub active_drones: usize,
    pub idle_drones: usize,
    pub charging_drones: usize,
    pub total_deliveries: usize,
    pub pending_deliveries: usize,
    pub completed_deliveries: usize,
    /// Simulated seconds, averaged over drones
    pub avg_waiting_time: f64,
    /// Percent
    pub avg_battery_level: f64,
    /// km
    pub total_distance: f64,
    /// Simulated seconds
    pub total_flight_time: f64,
    /// Simulated seconds
    pub total_waiting_time: f64,
}

impl FleetStatistics {
    pub fn snapshot(drones: &[Drone], deliveries: &[Delivery], now: DateTime<Utc>) -> Self {
        let count_status = |status: DroneStatus| drones.iter().filter(|d| d.status == status).count();
        let total_waiting_time: f64 = drones.iter().map(|d| d.total_waiting_time).sum();

        Self {
            timestamp: now,
            total_drones: drones.len(),
            active_drones: drones.iter().filter(|d| !d.is_idle()).count(),
            idle_drones: count_status(DroneStatus::Idle),
            charging_drones: count_status(DroneStatus::Charging),
            total_deliveries: deliveries.len(),
            pending_deliveries: count_deliveries(deliveries, DeliveryStatus::Pending),
            completed_deliveries: count_deliveries(deliveries, DeliveryStatus::Completed),
            avg_waiting_time: mean(total_waiting_time, drones.len()),
            avg_battery_level: mean(drones.iter().map(|d| d.battery_level).sum(), drones.len()),
            total_distance: drones.iter().map(|d| d.total_distance).sum(),
            total_flight_time: drones.iter().map(|d| d.total_flight_time).sum(),
            total_waiting_time,
        }
    }
}

/// Run bookkeeping the summary needs besides drones and deliveries.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunInfo {
    pub run_id: Option<Uuid>,
    /// Wall-clock seconds since start, paused time excluded
    pub runtime_secs: f64,
    pub is_running: bool,
    pub is_paused: bool,
}

/// Headline numbers returned with every status query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSummary {
    pub run_id: Option<Uuid>,
    pub total_drones: usize,
    pub total_deliveries: usize,
    pub completed_deliveries: usize,
    pub pending_deliveries: usize,
    /// Pending deliveries no drone can ever carry
    pub stuck_deliveries: usize,
    /// Drones not idle, charging included
    pub active_drones: usize,
    pub charging_drones: usize,
    /// Minutes from creation to completion, completed deliveries only
    pub avg_delivery_time: f64,
    /// Percent of battery consumed, averaged over drones
    pub avg_battery_usage: f64,
    /// km
    pub total_distance: f64,
    /// Minutes
    pub total_runtime: f64,
    pub is_running: bool,
    pub is_paused: bool,
}

impl StatusSummary {
    pub fn build(drones: &[Drone], deliveries: &[Delivery], max_payload_kg: f64, run: RunInfo) -> Self {
        let completed: Vec<&Delivery> = deliveries
            .iter()
            .filter(|d| d.status == DeliveryStatus::Completed)
            .collect();
        let delivery_minutes: f64 = completed
            .iter()
            .filter_map(|d| d.completion_time.map(|done| done - d.creation_time))
            .map(|elapsed| elapsed.num_milliseconds() as f64 / 60_000.0)
            .sum();

        Self {
            run_id: run.run_id,
            total_drones: drones.len(),
            total_deliveries: deliveries.len(),
            completed_deliveries: completed.len(),
            pending_deliveries: count_deliveries(deliveries, DeliveryStatus::Pending),
            stuck_deliveries: deliveries
                .iter()
                .filter(|d| d.status == DeliveryStatus::Pending && d.weight_kg > max_payload_kg)
                .count(),
            active_drones: drones.iter().filter(|d| !d.is_idle()).count(),
            charging_drones: drones.iter().filter(|d| d.status == DroneStatus::Charging).count(),
            avg_delivery_time: mean(delivery_minutes, completed.len()),
            avg_battery_usage: mean(
                drones.iter().map(|d| (100.0 - d.battery_level).max(0.0)).sum(),
                drones.len(),
            ),
            total_distance: drones.iter().map(|d| d.total_distance).sum(),
            total_runtime: run.runtime_secs / 60.0,
            is_running: run.is_running,
            is_paused: run.is_paused,
        }
    }
}

/// Full answer to a status query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetStatusView {
    pub drones: Vec<Drone>,
    pub deliveries: Vec<Delivery>,
    pub stats: StatusSummary,
}

fn count_deliveries(deliveries: &[Delivery], status: DeliveryStatus) -> usize {
    deliveries.iter().filter(|d| d.status == status).count()
}

fn mean(total: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::{DeliveryOrder, Point};

    fn sample() -> (Vec<Drone>, Vec<Delivery>, DateTime<Utc>) {
        let now = Utc::now();
        let base = Point::new(28.6, 77.2, 0.0);
        let mut busy = Drone::new("drone_0", base, 100.0, now);
        busy.status = DroneStatus::EnRoute;
        busy.battery_level = 60.0;
        busy.total_distance = 4.0;
        let mut idle = Drone::new("drone_1", base, 100.0, now);
        idle.total_waiting_time = 30.0;

        let order = DeliveryOrder::new(base, Point::new(28.61, 77.21, 0.0), 1, 1.0);
        let mut done = Delivery::from_order("delivery_0", &order, now);
        done.status = DeliveryStatus::Completed;
        done.completion_time = Some(now + chrono::Duration::minutes(3));
        let pending = Delivery::from_order("delivery_1", &order, now);
        let heavy = Delivery::from_order(
            "delivery_2",
            &DeliveryOrder::new(base, base, 2, 6.0),
            now,
        );
        (vec![busy, idle], vec![done, pending, heavy], now)
    }

    #[test]
    fn snapshot_counts_and_averages() {
        let (drones, deliveries, now) = sample();
        let stats = FleetStatistics::snapshot(&drones, &deliveries, now);
        assert_eq!(stats.total_drones, 2);
        assert_eq!(stats.active_drones, 1);
        assert_eq!(stats.idle_drones, 1);
        assert_eq!(stats.pending_deliveries, 2);
        assert_eq!(stats.completed_deliveries, 1);
        assert_eq!(stats.avg_battery_level, 80.0);
        assert_eq!(stats.avg_waiting_time, 15.0);
        assert_eq!(stats.total_distance, 4.0);
    }

    #[test]
    fn summary_flags_overweight_as_stuck() {
        let (drones, deliveries, _) = sample();
        let run = RunInfo {
            run_id: Some(Uuid::new_v4()),
            runtime_secs: 120.0,
            is_running: true,
            is_paused: false,
        };
        let summary = StatusSummary::build(&drones, &deliveries, 5.0, run);
        assert_eq!(summary.stuck_deliveries, 1);
        assert_eq!(summary.pending_deliveries, 2);
        assert!((summary.avg_delivery_time - 3.0).abs() < 1e-9);
        assert_eq!(summary.avg_battery_usage, 20.0);
        assert_eq!(summary.total_runtime, 2.0);
        assert!(summary.is_running);
    }

    #[test]
    fn charging_drones_count_as_active() {
        let (mut drones, deliveries, now) = sample();
        drones[1].status = DroneStatus::Charging;

        let stats = FleetStatistics::snapshot(&drones, &deliveries, now);
        assert_eq!(stats.active_drones, 2);
        assert_eq!(stats.charging_drones, 1);
        assert_eq!(stats.idle_drones, 0);

        let summary = StatusSummary::build(&drones, &deliveries, 5.0, RunInfo::default());
        assert_eq!(summary.active_drones, 2);
        assert_eq!(summary.charging_drones, 1);
    }

    #[test]
    fn empty_fleet_has_zero_averages() {
        let summary = StatusSummary::build(&[], &[], 5.0, RunInfo::default());
        assert_eq!(summary.avg_delivery_time, 0.0);
        assert_eq!(summary.avg_battery_usage, 0.0);
        assert!(summary.run_id.is_none());
    }
}
