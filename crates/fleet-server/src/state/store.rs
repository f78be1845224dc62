//! In-memory fleet store using DashMap.

use dashmap::DashMap;
use fleet_core::{Delivery, DeliveryQueue, Drone};
use std::sync::Mutex;

use crate::stats::FleetStatistics;

/// Drones, deliveries, the pending queue and the statistics history.
///
/// Map guards are never held across an `.await`; callers get clones or
/// mutate inside a closure.
#[derive(Default)]
pub struct FleetStore {
    drones: DashMap<String, Drone>,
    deliveries: DashMap<String, Delivery>,
    queue: Mutex<DeliveryQueue>,
    history: Mutex<Vec<FleetStatistics>>,
}

impl FleetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_drone(&self, drone: Drone) {
        self.drones.insert(drone.id.clone(), drone);
    }

    pub fn get_drone(&self, drone_id: &str) -> Option<Drone> {
        self.drones.get(drone_id).map(|r| r.value().clone())
    }

    /// Mutate a drone in place and return the updated copy.
    pub fn update_drone<F>(&self, drone_id: &str, f: F) -> Option<Drone>
    where
        F: FnOnce(&mut Drone),
    {
        let mut entry = self.drones.get_mut(drone_id)?;
        f(entry.value_mut());
        Some(entry.value().clone())
    }

    /// All drones in id order.
    pub fn all_drones(&self) -> Vec<Drone> {
        let mut drones: Vec<Drone> = self.drones.iter().map(|r| r.value().clone()).collect();
        drones.sort_by(|a, b| natural_key(&a.id).cmp(&natural_key(&b.id)));
        drones
    }

    pub fn drone_count(&self) -> usize {
        self.drones.len()
    }

    pub fn insert_delivery(&self, delivery: Delivery) {
        self.deliveries.insert(delivery.id.clone(), delivery);
    }

    pub fn get_delivery(&self, delivery_id: &str) -> Option<Delivery> {
        self.deliveries.get(delivery_id).map(|r| r.value().clone())
    }

    pub fn update_delivery<F>(&self, delivery_id: &str, f: F) -> Option<Delivery>
    where
        F: FnOnce(&mut Delivery),
    {
        let mut entry = self.deliveries.get_mut(delivery_id)?;
        f(entry.value_mut());
        Some(entry.value().clone())
    }

    /// All deliveries in id order.
    pub fn all_deliveries(&self) -> Vec<Delivery> {
        let mut deliveries: Vec<Delivery> =
            self.deliveries.iter().map(|r| r.value().clone()).collect();
        deliveries.sort_by(|a, b| natural_key(&a.id).cmp(&natural_key(&b.id)));
        deliveries
    }

    pub fn delivery_count(&self) -> usize {
        self.deliveries.len()
    }

    /// Put a delivery into the pending queue.
    pub fn enqueue(&self, delivery: &Delivery) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push(delivery.id.clone(), delivery.priority, delivery.weight_kg);
        }
    }

    /// Take a delivery out of the pending queue. Returns whether it was queued.
    pub fn dequeue(&self, delivery_id: &str) -> bool {
        self.queue
            .lock()
            .map(|mut queue| queue.remove(delivery_id))
            .unwrap_or(false)
    }

    /// Queued delivery ids, most urgent first.
    pub fn queued_ids(&self) -> Vec<String> {
        self.queue
            .lock()
            .map(|queue| queue.ordered_ids())
            .unwrap_or_default()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().map(|queue| queue.len()).unwrap_or(0)
    }

    pub fn push_statistics(&self, stats: FleetStatistics) {
        if let Ok(mut history) = self.history.lock() {
            history.push(stats);
        }
    }

    pub fn statistics_history(&self) -> Vec<FleetStatistics> {
        self.history
            .lock()
            .map(|history| history.clone())
            .unwrap_or_default()
    }

    pub fn last_statistics(&self) -> Option<FleetStatistics> {
        self.history
            .lock()
            .ok()
            .and_then(|history| history.last().cloned())
    }

    pub fn clear_deliveries(&self) {
        self.deliveries.clear();
        if let Ok(mut queue) = self.queue.lock() {
            queue.clear();
        }
    }

    pub fn clear_drones(&self) {
        self.drones.clear();
    }

    pub fn clear_history(&self) {
        if let Ok(mut history) = self.history.lock() {
            history.clear();
        }
    }
}

/// Sort key that orders `drone_2` before `drone_10`.
fn natural_key(id: &str) -> (usize, &str) {
    (id.len(), id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fleet_core::{DeliveryOrder, DroneStatus, Point};

    #[test]
    fn drones_list_in_natural_order() {
        let store = FleetStore::new();
        let base = Point::new(28.6, 77.2, 0.0);
        for i in [10, 2, 1] {
            store.insert_drone(Drone::new(format!("drone_{i}"), base, 100.0, Utc::now()));
        }
        let ids: Vec<String> = store.all_drones().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["drone_1", "drone_2", "drone_10"]);
    }

    #[test]
    fn update_returns_fresh_copy() {
        let store = FleetStore::new();
        store.insert_drone(Drone::new("drone_0", Point::new(28.6, 77.2, 0.0), 100.0, Utc::now()));
        let updated = store
            .update_drone("drone_0", |d| d.status = DroneStatus::Charging)
            .unwrap();
        assert_eq!(updated.status, DroneStatus::Charging);
        assert!(store.update_drone("missing", |_| {}).is_none());
    }

    #[test]
    fn queue_tracks_pending_deliveries() {
        let store = FleetStore::new();
        let p = Point::new(28.6, 77.2, 0.0);
        let urgent = Delivery::from_order("delivery_1", &DeliveryOrder::new(p, p, 1, 2.0), Utc::now());
        let later = Delivery::from_order("delivery_0", &DeliveryOrder::new(p, p, 3, 1.0), Utc::now());
        store.enqueue(&later);
        store.enqueue(&urgent);

        assert_eq!(store.queued_ids(), vec!["delivery_1", "delivery_0"]);
        assert!(store.dequeue("delivery_1"));
        assert_eq!(store.queue_len(), 1);

        store.clear_deliveries();
        assert_eq!(store.queue_len(), 0);
    }
}
