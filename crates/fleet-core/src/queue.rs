//! Priority queue of pending deliveries, ordered by (priority, weight).

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

#[derive(Debug, Clone, Copy)]
struct FloatOrd(f64);

impl PartialEq for FloatOrd {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for FloatOrd {}

impl PartialOrd for FloatOrd {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FloatOrd {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Queue position of one pending delivery.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct QueueEntry {
    priority: u8,
    weight: FloatOrd,
    delivery_id: String,
}

/// Min-heap of pending delivery ids: lowest priority number first, then
/// lightest parcel, then id.
#[derive(Debug, Clone, Default)]
pub struct DeliveryQueue {
    heap: BinaryHeap<Reverse<QueueEntry>>,
}

impl DeliveryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a delivery. Pushing an id that is already queued is a no-op.
    pub fn push(&mut self, delivery_id: impl Into<String>, priority: u8, weight_kg: f64) {
        let delivery_id = delivery_id.into();
        if self.contains(&delivery_id) {
            return;
        }
        self.heap.push(Reverse(QueueEntry {
            priority,
            weight: FloatOrd(weight_kg),
            delivery_id,
        }));
    }

    /// Remove a delivery wherever it sits. Returns whether it was queued.
    pub fn remove(&mut self, delivery_id: &str) -> bool {
        let before = self.heap.len();
        self.heap.retain(|Reverse(entry)| entry.delivery_id != delivery_id);
        self.heap.len() != before
    }

    pub fn contains(&self, delivery_id: &str) -> bool {
        self.heap
            .iter()
            .any(|Reverse(entry)| entry.delivery_id == delivery_id)
    }

    /// Queued ids in dispatch order.
    pub fn ordered_ids(&self) -> Vec<String> {
        let mut entries: Vec<&QueueEntry> = self.heap.iter().map(|Reverse(entry)| entry).collect();
        entries.sort();
        entries
            .into_iter()
            .map(|entry| entry.delivery_id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}
