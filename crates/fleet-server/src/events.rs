//! Fleet events and best-effort fan-out to consumers.
//!
//! The simulation publishes without ever waiting on a consumer. A consumer
//! whose buffer is full misses that event; one that has gone away is
//! removed on the next publish.

use chrono::{DateTime, Utc};
use fleet_core::{Delivery, DeliveryStatus, Drone, DroneStatus, Point};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::stats::StatusSummary;

/// Event envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    pub payload: EventPayload,
}

impl FleetEvent {
    pub fn new(event_type: EventType, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event_type,
            payload,
        }
    }

    pub fn drone_position(drone: &Drone) -> Self {
        Self::new(
            EventType::DronePosition,
            EventPayload::DronePosition(DronePositionEvent {
                drone_id: drone.id.clone(),
                location: drone.current_location,
                battery_level: drone.battery_level,
                status: drone.status,
                current_delivery: drone.current_delivery.clone(),
            }),
        )
    }

    pub fn delivery_update(delivery: &Delivery) -> Self {
        Self::new(
            EventType::DeliveryUpdate,
            EventPayload::DeliveryUpdate(DeliveryUpdateEvent {
                delivery_id: delivery.id.clone(),
                status: delivery.status,
                assigned_drone: delivery.assigned_drone.clone(),
                completion_time: delivery.completion_time,
            }),
        )
    }

    pub fn fleet_status(stats: StatusSummary) -> Self {
        Self::new(
            EventType::FleetStatus,
            EventPayload::FleetStatus(FleetStatusEvent { stats }),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A drone finished a segment
    DronePosition,
    /// A delivery changed status
    DeliveryUpdate,
    /// Periodic fleet summary
    FleetStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    DronePosition(DronePositionEvent),
    DeliveryUpdate(DeliveryUpdateEvent),
    FleetStatus(FleetStatusEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DronePositionEvent {
    pub drone_id: String,
    pub location: Point,
    pub battery_level: f64,
    pub status: DroneStatus,
    pub current_delivery: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryUpdateEvent {
    pub delivery_id: String,
    pub status: DeliveryStatus,
    pub assigned_drone: Option<String>,
    pub completion_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetStatusEvent {
    pub stats: StatusSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SinkError {
    /// Consumer is alive but cannot take this event right now
    #[error("consumer buffer is full")]
    Full,
    /// Consumer is gone for good
    #[error("consumer disconnected")]
    Disconnected,
}

/// Destination for fleet events. `send` must not block.
pub trait EventSink: Send + Sync {
    fn send(&self, event: &FleetEvent) -> Result<(), SinkError>;
}

/// Sink backed by a bounded tokio channel.
pub struct ChannelSink {
    tx: mpsc::Sender<FleetEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<FleetEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn send(&self, event: &FleetEvent) -> Result<(), SinkError> {
        self.tx.try_send(event.clone()).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => SinkError::Full,
            mpsc::error::TrySendError::Closed(_) => SinkError::Disconnected,
        })
    }
}

/// Registry of event consumers.
#[derive(Default)]
pub struct EventHub {
    sinks: Mutex<Vec<(u64, Box<dyn EventSink>)>>,
    next_id: AtomicU64,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sink and return its handle.
    pub fn add_sink(&self, sink: Box<dyn EventSink>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut sinks) = self.sinks.lock() {
            sinks.push((id, sink));
        }
        id
    }

    /// New channel consumer buffering up to `capacity` events.
    pub fn subscribe(&self, capacity: usize) -> mpsc::Receiver<FleetEvent> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.add_sink(Box::new(ChannelSink::new(tx)));
        rx
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.lock().map(|sinks| sinks.len()).unwrap_or(0)
    }

    /// Offer an event to every consumer, dropping disconnected ones.
    pub fn publish(&self, event: FleetEvent) {
        let Ok(mut sinks) = self.sinks.lock() else {
            return;
        };
        sinks.retain(|(id, sink)| match sink.send(&event) {
            Ok(()) => true,
            Err(SinkError::Full) => {
                tracing::trace!("Event consumer {} lagging, skipped {:?}", id, event.event_type);
                true
            }
            Err(SinkError::Disconnected) => {
                tracing::debug!("Pruning disconnected event consumer {}", id);
                false
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    struct CountingSink {
        seen: Arc<AtomicUsize>,
        fail_with: Option<SinkError>,
    }

    impl EventSink for CountingSink {
        fn send(&self, _event: &FleetEvent) -> Result<(), SinkError> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            match self.fail_with {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    }

    fn sample_event() -> FleetEvent {
        let drone = Drone::new("drone_0", Point::new(28.6, 77.2, 0.0), 100.0, Utc::now());
        FleetEvent::drone_position(&drone)
    }

    #[test]
    fn subscribers_receive_published_events() {
        let hub = EventHub::new();
        let mut rx = hub.subscribe(8);
        hub.publish(sample_event());

        let event = rx.try_recv().unwrap();
        assert_eq!(event.event_type, EventType::DronePosition);
        match event.payload {
            EventPayload::DronePosition(pos) => assert_eq!(pos.drone_id, "drone_0"),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn dropped_receiver_is_pruned() {
        let hub = EventHub::new();
        let rx = hub.subscribe(4);
        let mut live = hub.subscribe(4);
        drop(rx);

        hub.publish(sample_event());
        assert_eq!(hub.sink_count(), 1);
        assert!(live.try_recv().is_ok());
    }

    #[test]
    fn full_consumer_is_kept_and_others_still_served() {
        let hub = EventHub::new();
        let mut slow = hub.subscribe(1);
        let seen = Arc::new(AtomicUsize::new(0));
        hub.add_sink(Box::new(CountingSink {
            seen: seen.clone(),
            fail_with: None,
        }));

        hub.publish(sample_event());
        hub.publish(sample_event());

        assert_eq!(hub.sink_count(), 2);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert!(slow.try_recv().is_ok());
        assert!(slow.try_recv().is_err());
    }

    #[test]
    fn failing_sink_does_not_affect_others() {
        let hub = EventHub::new();
        let broken = Arc::new(AtomicUsize::new(0));
        let healthy = Arc::new(AtomicUsize::new(0));
        hub.add_sink(Box::new(CountingSink {
            seen: broken.clone(),
            fail_with: Some(SinkError::Disconnected),
        }));
        hub.add_sink(Box::new(CountingSink {
            seen: healthy.clone(),
            fail_with: None,
        }));

        hub.publish(sample_event());
        hub.publish(sample_event());

        assert_eq!(broken.load(Ordering::SeqCst), 1);
        assert_eq!(healthy.load(Ordering::SeqCst), 2);
        assert_eq!(hub.sink_count(), 1);
    }

    #[test]
    fn events_serialize_with_type_tags() {
        let json = serde_json::to_value(sample_event()).unwrap();
        assert_eq!(json["event_type"], "drone_position");
        assert_eq!(json["payload"]["type"], "drone_position");
        assert_eq!(json["payload"]["data"]["drone_id"], "drone_0");
    }
}
