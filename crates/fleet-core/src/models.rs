//! Core data models for the fleet simulation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A geographic position. Latitude/longitude in degrees, altitude in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub altitude_m: f64,
}

impl Point {
    pub fn new(lat: f64, lon: f64, altitude_m: f64) -> Self {
        Self { lat, lon, altitude_m }
    }

    /// Same horizontal position at a different altitude.
    pub fn at_altitude(self, altitude_m: f64) -> Self {
        Self { altitude_m, ..self }
    }

    /// Coordinates are finite and inside the WGS84 ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && self.altitude_m.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

/// Time-stamped position along a route.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub lat: f64,
    pub lon: f64,
    pub altitude_m: f64,
    pub timestamp: DateTime<Utc>,
}

impl Waypoint {
    pub fn new(point: Point, timestamp: DateTime<Utc>) -> Self {
        Self {
            lat: point.lat,
            lon: point.lon,
            altitude_m: point.altitude_m,
            timestamp,
        }
    }

    pub fn point(&self) -> Point {
        Point::new(self.lat, self.lon, self.altitude_m)
    }
}

/// A drone's planned occupancy of airspace over time.
///
/// Waypoints are time-monotonic; `start_time` and `end_time` match the
/// first and last waypoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub drone_id: String,
    pub waypoints: Vec<Waypoint>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub velocity_mps: f64,
    pub heading_deg: f64,
}

impl Route {
    /// Cruise altitude (altitude of the first waypoint).
    pub fn altitude_m(&self) -> Option<f64> {
        self.waypoints.first().map(|wp| wp.altitude_m)
    }

    pub fn duration_secs(&self) -> f64 {
        (self.end_time - self.start_time).num_milliseconds() as f64 / 1000.0
    }

    /// Copy of the route flown entirely at `altitude_m`.
    pub fn with_altitude(&self, altitude_m: f64) -> Self {
        let waypoints = self
            .waypoints
            .iter()
            .map(|wp| Waypoint { altitude_m, ..*wp })
            .collect();
        Self {
            waypoints,
            ..self.clone()
        }
    }
}

/// One leg of a flight plan with its cost.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteSegment {
    pub start: Point,
    pub end: Point,
    /// Horizontal distance (km)
    pub distance_km: f64,
    /// Simulated travel time (hours)
    pub time_h: f64,
    /// Battery consumed (percent)
    pub energy: f64,
}

impl RouteSegment {
    pub fn time_secs(&self) -> f64 {
        self.time_h * 3600.0
    }
}

/// Externally visible result of route calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightPlan {
    pub drone_id: String,
    pub altitude_m: f64,
    pub waypoints: Vec<Waypoint>,
    pub segments: Vec<RouteSegment>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub velocity_mps: f64,
    pub heading_deg: f64,
    pub total_distance_km: f64,
    pub total_time_h: f64,
    pub total_energy: f64,
    /// Length of the route's time window (seconds)
    pub total_time_s: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DroneStatus {
    /// Waiting at its last position for an assignment
    #[default]
    Idle,
    /// Flying a delivery
    EnRoute,
    /// Returning to base or holding on the charger
    Charging,
}

/// Live state of a simulated drone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drone {
    pub id: String,
    pub current_location: Point,
    pub status: DroneStatus,
    /// Percent, 0-100
    pub battery_level: f64,
    pub current_delivery: Option<String>,
    pub completed_deliveries: u32,
    /// km
    pub total_distance: f64,
    /// Simulated seconds airborne
    pub total_flight_time: f64,
    /// Simulated seconds spent idle
    pub total_waiting_time: f64,
    pub last_status_change: DateTime<Utc>,
}

impl Drone {
    /// A fresh, fully charged, idle drone parked at `base`.
    pub fn new(id: impl Into<String>, base: Point, max_battery: f64, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            current_location: base,
            status: DroneStatus::Idle,
            battery_level: max_battery,
            current_delivery: None,
            completed_deliveries: 0,
            total_distance: 0.0,
            total_flight_time: 0.0,
            total_waiting_time: 0.0,
            last_status_change: now,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.status == DroneStatus::Idle
    }

    pub fn set_status(&mut self, status: DroneStatus, now: DateTime<Utc>) {
        self.status = status;
        self.last_status_change = now;
    }

    /// Move to the end of a flown segment and book its cost.
    pub fn apply_segment(&mut self, segment: &RouteSegment) {
        self.current_location = segment.end;
        self.battery_level = (self.battery_level - segment.energy).max(0.0);
        self.total_distance += segment.distance_km;
        self.total_flight_time += segment.time_secs();
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Waiting in the queue
    #[default]
    Pending,
    /// Matched with a drone, not yet flying
    Assigned,
    /// Drone flying to the pickup point
    InProgress,
    /// Parcel on board, flying to the dropoff point
    PickedUp,
    Completed,
}

/// A parcel to move from `pickup` to `dropoff`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub id: String,
    pub pickup: Point,
    pub dropoff: Point,
    pub status: DeliveryStatus,
    pub assigned_drone: Option<String>,
    /// 1 is the most urgent
    pub priority: u8,
    pub weight_kg: f64,
    pub creation_time: DateTime<Utc>,
    pub completion_time: Option<DateTime<Utc>>,
    /// Informational flight time estimate (seconds)
    pub estimated_time: Option<f64>,
}

impl Delivery {
    pub fn from_order(id: impl Into<String>, order: &DeliveryOrder, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            pickup: order.pickup,
            dropoff: order.dropoff,
            status: DeliveryStatus::Pending,
            assigned_drone: None,
            priority: order.priority,
            weight_kg: order.weight_kg,
            creation_time: now,
            completion_time: None,
            estimated_time: None,
        }
    }

    /// Undo an assignment so the delivery can be picked up again.
    pub fn reset_to_pending(&mut self) {
        self.status = DeliveryStatus::Pending;
        self.assigned_drone = None;
    }
}

/// Caller-supplied parcel request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryOrder {
    pub pickup: Point,
    pub dropoff: Point,
    #[serde(default = "default_priority")]
    pub priority: u8,
    pub weight_kg: f64,
}

fn default_priority() -> u8 {
    1
}

impl DeliveryOrder {
    pub fn new(pickup: Point, dropoff: Point, priority: u8, weight_kg: f64) -> Self {
        Self {
            pickup,
            dropoff,
            priority,
            weight_kg,
        }
    }

    /// Validate the order. Weight above the payload cap is allowed; such
    /// orders simply never get dispatched.
    pub fn validate(&self) -> Result<(), String> {
        if !self.pickup.is_valid() {
            return Err("pickup coordinates are invalid".to_string());
        }
        if !self.dropoff.is_valid() {
            return Err("dropoff coordinates are invalid".to_string());
        }
        if !(1..=3).contains(&self.priority) {
            return Err(format!("priority must be 1-3, got {}", self.priority));
        }
        if !(self.weight_kg.is_finite() && self.weight_kg > 0.0) {
            return Err(format!("weight must be positive, got {}", self.weight_kg));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_serialize_snake_case() {
        assert_eq!(serde_json::to_string(&DroneStatus::EnRoute).unwrap(), "\"en_route\"");
        assert_eq!(serde_json::to_string(&DeliveryStatus::PickedUp).unwrap(), "\"picked_up\"");
        assert_eq!(serde_json::to_string(&DeliveryStatus::InProgress).unwrap(), "\"in_progress\"");
        let status: DroneStatus = serde_json::from_str("\"charging\"").unwrap();
        assert_eq!(status, DroneStatus::Charging);
    }

    #[test]
    fn apply_segment_clamps_battery() {
        let mut drone = Drone::new("drone_0", Point::new(28.6, 77.2, 0.0), 100.0, Utc::now());
        drone.battery_level = 1.0;
        let segment = RouteSegment {
            start: drone.current_location,
            end: Point::new(28.61, 77.2, 40.0),
            distance_km: 1.1,
            time_h: 0.01,
            energy: 3.0,
        };
        drone.apply_segment(&segment);
        assert_eq!(drone.battery_level, 0.0);
        assert_eq!(drone.current_location, segment.end);
        assert!((drone.total_flight_time - 36.0).abs() < 1e-9);
    }

    #[test]
    fn order_validation() {
        let pickup = Point::new(28.6, 77.2, 0.0);
        let dropoff = Point::new(28.62, 77.22, 0.0);
        assert!(DeliveryOrder::new(pickup, dropoff, 1, 6.0).validate().is_ok());
        assert!(DeliveryOrder::new(pickup, dropoff, 0, 1.0).validate().is_err());
        assert!(DeliveryOrder::new(pickup, dropoff, 2, 0.0).validate().is_err());
        assert!(DeliveryOrder::new(Point::new(95.0, 0.0, 0.0), dropoff, 2, 1.0)
            .validate()
            .is_err());
    }

    #[test]
    fn with_altitude_rewrites_every_waypoint() {
        let now = Utc::now();
        let route = Route {
            drone_id: "d".into(),
            waypoints: vec![
                Waypoint::new(Point::new(28.6, 77.2, 40.0), now),
                Waypoint::new(Point::new(28.61, 77.2, 40.0), now + chrono::Duration::seconds(5)),
            ],
            start_time: now,
            end_time: now + chrono::Duration::seconds(5),
            velocity_mps: 30.0,
            heading_deg: 0.0,
        };
        let raised = route.with_altitude(80.0);
        assert!(raised.waypoints.iter().all(|wp| wp.altitude_m == 80.0));
        assert_eq!(raised.start_time, route.start_time);
        assert_eq!(raised.altitude_m(), Some(80.0));
    }
}
