//! Tunable rules for the fleet simulation.
//!
//! Every value here can be adjusted before a fleet is started. Defaults
//! reproduce the reference service area around Delhi NCR.

use crate::error::ConfigError;
use crate::models::Point;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Geographic bounding box drones operate in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ServiceArea {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl Default for ServiceArea {
    fn default() -> Self {
        Self {
            min_lat: 28.4,
            max_lat: 28.8,
            min_lon: 76.8,
            max_lon: 77.4,
        }
    }
}

impl ServiceArea {
    /// Check whether a point lies inside the box (edges inclusive).
    pub fn contains(&self, point: &Point) -> bool {
        (self.min_lat..=self.max_lat).contains(&point.lat)
            && (self.min_lon..=self.max_lon).contains(&point.lon)
    }

    /// Draw a uniformly distributed ground-level point inside the box.
    pub fn random_point<R: Rng + ?Sized>(&self, rng: &mut R) -> Point {
        Point::new(
            rng.random_range(self.min_lat..=self.max_lat),
            rng.random_range(self.min_lon..=self.max_lon),
            0.0,
        )
    }
}

/// Physical limits of a delivery drone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DroneSpec {
    /// Heaviest parcel a drone may accept (kg)
    pub max_payload_kg: f64,
    /// Full battery level (percent)
    pub max_battery: f64,
    /// A drone must hold more than this to accept a delivery
    pub dispatch_battery_floor: f64,
    /// Below this after a delivery the drone returns to base to recharge
    pub recharge_battery_floor: f64,
}

impl Default for DroneSpec {
    fn default() -> Self {
        Self {
            max_payload_kg: 5.0,
            max_battery: 100.0,
            dispatch_battery_floor: 30.0,
            recharge_battery_floor: 20.0,
        }
    }
}

/// Separation thresholds and the altitude ladder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollisionRules {
    /// Discrete cruise altitudes handed out in ascending order
    pub altitude_levels: Vec<f64>,
    /// Step above the ladder once every level is taken
    pub altitude_increment_m: f64,
    pub horizontal_safe_distance_m: f64,
    pub vertical_safe_distance_m: f64,
    /// Positions further apart in time than this never collide
    pub time_window_s: f64,
    /// Sampled points above this risk are reported even without a hard violation
    pub risk_threshold: f64,
    pub sample_step_s: f64,
    pub max_velocity_mps: f64,
    pub min_velocity_mps: f64,
}

impl Default for CollisionRules {
    fn default() -> Self {
        Self {
            altitude_levels: vec![40.0, 60.0, 80.0, 100.0, 120.0, 140.0],
            altitude_increment_m: 20.0,
            horizontal_safe_distance_m: 10.0,
            vertical_safe_distance_m: 5.0,
            time_window_s: 10.0,
            risk_threshold: 0.3,
            sample_step_s: 1.0,
            max_velocity_mps: 30.0,
            min_velocity_mps: 5.0,
        }
    }
}

/// Time and energy cost model for route segments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostModel {
    /// Average cruise speed at ground level (km/h)
    pub cruise_speed_kmh: f64,
    /// Battery percent consumed per horizontal km at ground level
    pub energy_per_km: f64,
    pub ascent_rate_mps: f64,
    pub descent_rate_mps: f64,
    /// Multiplier on `energy_per_km` applied to climbed distance
    pub ascent_energy_factor: f64,
    /// Multiplier on `energy_per_km` applied to descended distance
    pub descent_energy_factor: f64,
    pub max_altitude_speed_bonus: f64,
    pub max_altitude_energy_penalty: f64,
    /// Altitude at which the bonus/penalty would reach 100% before capping
    pub altitude_scale_m: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            cruise_speed_kmh: 80.0,
            energy_per_km: 0.5,
            ascent_rate_mps: 5.0,
            descent_rate_mps: 4.0,
            ascent_energy_factor: 2.0,
            descent_energy_factor: 0.3,
            max_altitude_speed_bonus: 0.2,
            max_altitude_energy_penalty: 0.3,
            altitude_scale_m: 2000.0,
        }
    }
}

/// Waypoint density and course-correction threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingRules {
    /// Maximum horizontal gap between consecutive waypoints
    pub waypoint_spacing_m: f64,
    /// Distance from the expected waypoint that triggers a replan
    pub deviation_threshold_m: f64,
}

impl Default for RoutingRules {
    fn default() -> Self {
        Self {
            waypoint_spacing_m: 100.0,
            deviation_threshold_m: 50.0,
        }
    }
}

/// Pacing of the simulated world.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationRules {
    /// Simulated seconds per real second
    pub time_scale: f64,
    pub pickup_dwell_s: f64,
    pub charge_duration_s: f64,
    pub tick_interval_ms: u64,
    pub stats_interval_s: f64,
    pub deliveries_per_drone_on_reset: usize,
    pub estimate_retry_budget: usize,
}

impl Default for SimulationRules {
    fn default() -> Self {
        Self {
            time_scale: 1.0,
            pickup_dwell_s: 2.0,
            charge_duration_s: 30.0,
            tick_interval_ms: 100,
            stats_interval_s: 1.0,
            deliveries_per_drone_on_reset: 10,
            estimate_retry_budget: 3,
        }
    }
}

/// Everything the fleet core consumes, grouped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetRules {
    pub service_area: ServiceArea,
    pub drone: DroneSpec,
    pub collision: CollisionRules,
    pub cost: CostModel,
    pub routing: RoutingRules,
    pub simulation: SimulationRules,
    /// Drone bases; drones start round-robin across them
    pub bases: Vec<Point>,
}

impl Default for FleetRules {
    fn default() -> Self {
        Self {
            service_area: ServiceArea::default(),
            drone: DroneSpec::default(),
            collision: CollisionRules::default(),
            cost: CostModel::default(),
            routing: RoutingRules::default(),
            simulation: SimulationRules::default(),
            bases: vec![Point::new(28.6139, 77.209, 0.0)],
        }
    }
}

impl FleetRules {
    /// Reject configurations the simulation cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_time_scale(self.simulation.time_scale)?;

        if self.collision.altitude_levels.is_empty() {
            return Err(ConfigError::EmptyAltitudeLadder);
        }
        if self.bases.is_empty() {
            return Err(ConfigError::NoBases);
        }
        let area = &self.service_area;
        if !(area.min_lat < area.max_lat && area.min_lon < area.max_lon) {
            return Err(ConfigError::InvalidServiceArea);
        }

        let positive = [
            ("max_payload_kg", self.drone.max_payload_kg),
            ("altitude_increment_m", self.collision.altitude_increment_m),
            ("horizontal_safe_distance_m", self.collision.horizontal_safe_distance_m),
            ("vertical_safe_distance_m", self.collision.vertical_safe_distance_m),
            ("sample_step_s", self.collision.sample_step_s),
            ("time_window_s", self.collision.time_window_s),
            ("max_velocity_mps", self.collision.max_velocity_mps),
            ("min_velocity_mps", self.collision.min_velocity_mps),
            ("cruise_speed_kmh", self.cost.cruise_speed_kmh),
            ("ascent_rate_mps", self.cost.ascent_rate_mps),
            ("descent_rate_mps", self.cost.descent_rate_mps),
            ("altitude_scale_m", self.cost.altitude_scale_m),
            ("waypoint_spacing_m", self.routing.waypoint_spacing_m),
            ("stats_interval_s", self.simulation.stats_interval_s),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::NonPositive { name, value });
            }
        }
        if !(0.0..=1.0).contains(&self.collision.risk_threshold) {
            return Err(ConfigError::OutOfRange {
                name: "risk_threshold",
                value: self.collision.risk_threshold,
            });
        }
        let non_negative = [
            ("pickup_dwell_s", self.simulation.pickup_dwell_s),
            ("charge_duration_s", self.simulation.charge_duration_s),
        ];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::OutOfRange { name, value });
            }
        }
        if self.cost.energy_per_km < 0.0 || !self.cost.energy_per_km.is_finite() {
            return Err(ConfigError::NonPositive {
                name: "energy_per_km",
                value: self.cost.energy_per_km,
            });
        }

        Ok(())
    }

    /// Base location closest to `point`.
    pub fn nearest_base(&self, point: &Point) -> Option<Point> {
        self.bases
            .iter()
            .min_by(|a, b| {
                crate::spatial::distance_m(point, a).total_cmp(&crate::spatial::distance_m(point, b))
            })
            .copied()
    }
}

pub fn validate_time_scale(scale: f64) -> Result<(), ConfigError> {
    if scale.is_finite() && scale > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositiveTimeScale(scale))
    }
}
