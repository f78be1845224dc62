//! Fleet configuration from environment.

use fleet_core::{ConfigError, FleetRules, Point};
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    pub drone_count: usize,
    pub delivery_count: usize,
    /// Emit JSON log lines instead of the human-readable format
    pub log_json: bool,
    pub rules: FleetRules,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            drone_count: 5,
            delivery_count: 20,
            log_json: false,
            rules: FleetRules::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup. Missing or unparsable values
    /// fall back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let mut rules = defaults.rules;
        let parsed = |key: &str| lookup(key).and_then(|s| s.trim().parse::<f64>().ok());

        let area = &mut rules.service_area;
        area.min_lat = parsed("FLEET_MIN_LAT").unwrap_or(area.min_lat);
        area.max_lat = parsed("FLEET_MAX_LAT").unwrap_or(area.max_lat);
        area.min_lon = parsed("FLEET_MIN_LON").unwrap_or(area.min_lon);
        area.max_lon = parsed("FLEET_MAX_LON").unwrap_or(area.max_lon);

        rules.drone.max_payload_kg = parsed("FLEET_MAX_PAYLOAD_KG").unwrap_or(rules.drone.max_payload_kg);
        rules.cost.cruise_speed_kmh = parsed("FLEET_DRONE_SPEED_KMH").unwrap_or(rules.cost.cruise_speed_kmh);
        rules.cost.energy_per_km = parsed("FLEET_ENERGY_PER_KM").unwrap_or(rules.cost.energy_per_km);

        let collision = &mut rules.collision;
        if let Some(levels) = lookup("FLEET_ALTITUDE_LEVELS").and_then(|s| parse_list::<f64>(&s)) {
            collision.altitude_levels = levels;
        }
        collision.altitude_increment_m =
            parsed("FLEET_ALTITUDE_INCREMENT_M").unwrap_or(collision.altitude_increment_m);
        collision.horizontal_safe_distance_m =
            parsed("FLEET_HORIZONTAL_SAFE_M").unwrap_or(collision.horizontal_safe_distance_m);
        collision.vertical_safe_distance_m =
            parsed("FLEET_VERTICAL_SAFE_M").unwrap_or(collision.vertical_safe_distance_m);
        collision.time_window_s = parsed("FLEET_TIME_WINDOW_S").unwrap_or(collision.time_window_s);

        rules.simulation.time_scale = parsed("FLEET_TIME_SCALE").unwrap_or(rules.simulation.time_scale);

        if let (Some(lat), Some(lon)) = (parsed("FLEET_BASE_LAT"), parsed("FLEET_BASE_LON")) {
            rules.bases = vec![Point::new(lat, lon, 0.0)];
        }

        Self {
            drone_count: lookup("FLEET_DRONES")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.drone_count),
            delivery_count: lookup("FLEET_DELIVERIES")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.delivery_count),
            log_json: lookup("FLEET_LOG_JSON")
                .map(|s| matches!(s.trim(), "1" | "true" | "yes"))
                .unwrap_or(defaults.log_json),
            rules,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rules.validate()
    }
}

fn parse_list<T: FromStr>(raw: &str) -> Option<Vec<T>> {
    let values: Option<Vec<T>> = raw
        .split(',')
        .filter(|part| !part.trim().is_empty())
        .map(|part| part.trim().parse().ok())
        .collect();
    values.filter(|v| !v.is_empty())
}
