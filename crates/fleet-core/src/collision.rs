//! Collision avoidance for planned drone routes.
//!
//! Owns the altitude assignment table and the registry of active routes.
//! A new route is compared in 4-D (lat, lon, altitude, time) against every
//! other active route; if any sampled instant is unsafe the whole route is
//! moved to a different altitude and slowed down according to the worst
//! risk seen.

use crate::error::CollisionError;
use crate::models::{Point, Route, Waypoint};
use crate::rules::CollisionRules;
use crate::spatial::{distance_m, interpolate_waypoint, secs_to_duration};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const ALTITUDE_EPS_M: f64 = 1e-6;

/// A sampled instant where two routes come too close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollisionPoint {
    /// Position on the route being checked
    pub candidate: Waypoint,
    /// Position on the route it was checked against
    pub active: Waypoint,
    /// 0.0 (safe) to 1.0 (co-located)
    pub risk: f64,
    /// Both separations violated at once
    pub is_collision: bool,
}

/// Altitude assignment and route deconfliction service.
#[derive(Debug, Clone)]
pub struct CollisionAvoidance {
    rules: CollisionRules,
    active_routes: BTreeMap<String, Route>,
    assigned_altitudes: BTreeMap<String, f64>,
}

impl Default for CollisionAvoidance {
    fn default() -> Self {
        Self::new(CollisionRules::default())
    }
}

impl CollisionAvoidance {
    pub fn new(rules: CollisionRules) -> Self {
        Self {
            rules,
            active_routes: BTreeMap::new(),
            assigned_altitudes: BTreeMap::new(),
        }
    }

    pub fn rules(&self) -> &CollisionRules {
        &self.rules
    }

    /// Altitude for a drone, assigning one if it holds none.
    ///
    /// Scans the ladder bottom-up for a level no other drone holds. When
    /// the ladder is full the drone goes above it in `altitude_increment_m`
    /// steps, skipping overflow slots already taken.
    pub fn get_next_altitude(&mut self, drone_id: &str) -> f64 {
        if let Some(altitude) = self.assigned_altitudes.get(drone_id) {
            return *altitude;
        }

        let is_held = |altitude: f64| {
            self.assigned_altitudes
                .values()
                .any(|held| (held - altitude).abs() < ALTITUDE_EPS_M)
        };

        let altitude = match self
            .rules
            .altitude_levels
            .iter()
            .copied()
            .find(|level| !is_held(*level))
        {
            Some(level) => level,
            None => {
                let top = self
                    .rules
                    .altitude_levels
                    .iter()
                    .copied()
                    .fold(f64::MIN, f64::max);
                let mut step = 1.0;
                while is_held(top + step * self.rules.altitude_increment_m) {
                    step += 1.0;
                }
                top + step * self.rules.altitude_increment_m
            }
        };

        self.assigned_altitudes.insert(drone_id.to_string(), altitude);
        altitude
    }

    pub fn altitude_of(&self, drone_id: &str) -> Option<f64> {
        self.assigned_altitudes.get(drone_id).copied()
    }

    pub fn release_altitude(&mut self, drone_id: &str) {
        self.assigned_altitudes.remove(drone_id);
    }

    /// Collision test for two simultaneous positions.
    ///
    /// Returns `(is_collision, risk)`. Positions further apart in time than
    /// the configured window carry no risk.
    pub fn check_collision(&self, a: &Point, b: &Point, time_gap_s: f64) -> (bool, f64) {
        if time_gap_s > self.rules.time_window_s {
            return (false, 0.0);
        }

        let horizontal = distance_m(a, b);
        let vertical = (a.altitude_m - b.altitude_m).abs();

        let horizontal_risk = (1.0 - horizontal / self.rules.horizontal_safe_distance_m).max(0.0);
        let vertical_risk = (1.0 - vertical / self.rules.vertical_safe_distance_m).max(0.0);
        let risk = horizontal_risk.max(vertical_risk).clamp(0.0, 1.0);

        let is_collision = horizontal < self.rules.horizontal_safe_distance_m
            && vertical < self.rules.vertical_safe_distance_m;

        (is_collision, risk)
    }

    /// Sample every pair of time-overlapping segments of two routes.
    ///
    /// Each overlap is walked at `sample_step_s`; samples that collide or
    /// exceed `risk_threshold` are returned.
    pub fn find_collision_points(&self, route_a: &Route, route_b: &Route) -> Vec<CollisionPoint> {
        let mut points = Vec::new();
        let a = &route_a.waypoints;
        let b = &route_b.waypoints;
        if a.len() < 2 || b.len() < 2 {
            return points;
        }

        let step = secs_to_duration(self.rules.sample_step_s);
        // Both routes are time-monotonic, so segments of `b` that end before
        // the current segment of `a` starts can never overlap a later one.
        let mut first_b = 0usize;

        for pair_a in a.windows(2) {
            let (a0, a1) = (&pair_a[0], &pair_a[1]);
            while first_b + 1 < b.len() && b[first_b + 1].timestamp <= a0.timestamp {
                first_b += 1;
            }

            for pair_b in b[first_b..].windows(2) {
                let (b0, b1) = (&pair_b[0], &pair_b[1]);
                if b0.timestamp >= a1.timestamp {
                    break;
                }

                let start = a0.timestamp.max(b0.timestamp);
                let end = a1.timestamp.min(b1.timestamp);
                if start >= end {
                    continue;
                }

                let mut t = start;
                while t <= end {
                    let pos_a = interpolate_waypoint(a0, a1, t);
                    let pos_b = interpolate_waypoint(b0, b1, t);
                    let gap_s = (pos_a.timestamp - pos_b.timestamp)
                        .num_microseconds()
                        .unwrap_or(i64::MAX)
                        .unsigned_abs() as f64
                        / 1_000_000.0;

                    let (is_collision, risk) =
                        self.check_collision(&pos_a.point(), &pos_b.point(), gap_s);
                    if is_collision || risk > self.rules.risk_threshold {
                        points.push(CollisionPoint {
                            candidate: pos_a,
                            active: pos_b,
                            risk,
                            is_collision,
                        });
                    }

                    t += step;
                }
            }
        }

        points
    }

    /// Ladder level clear of `current` and every `used` altitude.
    ///
    /// Picks the safe level closest to `current`; with none available goes
    /// one safety margin above the highest used altitude (above `current`
    /// when nothing is used).
    pub fn suggest_alternative_altitude(&self, current: f64, used: &[f64]) -> f64 {
        let margin = self.rules.vertical_safe_distance_m;
        let best = self
            .rules
            .altitude_levels
            .iter()
            .copied()
            .filter(|level| (level - current).abs() > margin)
            .filter(|level| used.iter().all(|u| (level - u).abs() > margin))
            .min_by(|x, y| (x - current).abs().total_cmp(&(y - current).abs()));

        match best {
            Some(level) => level,
            None => used.iter().copied().reduce(f64::max).unwrap_or(current) + margin,
        }
    }

    /// Coarse three-tier throttle: the riskier, the slower.
    pub fn adjust_velocity(&self, risk: f64) -> f64 {
        if risk > 0.8 {
            self.rules.min_velocity_mps
        } else if risk > 0.5 {
            self.rules.max_velocity_mps * 0.5
        } else {
            self.rules.max_velocity_mps
        }
    }

    /// Check a route against all other active routes and store it.
    ///
    /// Conflicts move the whole route to one new altitude seeded with every
    /// conflicting altitude seen so far, and set the velocity from the worst
    /// risk. Active routes are visited once in drone-id order; a rewrite is
    /// not re-checked against routes visited earlier. The stored route is
    /// returned. On error nothing is stored.
    pub fn register_route(&mut self, drone_id: &str, route: Route) -> Result<Route, CollisionError> {
        validate_route(&route)?;

        let mut candidate = route;
        candidate.drone_id = drone_id.to_string();

        let mut used_altitudes: Vec<f64> = Vec::new();
        let mut max_risk = 0.0_f64;
        let mut rewritten = false;

        for (other_id, active) in &self.active_routes {
            if other_id == drone_id {
                continue;
            }
            let points = self.find_collision_points(&candidate, active);
            if points.is_empty() {
                continue;
            }

            used_altitudes.extend(points.iter().map(|p| p.active.altitude_m));
            max_risk = points.iter().map(|p| p.risk).fold(max_risk, f64::max);

            let current = candidate.altitude_m().unwrap_or_default();
            let new_altitude = self.suggest_alternative_altitude(current, &used_altitudes);
            let velocity = self.adjust_velocity(max_risk);

            candidate = candidate.with_altitude(new_altitude);
            candidate.velocity_mps = velocity;
            rewritten = true;
        }

        if rewritten {
            if let Some(altitude) = candidate.altitude_m() {
                self.assigned_altitudes.insert(drone_id.to_string(), altitude);
            }
        }
        self.active_routes
            .insert(drone_id.to_string(), candidate.clone());

        Ok(candidate)
    }

    /// Drop a drone's route and free its altitude. No-op if absent.
    pub fn deregister_route(&mut self, drone_id: &str) {
        if self.active_routes.remove(drone_id).is_some() {
            self.release_altitude(drone_id);
        }
    }

    pub fn active_route(&self, drone_id: &str) -> Option<&Route> {
        self.active_routes.get(drone_id)
    }

    pub fn active_route_count(&self) -> usize {
        self.active_routes.len()
    }

    pub fn assigned_altitudes(&self) -> &BTreeMap<String, f64> {
        &self.assigned_altitudes
    }

    /// Forget every route and altitude.
    pub fn clear(&mut self) {
        self.active_routes.clear();
        self.assigned_altitudes.clear();
    }
}

fn validate_route(route: &Route) -> Result<(), CollisionError> {
    if route.waypoints.len() < 2 {
        return Err(CollisionError::TooFewWaypoints(route.waypoints.len()));
    }
    for (index, wp) in route.waypoints.iter().enumerate() {
        if !(wp.lat.is_finite() && wp.lon.is_finite() && wp.altitude_m.is_finite()) {
            return Err(CollisionError::NonFinite { index });
        }
    }
    for (index, pair) in route.waypoints.windows(2).enumerate() {
        if pair[1].timestamp < pair[0].timestamp {
            return Err(CollisionError::NonMonotonic { index: index + 1 });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::offset_by_bearing;
    use chrono::{DateTime, Duration, Utc};

    fn straight_route(
        drone_id: &str,
        start: Point,
        end: Point,
        altitude_m: f64,
        t0: DateTime<Utc>,
        duration_s: i64,
        count: usize,
    ) -> Route {
        let waypoints: Vec<Waypoint> = (0..count)
            .map(|i| {
                let f = i as f64 / (count - 1) as f64;
                let point = crate::spatial::lerp_point(&start, &end, f).at_altitude(altitude_m);
                let at = t0 + Duration::milliseconds((duration_s as f64 * 1000.0 * f) as i64);
                Waypoint::new(point, at)
            })
            .collect();
        Route {
            drone_id: drone_id.to_string(),
            start_time: waypoints[0].timestamp,
            end_time: waypoints[count - 1].timestamp,
            waypoints,
            velocity_mps: 30.0,
            heading_deg: 90.0,
        }
    }

    fn corridor() -> (Point, Point) {
        let start = Point::new(28.6, 77.2, 0.0);
        let (lat, lon) = offset_by_bearing(28.6, 77.2, 300.0, std::f64::consts::FRAC_PI_2);
        (start, Point::new(lat, lon, 0.0))
    }

    #[test]
    fn altitude_assignment_is_sticky() {
        let mut ca = CollisionAvoidance::default();
        let first = ca.get_next_altitude("drone_0");
        assert_eq!(first, 40.0);
        assert_eq!(ca.get_next_altitude("drone_0"), first);
        assert_eq!(ca.get_next_altitude("drone_1"), 60.0);
    }

    #[test]
    fn released_altitude_is_reused() {
        let mut ca = CollisionAvoidance::default();
        ca.get_next_altitude("drone_0");
        ca.get_next_altitude("drone_1");
        ca.release_altitude("drone_0");
        assert_eq!(ca.get_next_altitude("drone_2"), 40.0);
    }

    #[test]
    fn overflow_keeps_incrementing() {
        let mut ca = CollisionAvoidance::default();
        for i in 0..6 {
            ca.get_next_altitude(&format!("drone_{i}"));
        }
        assert_eq!(ca.get_next_altitude("drone_6"), 160.0);
        assert_eq!(ca.get_next_altitude("drone_7"), 180.0);
        ca.release_altitude("drone_6");
        assert_eq!(ca.get_next_altitude("drone_8"), 160.0);
    }

    #[test]
    fn check_collision_respects_time_window() {
        let ca = CollisionAvoidance::default();
        let p = Point::new(28.6, 77.2, 40.0);
        assert_eq!(ca.check_collision(&p, &p, 11.0), (false, 0.0));
        assert_eq!(ca.check_collision(&p, &p, 0.0), (true, 1.0));
    }

    #[test]
    fn check_collision_needs_both_separations_violated() {
        let ca = CollisionAvoidance::default();
        let a = Point::new(28.6, 77.2, 40.0);
        let (lat, lon) = offset_by_bearing(28.6, 77.2, 500.0, 0.0);
        let far_same_level = Point::new(lat, lon, 40.0);
        let (hit, risk) = ca.check_collision(&a, &far_same_level, 0.0);
        assert!(!hit);
        assert_eq!(risk, 1.0);

        let stacked = a.at_altitude(43.0);
        let (hit, risk) = ca.check_collision(&a, &stacked, 0.0);
        assert!(hit);
        assert!((risk - 1.0).abs() < 1e-12);

        let (_, risk) = ca.check_collision(&a, &a.at_altitude(100.0), 0.0);
        assert!((0.0..=1.0).contains(&risk));
    }

    #[test]
    fn identical_overlapping_routes_report_risk() {
        let ca = CollisionAvoidance::default();
        let (start, end) = corridor();
        let t0 = Utc::now();
        let a = straight_route("a", start, end, 40.0, t0, 10, 4);
        let b = straight_route("b", start, end, 40.0, t0, 10, 4);

        let points = ca.find_collision_points(&a, &b);
        assert!(!points.is_empty());
        assert!(points.iter().any(|p| p.is_collision));
        assert!(points.iter().all(|p| p.risk > 0.3 || p.is_collision));
    }

    #[test]
    fn disjoint_time_windows_never_conflict() {
        let ca = CollisionAvoidance::default();
        let (start, end) = corridor();
        let t0 = Utc::now();
        let a = straight_route("a", start, end, 40.0, t0, 10, 4);
        let b = straight_route("b", start, end, 40.0, t0 + Duration::seconds(60), 10, 4);
        assert!(ca.find_collision_points(&a, &b).is_empty());
    }

    #[test]
    fn suggestion_prefers_closest_safe_level() {
        let ca = CollisionAvoidance::default();
        assert_eq!(ca.suggest_alternative_altitude(60.0, &[40.0]), 80.0);
        assert_eq!(ca.suggest_alternative_altitude(100.0, &[100.0, 120.0]), 80.0);

        let everything = [40.0, 60.0, 80.0, 100.0, 120.0, 140.0];
        assert_eq!(ca.suggest_alternative_altitude(40.0, &everything), 145.0);
    }

    #[test]
    fn fallback_ignores_current_above_used() {
        let ca = CollisionAvoidance::default();
        let everything = [40.0, 60.0, 80.0, 100.0, 120.0, 140.0];
        assert_eq!(ca.suggest_alternative_altitude(300.0, &everything), 145.0);

        let single = CollisionAvoidance::new(CollisionRules {
            altitude_levels: vec![60.0],
            ..CollisionRules::default()
        });
        assert_eq!(single.suggest_alternative_altitude(60.0, &[]), 65.0);
    }

    #[test]
    fn velocity_tiers() {
        let ca = CollisionAvoidance::default();
        assert_eq!(ca.adjust_velocity(0.9), 5.0);
        assert_eq!(ca.adjust_velocity(0.6), 15.0);
        assert_eq!(ca.adjust_velocity(0.5), 30.0);
        assert_eq!(ca.adjust_velocity(0.0), 30.0);
    }

    #[test]
    fn overlapping_corridors_end_up_vertically_separated() {
        let mut ca = CollisionAvoidance::default();
        let (start, end) = corridor();
        let t0 = Utc::now();

        let alt_a = ca.get_next_altitude("a");
        let first = ca
            .register_route("a", straight_route("a", start, end, alt_a, t0, 10, 4))
            .unwrap();
        assert_eq!(first.altitude_m(), Some(alt_a));

        // Force the second drone onto the same level to provoke a rewrite.
        let second = ca
            .register_route("b", straight_route("b", start, end, alt_a, t0, 10, 4))
            .unwrap();
        let alt_b = second.altitude_m().unwrap();

        assert!((alt_a - alt_b).abs() >= ca.rules().vertical_safe_distance_m);
        assert_eq!(second.velocity_mps, ca.rules().min_velocity_mps);
        assert_eq!(ca.altitude_of("b"), Some(alt_b));
        assert_eq!(ca.active_route_count(), 2);

        let residual = ca.find_collision_points(&second, &first);
        assert!(residual.iter().all(|p| !p.is_collision));
    }

    #[test]
    fn invalid_route_leaves_state_untouched() {
        let mut ca = CollisionAvoidance::default();
        let (start, end) = corridor();
        let t0 = Utc::now();
        let mut route = straight_route("a", start, end, 40.0, t0, 10, 3);
        route.waypoints.swap(0, 2);

        let result = ca.register_route("a", route);
        assert!(matches!(result, Err(CollisionError::NonMonotonic { .. })));
        assert_eq!(ca.active_route_count(), 0);

        let single = Route {
            waypoints: vec![Waypoint::new(start, t0)],
            ..straight_route("a", start, end, 40.0, t0, 10, 2)
        };
        assert_eq!(
            ca.register_route("a", single),
            Err(CollisionError::TooFewWaypoints(1))
        );
    }

    #[test]
    fn deregister_releases_altitude_and_is_idempotent() {
        let mut ca = CollisionAvoidance::default();
        let (start, end) = corridor();
        let alt = ca.get_next_altitude("a");
        ca.register_route("a", straight_route("a", start, end, alt, Utc::now(), 10, 3))
            .unwrap();

        ca.deregister_route("a");
        assert!(ca.active_route("a").is_none());
        assert!(ca.altitude_of("a").is_none());
        ca.deregister_route("a");
        assert_eq!(ca.active_route_count(), 0);
    }
}
