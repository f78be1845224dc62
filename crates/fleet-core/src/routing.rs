//! Route planning on top of collision avoidance.
//!
//! Turns a start/end pair into a time-stamped, deconflicted route and a
//! costed flight plan, and keeps the last route per drone so it can be
//! corrected in flight or released once the drone is done with it.

use crate::collision::CollisionAvoidance;
use crate::cost::{build_segment, totals};
use crate::error::RoutingError;
use crate::models::{FlightPlan, Point, Route, RouteSegment, Waypoint};
use crate::rules::FleetRules;
use crate::spatial::{distance_m, initial_heading_deg, lerp_point, secs_to_duration};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

const ESTIMATE_DRONE_ID: &str = "estimate";

#[derive(Debug, Clone)]
struct CachedRoute {
    route: Route,
    start: Point,
    end: Point,
}

/// Plans routes for drones and tracks which ones are in use.
#[derive(Debug, Clone)]
pub struct RoutingService {
    rules: FleetRules,
    collision: CollisionAvoidance,
    route_cache: BTreeMap<String, CachedRoute>,
}

impl Default for RoutingService {
    fn default() -> Self {
        Self::new(FleetRules::default())
    }
}

impl RoutingService {
    pub fn new(rules: FleetRules) -> Self {
        let collision = CollisionAvoidance::new(rules.collision.clone());
        Self {
            rules,
            collision,
            route_cache: BTreeMap::new(),
        }
    }

    pub fn rules(&self) -> &FleetRules {
        &self.rules
    }

    pub fn collision(&self) -> &CollisionAvoidance {
        &self.collision
    }

    /// Plan, deconflict and register a route for `drone_id`.
    ///
    /// The drone keeps its altitude if it already holds one. A rejected
    /// registration releases an altitude acquired by this call.
    pub fn calculate_route(
        &mut self,
        start: Point,
        end: Point,
        drone_id: &str,
        start_time: DateTime<Utc>,
    ) -> Result<FlightPlan, RoutingError> {
        if drone_id.trim().is_empty() {
            return Err(RoutingError::MissingDroneId);
        }
        check_point("start", &start)?;
        check_point("end", &end)?;

        let had_altitude = self.collision.altitude_of(drone_id).is_some();
        let altitude = self.collision.get_next_altitude(drone_id);
        let route = self.plan_route(drone_id, start, end, altitude, start_time);

        let registered = match self.collision.register_route(drone_id, route) {
            Ok(route) => route,
            Err(source) => {
                if !had_altitude {
                    self.collision.release_altitude(drone_id);
                }
                return Err(RoutingError::Rejected {
                    drone_id: drone_id.to_string(),
                    source,
                });
            }
        };

        let plan = self.build_plan(&registered, start, end);
        self.route_cache.insert(
            drone_id.to_string(),
            CachedRoute {
                route: registered,
                start,
                end,
            },
        );
        Ok(plan)
    }

    /// Cost a route at the lowest ladder level without claiming airspace.
    pub fn estimate_route(
        &self,
        start: Point,
        end: Point,
        start_time: DateTime<Utc>,
    ) -> Result<FlightPlan, RoutingError> {
        check_point("start", &start)?;
        check_point("end", &end)?;

        let altitude = self
            .rules
            .collision
            .altitude_levels
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min);
        let route = self.plan_route(ESTIMATE_DRONE_ID, start, end, altitude, start_time);
        Ok(self.build_plan(&route, start, end))
    }

    /// Compare a drone's reported position with its cached route.
    ///
    /// Within `deviation_threshold_m` of the waypoint closest in time the
    /// cached plan is returned as is. Otherwise a new route from the
    /// current position to the cached destination replaces it.
    pub fn update_route(
        &mut self,
        drone_id: &str,
        current_position: Point,
        current_time: DateTime<Utc>,
    ) -> Result<FlightPlan, RoutingError> {
        let cached = self
            .route_cache
            .get(drone_id)
            .cloned()
            .ok_or_else(|| RoutingError::NoCachedRoute(drone_id.to_string()))?;
        check_point("current", &current_position)?;

        let expected = cached
            .route
            .waypoints
            .iter()
            .min_by_key(|wp| {
                (wp.timestamp - current_time)
                    .num_microseconds()
                    .unwrap_or(i64::MAX)
                    .unsigned_abs()
            })
            .map(Waypoint::point);

        let deviation = expected
            .map(|point| distance_m(&current_position, &point))
            .unwrap_or(f64::INFINITY);

        if deviation > self.rules.routing.deviation_threshold_m {
            return self.calculate_route(current_position, cached.end, drone_id, current_time);
        }

        Ok(self.build_plan(&cached.route, cached.start, cached.end))
    }

    /// Forget a drone's route and give its altitude back.
    ///
    /// Safe to call for drones without a cached route.
    pub fn complete_route(&mut self, drone_id: &str) {
        self.route_cache.remove(drone_id);
        self.collision.deregister_route(drone_id);
        self.collision.release_altitude(drone_id);
    }

    pub fn cached_route(&self, drone_id: &str) -> Option<&Route> {
        self.route_cache.get(drone_id).map(|cached| &cached.route)
    }

    /// Drop every cached route, active route and altitude.
    pub fn reset(&mut self) {
        self.route_cache.clear();
        self.collision.clear();
    }

    /// Straight line at `altitude_m`, sampled at most `waypoint_spacing_m`
    /// apart and timed at the maximum cruise velocity.
    fn plan_route(
        &self,
        drone_id: &str,
        start: Point,
        end: Point,
        altitude_m: f64,
        start_time: DateTime<Utc>,
    ) -> Route {
        let distance = distance_m(&start, &end);
        let velocity = self.rules.collision.max_velocity_mps;
        let count = ((distance / self.rules.routing.waypoint_spacing_m).ceil() as usize + 1).max(2);

        let waypoints: Vec<Waypoint> = (0..count)
            .map(|i| {
                let fraction = i as f64 / (count - 1) as f64;
                let point = lerp_point(&start, &end, fraction).at_altitude(altitude_m);
                let at = start_time + secs_to_duration(distance * fraction / velocity);
                Waypoint::new(point, at)
            })
            .collect();

        let end_time = waypoints.last().map_or(start_time, |wp| wp.timestamp);
        Route {
            drone_id: drone_id.to_string(),
            waypoints,
            start_time,
            end_time,
            velocity_mps: velocity,
            heading_deg: initial_heading_deg(&start, &end),
        }
    }

    fn build_plan(&self, route: &Route, start: Point, end: Point) -> FlightPlan {
        let model = &self.rules.cost;
        let altitude = route.altitude_m().unwrap_or(start.altitude_m);

        let mut segments: Vec<RouteSegment> = Vec::with_capacity(route.waypoints.len() + 1);
        if start.altitude_m != altitude {
            segments.push(build_segment(start, start.at_altitude(altitude), model));
        }
        segments.extend(
            route
                .waypoints
                .windows(2)
                .map(|pair| build_segment(pair[0].point(), pair[1].point(), model)),
        );
        if end.altitude_m != altitude {
            segments.push(build_segment(end.at_altitude(altitude), end, model));
        }

        let (total_distance_km, total_time_h, total_energy) = totals(&segments);

        FlightPlan {
            drone_id: route.drone_id.clone(),
            altitude_m: altitude,
            waypoints: route.waypoints.clone(),
            segments,
            start_time: route.start_time,
            end_time: route.end_time,
            velocity_mps: route.velocity_mps,
            heading_deg: route.heading_deg,
            total_distance_km,
            total_time_h,
            total_energy,
            total_time_s: route.duration_secs(),
        }
    }
}

fn check_point(field: &'static str, point: &Point) -> Result<(), RoutingError> {
    if point.is_valid() {
        Ok(())
    } else {
        Err(RoutingError::InvalidPoint {
            field,
            lat: point.lat,
            lon: point.lon,
            altitude_m: point.altitude_m,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::offset_by_bearing;

    fn two_km_east() -> (Point, Point) {
        let start = Point::new(28.6139, 77.209, 0.0);
        let (lat, lon) = offset_by_bearing(start.lat, start.lon, 2000.0, std::f64::consts::FRAC_PI_2);
        (start, Point::new(lat, lon, 0.0))
    }

    #[test]
    fn plan_has_dense_monotonic_waypoints() {
        let mut routing = RoutingService::default();
        let (start, end) = two_km_east();
        let plan = routing
            .calculate_route(start, end, "drone_0", Utc::now())
            .unwrap();

        assert_eq!(plan.altitude_m, 40.0);
        assert!(plan.waypoints.len() >= 21);
        for pair in plan.waypoints.windows(2) {
            assert!(pair[1].timestamp >= pair[0].timestamp);
            assert!(distance_m(&pair[0].point(), &pair[1].point()) <= 100.0 * 1.001);
        }
        assert!((plan.heading_deg - 90.0).abs() < 0.5);
        assert!((plan.total_time_s - 2000.0 / 30.0).abs() < 0.01);
        assert_eq!(plan.end_time, plan.waypoints.last().unwrap().timestamp);
    }

    #[test]
    fn plan_includes_climb_and_descent() {
        let mut routing = RoutingService::default();
        let (start, end) = two_km_east();
        let plan = routing
            .calculate_route(start, end, "drone_0", Utc::now())
            .unwrap();

        let first = plan.segments.first().unwrap();
        let last = plan.segments.last().unwrap();
        assert_eq!(first.distance_km, 0.0);
        assert_eq!(first.end.altitude_m, 40.0);
        assert_eq!(last.end.altitude_m, 0.0);

        let (distance, time, energy) = totals(&plan.segments);
        assert!((plan.total_distance_km - distance).abs() < 1e-12);
        assert!((plan.total_time_h - time).abs() < 1e-12);
        assert!((plan.total_energy - energy).abs() < 1e-12);
        assert!((plan.total_distance_km - 2.0).abs() < 0.01);
    }

    #[test]
    fn same_corridor_gets_separate_altitudes() {
        let mut routing = RoutingService::default();
        let (start, end) = two_km_east();
        let now = Utc::now();
        let a = routing.calculate_route(start, end, "drone_0", now).unwrap();
        let b = routing.calculate_route(start, end, "drone_1", now).unwrap();

        assert!(
            (a.altitude_m - b.altitude_m).abs() >= routing.rules().collision.vertical_safe_distance_m
        );
        assert_eq!(routing.collision().active_route_count(), 2);
    }

    #[test]
    fn invalid_input_is_rejected_without_side_effects() {
        let mut routing = RoutingService::default();
        let (start, end) = two_km_east();
        let now = Utc::now();

        assert_eq!(
            routing.calculate_route(start, end, "  ", now),
            Err(RoutingError::MissingDroneId)
        );
        let bad = Point::new(f64::NAN, 77.0, 0.0);
        assert!(matches!(
            routing.calculate_route(bad, end, "drone_0", now),
            Err(RoutingError::InvalidPoint { field: "start", .. })
        ));
        assert!(routing.collision().altitude_of("drone_0").is_none());
        assert!(routing.cached_route("drone_0").is_none());
    }

    #[test]
    fn complete_route_releases_everything() {
        let mut routing = RoutingService::default();
        let (start, end) = two_km_east();
        routing
            .calculate_route(start, end, "drone_0", Utc::now())
            .unwrap();

        routing.complete_route("drone_0");
        assert!(routing.cached_route("drone_0").is_none());
        assert!(routing.collision().altitude_of("drone_0").is_none());
        assert_eq!(routing.collision().active_route_count(), 0);

        routing.complete_route("never_routed");
    }

    #[test]
    fn update_route_requires_cache() {
        let mut routing = RoutingService::default();
        let (start, _) = two_km_east();
        assert_eq!(
            routing.update_route("drone_0", start, Utc::now()),
            Err(RoutingError::NoCachedRoute("drone_0".to_string()))
        );
    }

    #[test]
    fn on_track_update_keeps_route() {
        let mut routing = RoutingService::default();
        let (start, end) = two_km_east();
        let now = Utc::now();
        let plan = routing.calculate_route(start, end, "drone_0", now).unwrap();

        let on_track = plan.waypoints[5];
        let updated = routing
            .update_route("drone_0", on_track.point(), on_track.timestamp)
            .unwrap();
        assert_eq!(updated.waypoints, plan.waypoints);
    }

    #[test]
    fn deviation_triggers_replan_from_current_position() {
        let mut routing = RoutingService::default();
        let (start, end) = two_km_east();
        let now = Utc::now();
        let plan = routing.calculate_route(start, end, "drone_0", now).unwrap();

        let expected = plan.waypoints[5];
        let (lat, lon) = offset_by_bearing(expected.lat, expected.lon, 200.0, 0.0);
        let off_track = Point::new(lat, lon, expected.altitude_m);
        let updated = routing
            .update_route("drone_0", off_track, expected.timestamp)
            .unwrap();

        let first = updated.waypoints[0];
        assert!(distance_m(&first.point(), &off_track) < 1e-6);
        assert_eq!(updated.start_time, expected.timestamp);
        let last = updated.waypoints.last().unwrap().point();
        assert!(distance_m(&last, &end) < 1e-6);
        assert_eq!(
            routing.cached_route("drone_0").map(|r| r.start_time),
            Some(expected.timestamp)
        );
    }

    #[test]
    fn estimate_does_not_claim_airspace() {
        let routing = RoutingService::default();
        let (start, end) = two_km_east();
        let plan = routing.estimate_route(start, end, Utc::now()).unwrap();
        assert!(plan.total_time_h > 0.0);
        assert_eq!(routing.collision().active_route_count(), 0);
        assert!(routing.collision().assigned_altitudes().is_empty());
    }

    #[test]
    fn zero_length_route_is_valid() {
        let mut routing = RoutingService::default();
        let (start, _) = two_km_east();
        let plan = routing
            .calculate_route(start, start, "drone_0", Utc::now())
            .unwrap();
        assert_eq!(plan.waypoints.len(), 2);
        assert_eq!(plan.total_time_s, 0.0);
        assert!(plan.total_distance_km.abs() < 1e-9);
    }
}
