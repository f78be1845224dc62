//! Time and energy cost of flying a segment.
//!
//! Horizontal flight gets slightly faster and more expensive with altitude,
//! both effects capped. Vertical movement is priced separately: climbing
//! costs more than the horizontal rate, descending much less.

use crate::models::{Point, RouteSegment};
use crate::rules::CostModel;
use crate::spatial::distance_km;

/// Cost of the vertical part of a segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerticalMetrics {
    pub distance_km: f64,
    pub time_h: f64,
    pub energy: f64,
}

fn altitude_factor(start_alt_m: f64, end_alt_m: f64, cap: f64, model: &CostModel) -> f64 {
    let avg_altitude = ((start_alt_m + end_alt_m) / 2.0).max(0.0);
    1.0 + (avg_altitude / model.altitude_scale_m).min(cap)
}

/// Horizontal travel time in hours.
pub fn segment_time_h(distance_km: f64, start_alt_m: f64, end_alt_m: f64, model: &CostModel) -> f64 {
    let speed = model.cruise_speed_kmh
        * altitude_factor(start_alt_m, end_alt_m, model.max_altitude_speed_bonus, model);
    distance_km / speed
}

/// Horizontal energy in battery percent.
pub fn segment_energy(distance_km: f64, start_alt_m: f64, end_alt_m: f64, model: &CostModel) -> f64 {
    let per_km = model.energy_per_km
        * altitude_factor(start_alt_m, end_alt_m, model.max_altitude_energy_penalty, model);
    distance_km * per_km
}

/// Climb or descent cost between two altitudes.
pub fn vertical_metrics(start_alt_m: f64, end_alt_m: f64, model: &CostModel) -> VerticalMetrics {
    let vertical_m = (end_alt_m - start_alt_m).abs();
    let is_ascent = end_alt_m > start_alt_m;
    let (rate_mps, factor) = if is_ascent {
        (model.ascent_rate_mps, model.ascent_energy_factor)
    } else {
        (model.descent_rate_mps, model.descent_energy_factor)
    };
    let distance_km = vertical_m / 1000.0;

    VerticalMetrics {
        distance_km,
        time_h: vertical_m / (rate_mps * 3600.0),
        energy: distance_km * model.energy_per_km * factor,
    }
}

/// Price a segment from `start` to `end`.
///
/// `distance_km` is the horizontal distance only; time and energy include
/// both the horizontal and the vertical part.
pub fn build_segment(start: Point, end: Point, model: &CostModel) -> RouteSegment {
    let horizontal_km = distance_km(&start, &end);
    let vertical = vertical_metrics(start.altitude_m, end.altitude_m, model);

    RouteSegment {
        start,
        end,
        distance_km: horizontal_km,
        time_h: segment_time_h(horizontal_km, start.altitude_m, end.altitude_m, model)
            + vertical.time_h,
        energy: segment_energy(horizontal_km, start.altitude_m, end.altitude_m, model)
            + vertical.energy,
    }
}

/// Summed (distance, time, energy) over a sequence of segments.
pub fn totals(segments: &[RouteSegment]) -> (f64, f64, f64) {
    segments.iter().fold((0.0, 0.0, 0.0), |acc, seg| {
        (acc.0 + seg.distance_km, acc.1 + seg.time_h, acc.2 + seg.energy)
    })
}
