//! Random delivery generation inside the service area.

use chrono::{DateTime, Utc};
use fleet_core::{Delivery, DeliveryOrder, FleetRules, Point, RoutingService};
use rand::Rng;

/// Draw `count` random deliveries named `delivery_{start_index}..`.
///
/// Each delivery gets a priority in 1..=3 and a weight in 0.1..=5.0 kg.
/// Points outside the service area are re-drawn within the retry budget.
/// `estimated_time` is best effort and never claims airspace.
pub fn generate_deliveries<R: Rng + ?Sized>(
    count: usize,
    start_index: usize,
    rules: &FleetRules,
    routing: &RoutingService,
    rng: &mut R,
    now: DateTime<Utc>,
) -> Vec<Delivery> {
    (start_index..start_index + count)
        .map(|i| generate_one(format!("delivery_{i}"), rules, routing, rng, now))
        .collect()
}

fn generate_one<R: Rng + ?Sized>(
    id: String,
    rules: &FleetRules,
    routing: &RoutingService,
    rng: &mut R,
    now: DateTime<Utc>,
) -> Delivery {
    let area = &rules.service_area;
    let attempts = rules.simulation.estimate_retry_budget.max(1);
    let mut drawn: Option<(Point, Point)> = None;
    let mut estimated_time = None;

    for attempt in 1..=attempts {
        let pickup = area.random_point(rng);
        let dropoff = area.random_point(rng);
        drawn = Some((pickup, dropoff));

        if !area.contains(&pickup) || !area.contains(&dropoff) {
            tracing::debug!("Attempt {} for {} drew a point outside the service area", attempt, id);
            continue;
        }

        match routing.estimate_route(pickup, dropoff, now) {
            Ok(plan) => {
                estimated_time = Some(plan.total_time_s);
                break;
            }
            Err(e) => {
                tracing::warn!("Failed to estimate route for {} (attempt {}): {}", id, attempt, e);
            }
        }
    }

    let (pickup, dropoff) = drawn.unwrap_or_else(|| (area.random_point(rng), area.random_point(rng)));
    let order = DeliveryOrder::new(
        pickup,
        dropoff,
        rng.random_range(1..=3),
        rng.random_range(0.1..=5.0),
    );

    let mut delivery = Delivery::from_order(id, &order, now);
    delivery.estimated_time = estimated_time;
    tracing::debug!(
        "Generated {} with priority {} ({:.2} kg)",
        delivery.id,
        delivery.priority,
        delivery.weight_kg
    );
    delivery
}
