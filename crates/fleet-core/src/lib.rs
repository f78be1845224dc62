pub mod collision;
pub mod cost;
pub mod error;
pub mod models;
pub mod queue;
pub mod routing;
pub mod rules;
pub mod spatial;

pub use collision::{CollisionAvoidance, CollisionPoint};
pub use error::{CollisionError, ConfigError, RoutingError};
pub use models::{
    Delivery, DeliveryOrder, DeliveryStatus, Drone, DroneStatus, FlightPlan, Point, Route,
    RouteSegment, Waypoint,
};
pub use queue::DeliveryQueue;
pub use routing::RoutingService;
pub use rules::{
    CollisionRules, CostModel, DroneSpec, FleetRules, RoutingRules, ServiceArea, SimulationRules,
};
pub use spatial::haversine_distance;
