//! Parsing of command line inputs.

use anyhow::{bail, Context, Result};
use fleet_core::{DeliveryOrder, Point};
use std::path::Path;

/// Parse `lat,lon` or `lat,lon,altitude_m`.
pub fn parse_point(raw: &str) -> Result<Point> {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    if !(2..=3).contains(&parts.len()) {
        bail!("expected lat,lon[,altitude], got '{raw}'");
    }
    let lat: f64 = parts[0].parse().with_context(|| format!("bad latitude in '{raw}'"))?;
    let lon: f64 = parts[1].parse().with_context(|| format!("bad longitude in '{raw}'"))?;
    let altitude_m: f64 = match parts.get(2) {
        Some(alt) => alt.parse().with_context(|| format!("bad altitude in '{raw}'"))?,
        None => 0.0,
    };

    let point = Point::new(lat, lon, altitude_m);
    if !point.is_valid() {
        bail!("coordinates out of range: '{raw}'");
    }
    Ok(point)
}

/// Read a JSON array of delivery orders.
pub fn load_orders(path: &Path) -> Result<Vec<DeliveryOrder>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let orders: Vec<DeliveryOrder> = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse orders in {}", path.display()))?;
    Ok(orders)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_and_three_components() {
        assert_eq!(parse_point("28.6, 77.2").unwrap(), Point::new(28.6, 77.2, 0.0));
        assert_eq!(parse_point("28.6,77.2,40").unwrap(), Point::new(28.6, 77.2, 40.0));
    }

    #[test]
    fn rejects_malformed_points() {
        assert!(parse_point("28.6").is_err());
        assert!(parse_point("north,77.2").is_err());
        assert!(parse_point("91,0").is_err());
    }

    #[test]
    fn orders_default_priority() {
        let dir = std::env::temp_dir().join(format!("fleet-cli-orders-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("orders.json");
        std::fs::write(
            &path,
            r#"[{"pickup": {"lat": 28.6, "lon": 77.2}, "dropoff": {"lat": 28.61, "lon": 77.21}, "weight_kg": 1.5}]"#,
        )
        .unwrap();

        let orders = load_orders(&path).unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].priority, 1);
        assert_eq!(orders[0].pickup.altitude_m, 0.0);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
