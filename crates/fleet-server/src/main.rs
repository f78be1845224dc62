//! Fleet Server - headless delivery fleet simulation

use anyhow::Result;
use fleet_server::events::EventPayload;
use fleet_server::{logging, Config, FleetManager};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();
    logging::init_tracing(config.log_json, "fleet_server=debug")?;

    tracing::info!("Starting Fleet Server...");
    config.validate()?;

    let fleet = FleetManager::new(config.rules.clone())?;

    let mut events = fleet.subscribe(1024);
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match &event.payload {
                EventPayload::DronePosition(pos) => tracing::trace!(
                    "{} at ({:.5}, {:.5}, {:.0} m) battery {:.1}%",
                    pos.drone_id,
                    pos.location.lat,
                    pos.location.lon,
                    pos.location.altitude_m,
                    pos.battery_level
                ),
                EventPayload::DeliveryUpdate(update) => tracing::debug!(
                    "{} is now {:?}",
                    update.delivery_id,
                    update.status
                ),
                EventPayload::FleetStatus(status) => tracing::debug!(
                    "Fleet: {}/{} completed, {} pending, {} active",
                    status.stats.completed_deliveries,
                    status.stats.total_deliveries,
                    status.stats.pending_deliveries,
                    status.stats.active_drones
                ),
            }
        }
    });

    let run_id = fleet
        .start(config.drone_count, config.delivery_count)
        .await?;
    tracing::info!("Run {} in progress (time scale {})", run_id, fleet.time_scale());

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, stopping fleet");
            fleet.reset().await?;
        }
        _ = fleet.wait_until_stopped() => {
            let status = fleet.status();
            tracing::info!(
                "Run {} finished: {} of {} deliveries completed, {:.2} km flown, {} stuck",
                run_id,
                status.stats.completed_deliveries,
                status.stats.total_deliveries,
                status.stats.total_distance,
                status.stats.stuck_deliveries
            );
        }
    }

    Ok(())
}
