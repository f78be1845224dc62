//! CLI tool to run a delivery fleet until all work drains.
//!
//! Rules come from the FLEET_* environment; flags override the run size
//! and pacing. The final status is printed as JSON on stdout.

use clap::Parser;
use fleet_cli::load_orders;
use fleet_server::{logging, Config, FleetManager};
use std::path::PathBuf;
use std::time::Duration;

/// Run a simulated delivery fleet to completion
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Number of drones
    #[arg(long)]
    drones: Option<usize>,

    /// Number of random deliveries (ignored with --orders)
    #[arg(long)]
    deliveries: Option<usize>,

    /// JSON file with an array of delivery orders
    #[arg(long)]
    orders: Option<PathBuf>,

    /// Simulated seconds per real second (default: FLEET_TIME_SCALE)
    #[arg(long)]
    time_scale: Option<f64>,

    /// Give up after this many real seconds
    #[arg(long, default_value_t = 600)]
    max_secs: u64,

    /// Log as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::from_env();
    logging::init_tracing(args.json_logs || config.log_json, "fleet_server=info")?;

    let fleet = FleetManager::new(config.rules.clone())?;
    if let Some(scale) = args.time_scale {
        fleet.set_time_scale(scale)?;
    }

    let drones = args.drones.unwrap_or(config.drone_count);
    let run_id = match &args.orders {
        Some(path) => {
            let orders = load_orders(path)?;
            fleet.start_with_orders(drones, orders).await?
        }
        None => {
            let deliveries = args.deliveries.unwrap_or(config.delivery_count);
            fleet.start(drones, deliveries).await?
        }
    };
    tracing::info!("Simulation {} started with {} drone(s)", run_id, drones);

    let drained = tokio::select! {
        result = tokio::time::timeout(Duration::from_secs(args.max_secs), fleet.wait_until_stopped()) => result.is_ok(),
        _ = tokio::signal::ctrl_c() => false,
    };

    let status = fleet.status();
    if !drained {
        tracing::warn!(
            "Stopping before all work drained ({} pending, {} stuck)",
            status.stats.pending_deliveries,
            status.stats.stuck_deliveries
        );
        fleet.reset().await?;
    }

    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
