//! CLI tool to compute one collision-checked flight plan.
//!
//! Prints the plan as JSON on stdout.

use chrono::Utc;
use clap::Parser;
use fleet_cli::parse_point;
use fleet_core::RoutingService;
use fleet_server::Config;

/// Plan a single drone route and print it as JSON
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Start position as lat,lon[,altitude]
    #[arg(long)]
    start: String,

    /// End position as lat,lon[,altitude]
    #[arg(long)]
    end: String,

    /// Drone identifier
    #[arg(long, default_value = "drone_0")]
    drone_id: String,

    /// Print compact JSON instead of pretty
    #[arg(long)]
    compact: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::from_env();
    config.validate()?;

    let start = parse_point(&args.start)?;
    let end = parse_point(&args.end)?;

    let mut routing = RoutingService::new(config.rules);
    let plan = routing.calculate_route(start, end, &args.drone_id, Utc::now())?;

    let json = if args.compact {
        serde_json::to_string(&plan)?
    } else {
        serde_json::to_string_pretty(&plan)?
    };
    println!("{}", json);
    eprintln!(
        "{}: {:.2} km at {} m, {:.0} s, {:.2}% battery",
        plan.drone_id,
        plan.total_distance_km,
        plan.altitude_m,
        plan.total_time_s,
        plan.total_energy
    );

    Ok(())
}
