//! Demo harness: spawn a vehicle on flat ground, drive it for a while at
//! a fixed 60 Hz tick, report telemetry.

use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use nalgebra::Isometry3;
use tokio::time::{interval, Duration};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use drivesim::{DescribeSections, PhysicsWorld, VehicleInfo};

#[derive(Parser, Debug)]
#[command(name = "drivesim", version, about = "Vehicle dynamics demo loop")]
struct Opts {
    /// Vehicle configuration JSON; built-in coupe preset when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Simulated ticks (60 per second).
    #[arg(long, default_value_t = 600)]
    ticks: u32,

    /// Throttle held for the whole run.
    #[arg(long, default_value_t = 1.0)]
    throttle: f32,

    /// Steering input in [-1, 1].
    #[arg(long, default_value_t = 0.0)]
    steering: f32,

    /// Print the full state dump at the end.
    #[arg(long)]
    dump: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let opts = Opts::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    info!("drivesim v{}", env!("CARGO_PKG_VERSION"));

    let config = match &opts.config {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => VehicleInfo::coupe(),
    };

    let mut world = PhysicsWorld::new();
    let index = world.spawn_vehicle(
        &config,
        Isometry3::translation(0.0, 1.0, 0.0),
    )?;
    world.align_vehicle_with_ground(index);

    {
        let vehicle = world.vehicle_mut(index);
        vehicle.set_autoclutch(true);
        vehicle.set_autoshift(true);
        vehicle.set_abs(true);
        vehicle.set_tcs(true);
        vehicle.start_engine();
    }

    let dt = 1.0 / 60.0;
    let mut ticker = interval(Duration::from_millis(16));
    for tick in 0..opts.ticks {
        ticker.tick().await;
        // inputs are applied every frame, the autoclutch reshapes them
        {
            let vehicle = world.vehicle_mut(index);
            vehicle.set_throttle(opts.throttle);
            vehicle.set_steering(opts.steering);
        }
        world.step(dt);

        if tick % 60 == 0 {
            let vehicle = world.vehicle(index);
            info!(
                "tick {tick}: speed {:.1} m/s, rpm {:.0}, gear {}, clutch {:.2}",
                vehicle.speed(&world.bodies),
                vehicle.tacho_rpm(),
                vehicle.gear(),
                vehicle.clutch_position(),
            );
        }
    }

    let vehicle = world.vehicle(index);
    info!(
        "final: speed {:.1} m/s, braking distance to 0: {:.1} m",
        vehicle.speed(&world.bodies),
        vehicle.braking_distance(&world.bodies, 0.0),
    );
    if opts.dump {
        println!("{}", vehicle.describe(&world.bodies, DescribeSections::all()));
    }
    Ok(())
}
