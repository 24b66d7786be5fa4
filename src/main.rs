use std::path::PathBuf;

use clap::Parser;
use log::info;

use beaconslam::filter::SlamFilterConfig;
use beaconslam::landmark::LandmarkFilterConfig;
use beaconslam::sim::{ScenarioConfig, run_scenario};

/// Simulate a range-only SLAM run over radio beacons.
#[derive(Parser, Debug)]
#[command(name = "beaconslam", version, about)]
struct Cli {
    /// Number of simulation ticks to run.
    #[arg(long, default_value_t = 500)]
    ticks: usize,

    /// Pose particle count (N).
    #[arg(long, default_value_t = 100)]
    particles: usize,

    /// Landmark particle count per beacon filter (M).
    #[arg(long, default_value_t = 50)]
    landmark_particles: usize,

    /// Number of simulated beacons.
    #[arg(long, default_value_t = 10)]
    beacons: usize,

    /// Seed for both the environment and the filter.
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Optional CSV path for the per-tick records.
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let config = ScenarioConfig {
        ticks: cli.ticks,
        num_beacons: cli.beacons,
        seed: cli.seed,
        slam: SlamFilterConfig {
            num_particles: cli.particles,
            seed: cli.seed,
            landmark: LandmarkFilterConfig {
                num_particles: cli.landmark_particles,
                ..LandmarkFilterConfig::default()
            },
            ..SlamFilterConfig::default()
        },
        ..ScenarioConfig::default()
    };

    info!(
        "running {} ticks with {} pose particles and {} beacons",
        config.ticks, config.slam.num_particles, config.num_beacons
    );
    let result = run_scenario(&config);

    if let Some(record) = result.records.last() {
        println!("final pose error:  {:.2} m", record.pose_error);
        println!("beacons mapped:    {}/{}", record.beacons_tracked, cli.beacons);
    }
    if let Some(mean) = result.mean_beacon_error() {
        println!("mean beacon error: {mean:.2} m");
    }
    for (uid, error) in &result.beacon_errors {
        println!("  {uid}: estimate error {error:.2} m");
    }

    if let Some(path) = cli.output {
        match result.to_csv(&path) {
            Ok(()) => println!("records written to {}", path.display()),
            Err(error) => eprintln!("failed to write {}: {error}", path.display()),
        }
    }
}
