//! Simulated environment and scenario driver
//!
//! This module provides:
//! - A ground-truth agent executing a bounded random walk, standing in for the
//!   external motion source
//! - Broadcasting beacons with noisy signal strength and a limited radio range
//! - A scenario driver that wires agent, beacons, sensor pipeline, and filter
//!   together in the strict MOTION → OBSERVE → RESAMPLE → READOUT tick order
//! - A per-tick record struct with CSV import/export for offline analysis
//!
//! The estimator never sees ground truth; the scenario driver uses it only to
//! synthesize broadcasts and to score the filter's readouts.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use log::{debug, warn};
use nalgebra::Vector2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::filter::{SlamFilterConfig, SlamParticleFilter};
use crate::rssi::{BeaconSensor, RssiModel};
use crate::{Control, Pose, wrap_to_pi};

/// Rectangular simulation area centered on the origin, with a padding band the
/// random walk treats as a soft wall.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct AreaBounds {
    pub x_range: f64,
    pub y_range: f64,
    pub padding: f64,
}

impl Default for AreaBounds {
    fn default() -> Self {
        AreaBounds {
            x_range: 50.0,
            y_range: 50.0,
            padding: 5.0,
        }
    }
}

impl AreaBounds {
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x.abs() <= self.x_range / 2.0 && y.abs() <= self.y_range / 2.0
    }

    fn contains_padded(&self, x: f64, y: f64) -> bool {
        x.abs() <= self.x_range / 2.0 - self.padding && y.abs() <= self.y_range / 2.0 - self.padding
    }
}

/// Ground-truth agent executing a bounded random walk.
///
/// Each step moves a fixed distance with a random heading change; a step that
/// would leave the padded area is redirected toward the center instead. The
/// control actually executed is recorded and handed to the estimator as its
/// motion input, matching the boundary contract of the external motion source.
#[derive(Clone, Debug)]
pub struct SimulatedAgent {
    pose: Pose,
    step_size: f64,
    turn_std: f64,
    bounds: AreaBounds,
    last_control: Control,
    path: Vec<Pose>,
}

impl SimulatedAgent {
    /// # Panics
    /// Panics on a non-positive step size.
    pub fn new(start: Pose, step_size: f64, bounds: AreaBounds) -> Self {
        assert!(step_size > 0.0, "step size must be positive");
        SimulatedAgent {
            pose: start,
            step_size,
            turn_std: 0.4,
            bounds,
            last_control: Control::default(),
            path: vec![start],
        }
    }

    /// Execute one random-walk step.
    pub fn random_walk(&mut self, rng: &mut StdRng) {
        let turn = Normal::new(0.0, self.turn_std).unwrap();
        let mut delta_theta = turn.sample(rng);
        let mut heading = wrap_to_pi(self.pose.theta + delta_theta);
        let next_x = self.pose.x + self.step_size * heading.cos();
        let next_y = self.pose.y + self.step_size * heading.sin();
        if !self.bounds.contains_padded(next_x, next_y) {
            // Head back toward the center with a little jitter.
            let toward_center = (-self.pose.y).atan2(-self.pose.x);
            delta_theta = wrap_to_pi(toward_center - self.pose.theta + turn.sample(rng));
            heading = wrap_to_pi(self.pose.theta + delta_theta);
        }
        self.pose.theta = heading;
        self.pose.x += self.step_size * heading.cos();
        self.pose.y += self.step_size * heading.sin();
        self.last_control = Control {
            r: self.step_size,
            theta: delta_theta,
        };
        self.path.push(self.pose);
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    /// The control executed by the most recent step.
    pub fn last_control(&self) -> Control {
        self.last_control
    }

    /// Ground-truth path walked so far, starting pose included.
    pub fn path(&self) -> &[Pose] {
        &self.path
    }
}

/// A stationary broadcast beacon with a limited radio range.
#[derive(Clone, Debug)]
pub struct SimulatedBeacon {
    pub uid: String,
    pub position: Vector2<f64>,
    pub broadcast_range: f64,
    pub noise_std: f64,
    model: RssiModel,
}

impl SimulatedBeacon {
    pub fn new(
        uid: impl Into<String>,
        position: Vector2<f64>,
        broadcast_range: f64,
        noise_std: f64,
        model: RssiModel,
    ) -> Self {
        assert!(broadcast_range > 0.0, "broadcast range must be positive");
        assert!(noise_std >= 0.0, "noise standard deviation must be non-negative");
        SimulatedBeacon {
            uid: uid.into(),
            position,
            broadcast_range,
            noise_std,
            model,
        }
    }

    pub fn in_range(&self, x: f64, y: f64) -> bool {
        (self.position - Vector2::new(x, y)).norm() <= self.broadcast_range
    }

    /// Noise-free received signal strength at a point.
    pub fn rssi_at_raw(&self, x: f64, y: f64) -> f64 {
        self.model
            .range_to_rssi((self.position - Vector2::new(x, y)).norm())
    }

    /// Noisy received signal strength at a point.
    pub fn rssi_at(&self, x: f64, y: f64, rng: &mut StdRng) -> f64 {
        self.rssi_at_raw(x, y) + Normal::new(0.0, self.noise_std).unwrap().sample(rng)
    }
}

/// Scatter `count` beacons uniformly over the area.
pub fn place_beacons(
    count: usize,
    bounds: AreaBounds,
    broadcast_range: f64,
    noise_std: f64,
    model: RssiModel,
    rng: &mut StdRng,
) -> Vec<SimulatedBeacon> {
    (0..count)
        .map(|index| {
            let x = rng.random_range(-bounds.x_range / 2.0..bounds.x_range / 2.0);
            let y = rng.random_range(-bounds.y_range / 2.0..bounds.y_range / 2.0);
            SimulatedBeacon::new(
                format!("beacon-{index}"),
                Vector2::new(x, y),
                broadcast_range,
                noise_std,
                model,
            )
        })
        .collect()
}

/// Full description of a simulated run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub ticks: usize,
    pub num_beacons: usize,
    pub area: AreaBounds,
    /// Distance the agent moves per tick, in meters.
    pub agent_step: f64,
    /// Radio range of every simulated beacon, in meters.
    pub beacon_range: f64,
    /// Standard deviation of the broadcast signal noise, in dBm.
    pub beacon_noise_std: f64,
    pub rssi: RssiModel,
    /// Process variance (Q) for the per-beacon signal smoother.
    pub signal_process_variance: f64,
    /// Measurement variance (R) for the per-beacon signal smoother.
    pub signal_measurement_variance: f64,
    pub slam: SlamFilterConfig,
    /// Seed for the environment (walk, beacon placement, broadcast noise);
    /// the filter seeds its own generator from `slam.seed`.
    pub seed: u64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        ScenarioConfig {
            ticks: 500,
            num_beacons: 10,
            area: AreaBounds::default(),
            agent_step: 1.0,
            beacon_range: 20.0,
            beacon_noise_std: 1.0,
            rssi: RssiModel::default(),
            signal_process_variance: 0.01,
            signal_measurement_variance: 1.0,
            slam: SlamFilterConfig::default(),
            seed: 42,
        }
    }
}

/// One tick of scenario output, flattened into a CSV row.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScenarioRecord {
    pub tick: usize,
    pub true_x: f64,
    pub true_y: f64,
    pub true_theta: f64,
    pub est_x: f64,
    pub est_y: f64,
    pub est_theta: f64,
    /// Euclidean distance between true and estimated position.
    pub pose_error: f64,
    /// Beacons present in the aggregated map this tick.
    pub beacons_tracked: usize,
    /// Mean error of the aggregated beacon estimates against ground truth.
    pub mean_beacon_error: f64,
    /// Effective sample size of the pose population before resampling.
    pub effective_sample_size: f64,
}

impl ScenarioRecord {
    /// Reads a CSV file previously written by [ScenarioRecord::to_csv].
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Self>, Box<dyn std::error::Error>> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut records = Vec::new();
        for result in reader.deserialize() {
            let record: Self = result?;
            records.push(record);
        }
        Ok(records)
    }

    /// Writes records to a CSV file.
    pub fn to_csv<P: AsRef<Path>>(records: &[Self], path: P) -> io::Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for record in records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Output of a scenario run.
#[derive(Debug)]
pub struct ScenarioResult {
    pub records: Vec<ScenarioRecord>,
    /// Final per-beacon estimate errors, keyed by uid, for every beacon the
    /// filter learned.
    pub beacon_errors: BTreeMap<String, f64>,
}

impl ScenarioResult {
    pub fn final_pose_error(&self) -> Option<f64> {
        self.records.last().map(|record| record.pose_error)
    }

    pub fn mean_beacon_error(&self) -> Option<f64> {
        if self.beacon_errors.is_empty() {
            return None;
        }
        let sum: f64 = self.beacon_errors.values().sum();
        Some(sum / self.beacon_errors.len() as f64)
    }

    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        ScenarioRecord::to_csv(&self.records, path)
    }
}

/// Drive a full scenario: one MOTION → OBSERVE → RESAMPLE → READOUT cycle per
/// tick, scoring readouts against ground truth.
///
/// Rejected inputs (which the simulation should never produce) are logged and
/// skipped rather than aborting the run, mirroring how a live deployment
/// degrades: one bad broadcast costs one observation, nothing more.
pub fn run_scenario(config: &ScenarioConfig) -> ScenarioResult {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut agent = SimulatedAgent::new(config.slam.initial_pose, config.agent_step, config.area);
    let beacons = place_beacons(
        config.num_beacons,
        config.area,
        config.beacon_range,
        config.beacon_noise_std,
        config.rssi,
        &mut rng,
    );
    let mut sensor = BeaconSensor::new(
        config.rssi,
        config.signal_process_variance,
        config.signal_measurement_variance,
    );
    let mut filter = SlamParticleFilter::new(config.slam);

    let truth: BTreeMap<String, Vector2<f64>> = beacons
        .iter()
        .map(|beacon| (beacon.uid.clone(), beacon.position))
        .collect();
    let mut records = Vec::with_capacity(config.ticks);

    for tick in 0..config.ticks {
        // MOTION
        agent.random_walk(&mut rng);
        if let Err(error) = filter.sample_pose(&agent.last_control()) {
            warn!("tick {tick}: dropped control ({error})");
        }

        // OBSERVE
        let pose = agent.pose();
        for beacon in &beacons {
            if beacon.in_range(pose.x, pose.y) {
                let rssi = beacon.rssi_at(pose.x, pose.y, &mut rng);
                if let Err(error) = sensor.ingest(&beacon.uid, rssi) {
                    warn!("tick {tick}: dropped broadcast from {} ({error})", beacon.uid);
                }
            }
        }
        for observation in sensor.take_observations() {
            if let Err(error) = filter.process_observation(&observation) {
                warn!("tick {tick}: dropped observation of {} ({error})", observation.uid);
            }
        }

        // RESAMPLE
        let effective_sample_size = filter.effective_sample_size();
        filter.resample();

        // READOUT
        let estimate = filter.estimate();
        let map = filter.landmark_estimates();
        let mut error_sum = 0.0;
        for (uid, est) in &map {
            if let Some(actual) = truth.get(uid) {
                error_sum += (*est - *actual).norm();
            }
        }
        let mean_beacon_error = if map.is_empty() {
            0.0
        } else {
            error_sum / map.len() as f64
        };
        let pose_error = estimate.distance_to(pose.x, pose.y);
        debug!(
            "tick {tick}: pose error {pose_error:.2} m, {} beacons mapped",
            map.len()
        );
        records.push(ScenarioRecord {
            tick,
            true_x: pose.x,
            true_y: pose.y,
            true_theta: pose.theta,
            est_x: estimate.x,
            est_y: estimate.y,
            est_theta: estimate.theta,
            pose_error,
            beacons_tracked: map.len(),
            mean_beacon_error,
            effective_sample_size,
        });
    }

    let beacon_errors = filter
        .landmark_estimates()
        .into_iter()
        .filter_map(|(uid, est)| {
            truth
                .get(&uid)
                .map(|actual| (uid, (est - *actual).norm()))
        })
        .collect();

    ScenarioResult {
        records,
        beacon_errors,
    }
}
