//! Range-only SLAM toolbox for radio-beacon localization
//!
//! This crate provides a FastSLAM-style recursive Bayesian estimator for a mobile
//! agent that localizes itself while simultaneously mapping stationary radio
//! beacons from noisy signal-strength-derived range readings. The estimator is a
//! Rao-Blackwellized particle filter: a population of pose hypotheses is driven
//! by a noisy motion model and re-weighted by observation likelihood, and each
//! pose particle owns its own map in the form of one nested particle filter per
//! beacon. Conditioned on a pose hypothesis, every beacon's position estimate is
//! computed independently, so the joint posterior over pose and map factors into
//! cheap per-particle pieces.
//!
//! This crate is primarily built off of three additional dependencies:
//! - [`nalgebra`](https://crates.io/crates/nalgebra): Provides the vector types used
//!   for positions and estimates.
//! - [`rand`](https://crates.io/crates/rand) and
//!   [`rand_distr`](https://crates.io/crates/rand_distr): Provide random number
//!   generation for the motion model, landmark priors, and resampling.
//! - [`serde`](https://crates.io/crates/serde): Provides (de)serialization for the
//!   configuration surface and for scenario records.
//!
//! All other functionality is built on top of these crates or is auxiliary
//! functionality (e.g. CSV export of scenario runs). Variables are named for the
//! quantity they represent rather than the symbol used in the literature; for
//! example the effective particle count is `effective_sample_size` and not
//! `n_eff`, though the shorthand may appear inside function bodies.
//!
//! ## Crate overview
//!
//! This crate is organized into several modules:
//! - [kalman]: Scalar recursive (Kalman-form) filter that smooths raw signal
//!   strength before it is converted to a range.
//! - [rssi]: Log-distance path-loss model and the per-beacon smoothing pipeline
//!   that turns raw broadcasts into range observations.
//! - [landmark]: The nested per-beacon particle filter and the per-pose-particle
//!   registry of those filters.
//! - [particle]: Pose particles, the noisy motion model, and the shared
//!   resampling helper.
//! - [filter]: The top-level pose particle filter tying everything together.
//! - [sim]: Simulated environment (bounded random walk, broadcasting beacons)
//!   and a scenario driver with CSV export.
//!
//! ## Estimation cycle
//!
//! One simulation tick is strictly ordered: MOTION (every pose particle samples
//! a noisy version of the control), OBSERVE (zero or more range observations
//! fan out to each particle's beacon registry and scale its importance weight),
//! RESAMPLE (a new generation is drawn proportional to weight and weights reset
//! to uniform), then READOUT (consumers may poll poses and the aggregated map
//! any number of times before the next MOTION).
//!
//! ```rust
//! use beaconslam::filter::{SlamFilterConfig, SlamParticleFilter};
//! use beaconslam::{Control, Observation};
//!
//! let mut filter = SlamParticleFilter::new(SlamFilterConfig::default());
//! filter.sample_pose(&Control { r: 0.5, theta: 0.1 }).unwrap();
//! filter
//!     .process_observation(&Observation { uid: "b-1".into(), range: 7.2 })
//!     .unwrap();
//! filter.resample();
//! let pose = filter.estimate();
//! assert!(pose.x.is_finite());
//! ```

pub mod filter;
pub mod kalman;
pub mod landmark;
pub mod particle;
pub mod rssi;
pub mod sim;

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by the estimator at its ingestion boundaries.
///
/// All of these are caller-recoverable: the estimator rejects the offending
/// input before mutating any particle state, so the filter remains usable.
/// Degenerate weight vectors are not represented here because they are
/// recovered locally (by substituting a uniform distribution) and never
/// surfaced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EstimatorError {
    #[error("non-finite control input (r = {r}, theta = {theta})")]
    NonFiniteControl { r: f64, theta: f64 },

    #[error("non-finite observation range: {0}")]
    NonFiniteRange(f64),

    #[error("non-finite signal sample: {0}")]
    NonFiniteSignal(f64),

    #[error("observation carries an empty beacon identifier")]
    EmptyBeaconId,
}

/// Planar agent pose: position in meters, heading in radians.
///
/// Headings are kept wrapped to (-π, π]; [`Pose::new`] wraps on construction
/// and the motion model wraps after every update.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

impl Pose {
    pub fn new(x: f64, y: f64, theta: f64) -> Pose {
        Pose {
            x,
            y,
            theta: wrap_to_pi(theta),
        }
    }

    /// The position component as a vector.
    pub fn position(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }

    /// Euclidean distance from this pose to a point.
    pub fn distance_to(&self, x: f64, y: f64) -> f64 {
        ((self.x - x).powi(2) + (self.y - y).powi(2)).sqrt()
    }
}

/// Motion control for one tick: distance moved and heading change.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Control {
    /// Distance moved over the tick, in meters.
    pub r: f64,
    /// Heading change over the tick, in radians.
    pub theta: f64,
}

impl Control {
    pub fn is_finite(&self) -> bool {
        self.r.is_finite() && self.theta.is_finite()
    }
}

/// A single smoothed range observation of one beacon.
///
/// Produced once per broadcast by the sensor pipeline and consumed once by the
/// filter; observations are not retained. The range must already be smoothed
/// (see [rssi::BeaconSensor]) before it reaches the estimator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Opaque, unique beacon identifier.
    pub uid: String,
    /// Smoothed range to the beacon, in meters.
    pub range: f64,
}

/// Wrap an angle to the range -π to π radians.
///
/// # Example
/// ```rust
/// use beaconslam::wrap_to_pi;
/// use std::f64::consts::PI;
///
/// let wrapped = wrap_to_pi(3.0 * PI / 2.0);
/// assert!((wrapped + PI / 2.0).abs() < 1e-12);
/// ```
pub fn wrap_to_pi(angle: f64) -> f64 {
    let mut wrapped = angle;
    while wrapped > std::f64::consts::PI {
        wrapped -= 2.0 * std::f64::consts::PI;
    }
    while wrapped < -std::f64::consts::PI {
        wrapped += 2.0 * std::f64::consts::PI;
    }
    wrapped
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use std::f64::consts::PI;

    #[test]
    fn wrap_to_pi_leaves_canonical_angles_alone() {
        assert_approx_eq!(wrap_to_pi(0.0), 0.0, 1e-12);
        assert_approx_eq!(wrap_to_pi(1.5), 1.5, 1e-12);
        assert_approx_eq!(wrap_to_pi(-3.0), -3.0, 1e-12);
    }

    #[test]
    fn wrap_to_pi_wraps_full_turns() {
        assert_approx_eq!(wrap_to_pi(2.0 * PI + 0.25), 0.25, 1e-12);
        assert_approx_eq!(wrap_to_pi(-2.0 * PI - 0.25), -0.25, 1e-12);
        assert_approx_eq!(wrap_to_pi(3.0 * PI), PI, 1e-12);
    }

    #[test]
    fn pose_construction_wraps_heading() {
        let pose = Pose::new(1.0, 2.0, 2.0 * PI + 0.5);
        assert_approx_eq!(pose.theta, 0.5, 1e-12);
        assert_approx_eq!(pose.distance_to(1.0, 5.0), 3.0, 1e-12);
    }

    #[test]
    fn control_finiteness_check() {
        assert!(Control { r: 1.0, theta: 0.1 }.is_finite());
        assert!(!Control { r: f64::NAN, theta: 0.0 }.is_finite());
        assert!(
            !Control {
                r: 0.0,
                theta: f64::INFINITY
            }
            .is_finite()
        );
    }
}
