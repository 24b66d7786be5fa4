//! Top-level Rao-Blackwellized pose particle filter
//!
//! The filter owns a fixed-size population of [PoseParticle]s, each carrying
//! its own landmark registry. One tick is strictly ordered: MOTION
//! ([SlamParticleFilter::sample_pose]), OBSERVE (zero or more calls to
//! [SlamParticleFilter::process_observation]), RESAMPLE
//! ([SlamParticleFilter::resample]), then READOUT (any number of calls to the
//! accessors before the next MOTION). The filter is single-threaded and
//! step-driven; no operation blocks or suspends.

use std::collections::BTreeMap;

use log::{debug, warn};
use nalgebra::Vector2;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::landmark::LandmarkFilterConfig;
use crate::particle::{MotionNoiseConfig, PoseParticle, systematic_resample};
use crate::{Control, EstimatorError, Observation, Pose};

/// Configuration for the pose particle filter.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SlamFilterConfig {
    /// Pose particle count (N). Fixed for the filter's lifetime.
    pub num_particles: usize,
    /// Pose every particle starts from.
    pub initial_pose: Pose,
    /// Process noise applied to motion controls.
    pub motion_noise: MotionNoiseConfig,
    /// Configuration handed to every landmark filter created by any particle.
    pub landmark: LandmarkFilterConfig,
    /// Seed for the filter's own random number generator.
    pub seed: u64,
}

impl Default for SlamFilterConfig {
    fn default() -> Self {
        SlamFilterConfig {
            num_particles: 100,
            initial_pose: Pose::default(),
            motion_noise: MotionNoiseConfig::default(),
            landmark: LandmarkFilterConfig::default(),
            seed: 42,
        }
    }
}

/// FastSLAM-style pose particle filter.
///
/// # Example
/// ```rust
/// use beaconslam::filter::{SlamFilterConfig, SlamParticleFilter};
/// use beaconslam::{Control, Observation};
///
/// let mut filter = SlamParticleFilter::new(SlamFilterConfig::default());
/// filter.sample_pose(&Control { r: 1.0, theta: 0.0 }).unwrap();
/// filter
///     .process_observation(&Observation { uid: "beacon-7".into(), range: 4.0 })
///     .unwrap();
/// filter.resample();
/// assert_eq!(filter.particles().len(), 100);
/// ```
pub struct SlamParticleFilter {
    motion_noise: MotionNoiseConfig,
    particles: Vec<PoseParticle>,
    rng: StdRng,
}

impl SlamParticleFilter {
    /// # Panics
    /// Panics on an empty population or negative motion noise parameters.
    /// Landmark configuration is validated when the first filter is created;
    /// see [crate::landmark::LandmarkFilter::new].
    pub fn new(config: SlamFilterConfig) -> Self {
        assert!(
            config.num_particles > 0,
            "pose particle filter needs at least one particle"
        );
        assert!(
            config.motion_noise.is_valid(),
            "motion noise standard deviations must be non-negative"
        );
        let weight = 1.0 / config.num_particles as f64;
        let particles = (0..config.num_particles)
            .map(|_| PoseParticle::new(config.initial_pose, weight, config.landmark))
            .collect();
        SlamParticleFilter {
            motion_noise: config.motion_noise,
            particles,
            rng: StdRng::seed_from_u64(config.seed),
        }
    }

    /// MOTION: apply one noisy sample of the control to every particle.
    ///
    /// Non-finite controls are rejected before any particle moves; a single
    /// bad control must not corrupt the whole population.
    pub fn sample_pose(&mut self, control: &Control) -> Result<(), EstimatorError> {
        if !control.is_finite() {
            warn!("rejecting non-finite control (r = {}, theta = {})", control.r, control.theta);
            return Err(EstimatorError::NonFiniteControl {
                r: control.r,
                theta: control.theta,
            });
        }
        for particle in &mut self.particles {
            particle.sample_pose(control, &self.motion_noise, &mut self.rng);
        }
        Ok(())
    }

    /// OBSERVE: fan one observation out to every particle's registry.
    ///
    /// Each particle treats its own pose as the observer position and routes
    /// the range into its landmark registry; the returned likelihood scales
    /// the particle's importance weight. Multiple observations within one tick
    /// compound multiplicatively, reflecting the per-landmark independence
    /// assumption. Invalid observations are rejected before any particle's
    /// state is touched.
    pub fn process_observation(&mut self, observation: &Observation) -> Result<(), EstimatorError> {
        if observation.uid.is_empty() {
            return Err(EstimatorError::EmptyBeaconId);
        }
        if !observation.range.is_finite() {
            warn!(
                "rejecting non-finite range for beacon {}",
                observation.uid
            );
            return Err(EstimatorError::NonFiniteRange(observation.range));
        }
        for particle in &mut self.particles {
            let observer = Vector2::new(particle.pose.x, particle.pose.y);
            let likelihood =
                particle
                    .landmarks
                    .observe(&observation.uid, observer, observation.range, &mut self.rng);
            particle.weight *= likelihood;
        }
        Ok(())
    }

    /// RESAMPLE: draw a new generation of N particles proportional to weight.
    ///
    /// Weights are normalized first; a zero-sum weight vector is recovered
    /// locally by substituting a uniform distribution. Each selected ancestor
    /// is deep-copied — registry, landmark populations and all — into a fresh
    /// generation buffer which then replaces the old population, so siblings
    /// never alias mutable state. Weights reset to 1/N: the posterior is
    /// encoded in the selection frequencies.
    pub fn resample(&mut self) {
        let count = self.particles.len();
        let uniform = 1.0 / count as f64;
        let sum: f64 = self.particles.iter().map(|p| p.weight).sum();
        let weights: Vec<f64> = if sum > 0.0 && sum.is_finite() {
            self.particles.iter().map(|p| p.weight / sum).collect()
        } else {
            warn!("pose weight vector degenerated to zero; substituting a uniform distribution");
            vec![uniform; count]
        };
        let effective = 1.0 / weights.iter().map(|w| w * w).sum::<f64>();
        debug!("resampling {count} pose particles (effective sample size {effective:.1})");

        let indices = systematic_resample(&weights, count, &mut self.rng);
        let mut next = Vec::with_capacity(count);
        for index in indices {
            let mut descendant = self.particles[index].clone();
            descendant.weight = uniform;
            next.push(descendant);
        }
        self.particles = next;
    }

    /// READOUT: the pose particle population, for belief-spread rendering.
    pub fn particles(&self) -> &[PoseParticle] {
        &self.particles
    }

    pub fn num_particles(&self) -> usize {
        self.particles.len()
    }

    /// READOUT: weighted mean pose. The heading is aggregated as a circular
    /// mean (atan2 of the weighted sine and cosine sums); a plain average is
    /// wrong across the ±π seam.
    pub fn estimate(&self) -> Pose {
        let total: f64 = self.particles.iter().map(|p| p.weight).sum();
        let count = self.particles.len() as f64;
        let (mut x, mut y, mut sin_sum, mut cos_sum) = (0.0, 0.0, 0.0, 0.0);
        for particle in &self.particles {
            let weight = if total > 0.0 {
                particle.weight / total
            } else {
                1.0 / count
            };
            x += weight * particle.pose.x;
            y += weight * particle.pose.y;
            sin_sum += weight * particle.pose.theta.sin();
            cos_sum += weight * particle.pose.theta.cos();
        }
        Pose {
            x,
            y,
            theta: sin_sum.atan2(cos_sum),
        }
    }

    /// READOUT: the aggregated landmark map.
    ///
    /// For every beacon uid tracked by at least one particle, the estimate is
    /// the pose-weight-weighted mean of the per-particle estimates, normalized
    /// by the weight mass of the particles tracking that uid. The aggregation
    /// is deterministic given the filter state, and the returned map iterates
    /// in uid order.
    pub fn landmark_estimates(&self) -> BTreeMap<String, Vector2<f64>> {
        let total: f64 = self.particles.iter().map(|p| p.weight).sum();
        let mut sums: BTreeMap<String, (Vector2<f64>, f64)> = BTreeMap::new();
        for particle in &self.particles {
            let weight = if total > 0.0 { particle.weight } else { 1.0 };
            for (uid, filter) in particle.landmarks.iter() {
                let entry = sums
                    .entry(uid.clone())
                    .or_insert((Vector2::zeros(), 0.0));
                entry.0 += filter.position_estimate() * weight;
                entry.1 += weight;
            }
        }
        sums.into_iter()
            .map(|(uid, (sum, mass))| (uid, sum / mass))
            .collect()
    }

    /// Effective sample size of the pose population, computed over normalized
    /// weights. A degenerate (zero-sum) weight vector reads as fully diverse
    /// since it will be recovered to uniform at the next resample.
    pub fn effective_sample_size(&self) -> f64 {
        let total: f64 = self.particles.iter().map(|p| p.weight).sum();
        if total <= 0.0 || !total.is_finite() {
            return self.particles.len() as f64;
        }
        let sum_sq: f64 = self
            .particles
            .iter()
            .map(|p| (p.weight / total).powi(2))
            .sum();
        1.0 / sum_sq
    }
}
