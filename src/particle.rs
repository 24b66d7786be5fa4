//! Pose particles, the noisy motion model, and resampling helpers
//!
//! A pose particle is one hypothesis of the agent's pose together with the
//! landmark map conditioned on that hypothesis. Motion sampling deliberately
//! spreads the particles — each one draws its own noisy version of the
//! control — and the weighting/resampling cycle of the top-level filter is
//! what pulls the population back toward observation-consistent hypotheses.

use rand::Rng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::landmark::{LandmarkFilterConfig, LandmarkRegistry};
use crate::{Control, Pose, wrap_to_pi};

/// Additive process noise applied to each motion control sample.
///
/// Effective standard deviations scale with the control magnitude:
/// `sigma = base + scale * |magnitude|`. Rotation is modeled as noisier than
/// translation — heading error from wheel slip and sensor drift dominates
/// odometry error in practice.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct MotionNoiseConfig {
    pub translation_noise_std: f64,
    pub translation_noise_scale: f64,
    pub rotation_noise_std: f64,
    pub rotation_noise_scale: f64,
}

impl Default for MotionNoiseConfig {
    fn default() -> Self {
        MotionNoiseConfig {
            translation_noise_std: 0.02,
            translation_noise_scale: 0.10,
            rotation_noise_std: 0.05,
            rotation_noise_scale: 0.25,
        }
    }
}

impl MotionNoiseConfig {
    pub fn is_valid(&self) -> bool {
        self.translation_noise_std >= 0.0
            && self.translation_noise_scale >= 0.0
            && self.rotation_noise_std >= 0.0
            && self.rotation_noise_scale >= 0.0
    }

    /// Effective translation standard deviation for a control of magnitude `r`.
    pub fn translation_std(&self, r: f64) -> f64 {
        self.translation_noise_std + self.translation_noise_scale * r.abs()
    }

    /// Effective rotation standard deviation for a heading change of `theta`.
    pub fn rotation_std(&self, theta: f64) -> f64 {
        self.rotation_noise_std + self.rotation_noise_scale * theta.abs()
    }
}

/// One pose hypothesis and the landmark map conditioned on it.
///
/// Ownership is exclusive: a particle is never shared across filter instances
/// or across generations. Resampling deep-copies the selected ancestors,
/// registry and all, so sibling particles never alias mutable state.
#[derive(Clone, Debug)]
pub struct PoseParticle {
    pub pose: Pose,
    pub weight: f64,
    pub landmarks: LandmarkRegistry,
}

impl PoseParticle {
    pub fn new(pose: Pose, weight: f64, landmark_config: LandmarkFilterConfig) -> Self {
        PoseParticle {
            pose,
            weight,
            landmarks: LandmarkRegistry::new(landmark_config),
        }
    }

    /// Apply one noisy motion sample: perturb the control, turn, then move
    /// the perturbed distance along the new heading. The heading is wrapped
    /// back to (-π, π].
    pub fn sample_pose(&mut self, control: &Control, noise: &MotionNoiseConfig, rng: &mut StdRng) {
        let translation = Normal::new(control.r, noise.translation_std(control.r)).unwrap();
        let rotation = Normal::new(control.theta, noise.rotation_std(control.theta)).unwrap();
        let distance = translation.sample(rng);
        let turn = rotation.sample(rng);
        self.pose.theta = wrap_to_pi(self.pose.theta + turn);
        self.pose.x += distance * self.pose.theta.cos();
        self.pose.y += distance * self.pose.theta.sin();
    }
}

/// Draw `count` ancestor indices by systematic (low-variance) resampling.
///
/// One uniform offset is drawn and the cumulative weight distribution is
/// traversed at regular steps, which keeps resampling variance low compared
/// to independent multinomial draws. Weights need not be normalized but must
/// sum to a positive finite value.
///
/// # Panics
/// Panics on an empty population, a zero target size, or a weight sum that is
/// not positive and finite; callers substitute a uniform distribution for
/// degenerate weight vectors before resampling.
pub fn systematic_resample(weights: &[f64], count: usize, rng: &mut StdRng) -> Vec<usize> {
    assert!(!weights.is_empty(), "cannot resample an empty population");
    assert!(count > 0, "resample target size must be positive");
    let total: f64 = weights.iter().sum();
    assert!(
        total > 0.0 && total.is_finite(),
        "resampling requires a positive finite weight sum"
    );
    let step = total / count as f64;
    let mut indices = Vec::with_capacity(count);
    let mut position = rng.random_range(0.0..step);
    let mut index = 0;
    let mut cumulative = weights[0];
    for _ in 0..count {
        while position > cumulative && index < weights.len() - 1 {
            index += 1;
            cumulative += weights[index];
        }
        indices.push(index);
        position += step;
    }
    indices
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand::SeedableRng;
    use std::f64::consts::PI;

    fn noise_free() -> MotionNoiseConfig {
        MotionNoiseConfig {
            translation_noise_std: 0.0,
            translation_noise_scale: 0.0,
            rotation_noise_std: 0.0,
            rotation_noise_scale: 0.0,
        }
    }

    #[test]
    fn noise_free_motion_is_exact() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut particle = PoseParticle::new(
            Pose::new(0.0, 0.0, 0.0),
            1.0,
            LandmarkFilterConfig::default(),
        );
        particle.sample_pose(&Control { r: 2.0, theta: 0.0 }, &noise_free(), &mut rng);
        assert_approx_eq!(particle.pose.x, 2.0, 1e-12);
        assert_approx_eq!(particle.pose.y, 0.0, 1e-12);

        particle.sample_pose(
            &Control {
                r: 1.0,
                theta: PI / 2.0,
            },
            &noise_free(),
            &mut rng,
        );
        assert_approx_eq!(particle.pose.x, 2.0, 1e-12);
        assert_approx_eq!(particle.pose.y, 1.0, 1e-12);
        assert_approx_eq!(particle.pose.theta, PI / 2.0, 1e-12);
    }

    #[test]
    fn heading_wraps_after_motion() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut particle = PoseParticle::new(
            Pose::new(0.0, 0.0, 3.0),
            1.0,
            LandmarkFilterConfig::default(),
        );
        particle.sample_pose(&Control { r: 0.0, theta: 1.0 }, &noise_free(), &mut rng);
        assert!(particle.pose.theta <= PI && particle.pose.theta >= -PI);
        assert_approx_eq!(particle.pose.theta, 4.0 - 2.0 * PI, 1e-12);
    }

    #[test]
    fn noisy_motion_spreads_particles() {
        let mut rng = StdRng::seed_from_u64(11);
        let noise = MotionNoiseConfig::default();
        let mut xs = Vec::new();
        for _ in 0..50 {
            let mut particle = PoseParticle::new(
                Pose::default(),
                1.0,
                LandmarkFilterConfig::default(),
            );
            particle.sample_pose(&Control { r: 1.0, theta: 0.0 }, &noise, &mut rng);
            xs.push(particle.pose.x);
        }
        let min = xs.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        assert!(max > min, "process noise should spread the hypotheses");
    }

    #[test]
    fn systematic_resample_returns_the_requested_count() {
        let mut rng = StdRng::seed_from_u64(3);
        let weights = vec![0.1, 0.2, 0.3, 0.4];
        let indices = systematic_resample(&weights, 100, &mut rng);
        assert_eq!(indices.len(), 100);
        assert!(indices.iter().all(|&i| i < weights.len()));
    }

    #[test]
    fn systematic_resample_concentrates_on_heavy_weights() {
        let mut rng = StdRng::seed_from_u64(3);
        let weights = vec![0.0, 0.0, 1.0, 0.0];
        let indices = systematic_resample(&weights, 32, &mut rng);
        assert!(indices.iter().all(|&i| i == 2));
    }

    #[test]
    #[should_panic(expected = "positive finite weight sum")]
    fn systematic_resample_rejects_zero_mass() {
        let mut rng = StdRng::seed_from_u64(3);
        let _ = systematic_resample(&[0.0, 0.0], 4, &mut rng);
    }
}
