//! Per-beacon landmark belief filters and the per-particle registry
//!
//! A single range reading fixes a beacon only to a circle around the observer,
//! so each beacon's position belief starts life as a ring of hypotheses and is
//! sharpened by importance-weighted resampling as more ranges arrive from
//! different observer positions. One [LandmarkFilter] exists per beacon per
//! pose particle; the [LandmarkRegistry] owns a pose particle's whole
//! collection and creates filters lazily on first contact with a new beacon
//! identifier.

use std::collections::HashMap;
use std::f64::consts::PI;

use log::warn;
use nalgebra::Vector2;
use rand::Rng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::particle::systematic_resample;

/// Configuration for a single landmark belief filter.
///
/// The defaults mirror a small indoor deployment: fifty hypotheses per beacon,
/// a two-meter radial spread on the unknown-bearing prior, ten particles
/// re-seeded after every resample, and resampling forced when the effective
/// count drops below twenty.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct LandmarkFilterConfig {
    /// Particle population size (M). Constant over the filter's lifetime.
    pub num_particles: usize,
    /// Standard deviation of the radial spread used when seeding the
    /// population around the first measurement, and of the re-seed jitter
    /// around the running estimate.
    pub init_spread_std: f64,
    /// Number of particles overwritten with fresh draws around the current
    /// estimate after each resample, guarding against collapse onto a single
    /// mode.
    pub random_particle_count: usize,
    /// Effective-particle-count threshold below which resampling is forced.
    pub effective_count_threshold: f64,
    /// Standard deviation of the Gaussian range-error likelihood model.
    pub range_noise_std: f64,
}

impl Default for LandmarkFilterConfig {
    fn default() -> Self {
        LandmarkFilterConfig {
            num_particles: 50,
            init_spread_std: 2.0,
            random_particle_count: 10,
            effective_count_threshold: 20.0,
            range_noise_std: 1.0,
        }
    }
}

/// One hypothesized beacon position with its importance weight.
#[derive(Clone, Debug)]
pub struct LandmarkParticle {
    pub position: Vector2<f64>,
    pub weight: f64,
}

/// Nested particle filter over a single beacon's 2-D position.
///
/// The population is empty until the first measurement arrives; from then on
/// its size stays fixed at the configured M. Weights are renormalized after
/// every update, with a zero-sum vector recovered locally by substituting a
/// uniform distribution.
///
/// # Example
/// ```rust
/// use beaconslam::landmark::{LandmarkFilter, LandmarkFilterConfig};
/// use nalgebra::Vector2;
/// use rand::SeedableRng;
/// use rand::rngs::StdRng;
///
/// let mut rng = StdRng::seed_from_u64(1);
/// let mut filter = LandmarkFilter::new(LandmarkFilterConfig::default());
/// filter
///     .add_measurement(Vector2::new(0.0, 0.0), 5.0, &mut rng)
///     .add_measurement(Vector2::new(4.0, 0.0), 3.0, &mut rng);
/// let estimate = filter.position_estimate();
/// assert!(estimate.x.is_finite() && estimate.y.is_finite());
/// ```
#[derive(Clone, Debug)]
pub struct LandmarkFilter {
    config: LandmarkFilterConfig,
    particles: Vec<LandmarkParticle>,
    peak_likelihood: f64,
}

impl LandmarkFilter {
    /// # Panics
    /// Panics on an invalid configuration: an empty population, a non-positive
    /// spread or range noise, a re-seed count larger than the population, or
    /// an effective-count threshold outside [1, M].
    pub fn new(config: LandmarkFilterConfig) -> Self {
        assert!(
            config.num_particles > 0,
            "landmark filter needs at least one particle"
        );
        assert!(
            config.init_spread_std > 0.0,
            "initial spread must be positive"
        );
        assert!(
            config.range_noise_std > 0.0,
            "range noise standard deviation must be positive"
        );
        assert!(
            config.random_particle_count <= config.num_particles,
            "cannot re-seed more particles than the population holds"
        );
        assert!(
            config.effective_count_threshold >= 1.0
                && config.effective_count_threshold <= config.num_particles as f64,
            "effective-count threshold must lie in [1, M]"
        );
        LandmarkFilter {
            config,
            particles: Vec::new(),
            peak_likelihood: 1.0,
        }
    }

    /// Whether the first measurement has seeded the population.
    pub fn is_initialized(&self) -> bool {
        !self.particles.is_empty()
    }

    /// Fold one smoothed range measurement into the belief. Chainable.
    ///
    /// The first measurement fixes the beacon only to a circle: the bearing
    /// is unknown, so the population is seeded with uniformly-random bearings
    /// over [0, 2π) at the measured radius, perturbed by the configured
    /// spread. Collapsing this prior early biases the estimator, so the full
    /// circle is always used. Later measurements re-weight every particle by
    /// a Gaussian range-error likelihood, renormalize, and resample when the
    /// effective count falls below the configured threshold.
    pub fn add_measurement(
        &mut self,
        observer: Vector2<f64>,
        range: f64,
        rng: &mut StdRng,
    ) -> &mut Self {
        if self.particles.is_empty() {
            self.seed_population(observer, range, rng);
        } else {
            self.reweight(observer, range);
            if self.effective_sample_size() < self.config.effective_count_threshold {
                self.resample(rng);
            }
        }
        self
    }

    /// Weighted centroid of the current population.
    ///
    /// # Panics
    /// Panics if no measurement has been folded in yet; the registry guards
    /// this with [LandmarkRegistry::has].
    pub fn position_estimate(&self) -> Vector2<f64> {
        assert!(
            !self.particles.is_empty(),
            "position estimate requires at least one measurement"
        );
        let total: f64 = self.particles.iter().map(|p| p.weight).sum();
        let mut centroid = Vector2::zeros();
        for particle in &self.particles {
            centroid += particle.position * particle.weight;
        }
        centroid / total
    }

    /// Maximum per-particle likelihood of the most recent update.
    ///
    /// This is the monotone proxy the pose layer multiplies into its own
    /// importance weights. Initialization is uninformative and reports 1.0.
    pub fn peak_likelihood(&self) -> f64 {
        self.peak_likelihood
    }

    /// Effective particle count, `1 / Σ w²` over the normalized weights.
    pub fn effective_sample_size(&self) -> f64 {
        let sum_sq: f64 = self.particles.iter().map(|p| p.weight * p.weight).sum();
        if sum_sq > 0.0 { 1.0 / sum_sq } else { 0.0 }
    }

    /// Read access to the population, for diagnostic rendering.
    pub fn particles(&self) -> &[LandmarkParticle] {
        &self.particles
    }

    fn seed_population(&mut self, observer: Vector2<f64>, range: f64, rng: &mut StdRng) {
        let radial = Normal::new(0.0, self.config.init_spread_std).unwrap();
        let uniform = 1.0 / self.config.num_particles as f64;
        self.particles = (0..self.config.num_particles)
            .map(|_| {
                let bearing = rng.random_range(0.0..2.0 * PI);
                let radius = range + radial.sample(rng);
                let position =
                    observer + Vector2::new(radius * bearing.cos(), radius * bearing.sin());
                LandmarkParticle {
                    position,
                    weight: uniform,
                }
            })
            .collect();
        self.peak_likelihood = 1.0;
    }

    fn reweight(&mut self, observer: Vector2<f64>, range: f64) {
        let sigma = self.config.range_noise_std;
        let log_norm = -sigma.ln() - 0.5 * (2.0 * PI).ln();
        let mut peak = 0.0_f64;
        for particle in &mut self.particles {
            let implied_range = (particle.position - observer).norm();
            let normalized_error = (implied_range - range) / sigma;
            let likelihood = (log_norm - 0.5 * normalized_error.powi(2)).exp();
            particle.weight *= likelihood;
            peak = peak.max(likelihood);
        }
        self.peak_likelihood = peak;
        self.normalize_weights();
    }

    fn normalize_weights(&mut self) {
        let sum: f64 = self.particles.iter().map(|p| p.weight).sum();
        if sum > 0.0 && sum.is_finite() {
            for particle in &mut self.particles {
                particle.weight /= sum;
            }
        } else {
            warn!("landmark weight vector degenerated to zero; substituting a uniform distribution");
            let uniform = 1.0 / self.particles.len() as f64;
            for particle in &mut self.particles {
                particle.weight = uniform;
            }
        }
    }

    fn resample(&mut self, rng: &mut StdRng) {
        let count = self.config.num_particles;
        let center = self.position_estimate();
        let weights: Vec<f64> = self.particles.iter().map(|p| p.weight).collect();
        let indices = systematic_resample(&weights, count, rng);
        let uniform = 1.0 / count as f64;
        let mut next: Vec<LandmarkParticle> = indices
            .into_iter()
            .map(|index| LandmarkParticle {
                position: self.particles[index].position,
                weight: uniform,
            })
            .collect();
        // Anti-degeneracy injection: overwrite a few of the survivors with
        // fresh draws around the pre-resample estimate.
        let jitter = Normal::new(0.0, self.config.init_spread_std).unwrap();
        for slot in next.iter_mut().take(self.config.random_particle_count) {
            slot.position = center + Vector2::new(jitter.sample(rng), jitter.sample(rng));
        }
        self.particles = next;
    }
}

/// Per-pose-particle collection of landmark filters, keyed by beacon uid.
///
/// Entries are created exactly once, on the first measurement referencing a
/// new identifier, using the registry's shared configuration.
#[derive(Clone, Debug)]
pub struct LandmarkRegistry {
    config: LandmarkFilterConfig,
    filters: HashMap<String, LandmarkFilter>,
}

impl LandmarkRegistry {
    pub fn new(config: LandmarkFilterConfig) -> Self {
        LandmarkRegistry {
            config,
            filters: HashMap::new(),
        }
    }

    /// Route one measurement to the beacon's filter, creating it on first
    /// sight, and return the update's likelihood proxy for the pose layer.
    pub fn observe(
        &mut self,
        uid: &str,
        observer: Vector2<f64>,
        range: f64,
        rng: &mut StdRng,
    ) -> f64 {
        let config = self.config;
        let filter = self
            .filters
            .entry(uid.to_string())
            .or_insert_with(|| LandmarkFilter::new(config));
        filter.add_measurement(observer, range, rng).peak_likelihood()
    }

    /// Whether a beacon has ever been observed through this registry.
    pub fn has(&self, uid: &str) -> bool {
        self.filters.contains_key(uid)
    }

    /// Position estimate for a beacon, or `None` if it was never observed.
    /// Callers guard with [LandmarkRegistry::has]; `None` is the explicit
    /// "not found" signal, never a fabricated position.
    pub fn estimate(&self, uid: &str) -> Option<Vector2<f64>> {
        self.filters.get(uid).map(|filter| filter.position_estimate())
    }

    /// Remove a beacon's filter from this registry, returning whether an
    /// entry existed.
    ///
    /// Removal affects only this registry: the beacon becomes unknown here
    /// and a fresh filter is created on its next measurement. Copies held by
    /// sibling pose particles are value-semantic and intentionally untouched.
    pub fn remove(&mut self, uid: &str) -> bool {
        self.filters.remove(uid).is_some()
    }

    /// Read access to one beacon's filter, for diagnostic rendering.
    pub fn get(&self, uid: &str) -> Option<&LandmarkFilter> {
        self.filters.get(uid)
    }

    /// Iterate over all tracked beacons and their filters.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &LandmarkFilter)> {
        self.filters.iter()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}
