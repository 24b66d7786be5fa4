//! Scalar recursive filtering for raw signal-strength streams
//!
//! Received signal strength from a stationary beacon is a constant buried in
//! heavy measurement noise, so the smoother assumes a stationary signal: the
//! predict step leaves the state estimate unchanged and only inflates the error
//! covariance by the process variance. The update step blends the raw sample
//! into the estimate proportionally to the Kalman gain. One filter instance is
//! kept per beacon by the sensor pipeline (see [crate::rssi::BeaconSensor]);
//! the filter itself knows nothing about beacons or ranges.

/// One-dimensional recursive (Kalman-form) filter.
///
/// State and covariance persist across calls; that persistence is the entire
/// purpose of the filter. There is no reset operation, matching the lifecycle
/// of a beacon that broadcasts for as long as it is powered.
///
/// # Example
/// ```rust
/// use beaconslam::kalman::ScalarKalmanFilter;
///
/// let mut filter = ScalarKalmanFilter::new(0.01, 1.0);
/// let first = filter.filter(-48.0);
/// assert_eq!(first, -48.0);
/// let second = filter.filter(-46.0);
/// assert!(second > -48.0 && second < -46.0);
/// ```
#[derive(Clone, Debug)]
pub struct ScalarKalmanFilter {
    /// Process noise variance (Q).
    process_variance: f64,
    /// Measurement noise variance (R).
    measurement_variance: f64,
    /// Current state estimate; `None` until the first sample seeds it.
    state: Option<f64>,
    /// Current error covariance.
    covariance: f64,
}

impl ScalarKalmanFilter {
    /// Create a filter from its noise model.
    ///
    /// # Panics
    /// Panics if the process variance is negative or the measurement variance
    /// is not positive.
    pub fn new(process_variance: f64, measurement_variance: f64) -> Self {
        assert!(
            process_variance >= 0.0,
            "process variance must be non-negative"
        );
        assert!(
            measurement_variance > 0.0,
            "measurement variance must be positive"
        );
        ScalarKalmanFilter {
            process_variance,
            measurement_variance,
            state: None,
            covariance: 0.0,
        }
    }

    /// Filter one raw sample and return the updated state estimate.
    ///
    /// The first sample seeds the state with the measurement itself and the
    /// covariance with the measurement variance. Every later call runs one
    /// predict/update cycle: covariance grows by the process variance, the
    /// gain is `covariance / (covariance + R)`, the state moves toward the
    /// measurement by the gain, and the covariance shrinks by `1 - gain`.
    ///
    /// Non-finite measurements are not screened here; the ingestion boundary
    /// rejects them before they reach the filter. A non-finite value passed
    /// directly would propagate into the state.
    pub fn filter(&mut self, measurement: f64) -> f64 {
        match self.state {
            None => {
                self.state = Some(measurement);
                self.covariance = self.measurement_variance;
                measurement
            }
            Some(estimate) => {
                let predicted_covariance = self.covariance + self.process_variance;
                let gain = predicted_covariance / (predicted_covariance + self.measurement_variance);
                let updated = estimate + gain * (measurement - estimate);
                self.state = Some(updated);
                self.covariance = predicted_covariance * (1.0 - gain);
                updated
            }
        }
    }

    /// Current state estimate, or `None` before the first sample.
    pub fn estimate(&self) -> Option<f64> {
        self.state
    }

    /// Current error covariance.
    pub fn covariance(&self) -> f64 {
        self.covariance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand_distr::{Distribution, Normal};

    #[test]
    fn first_sample_passes_through() {
        let mut filter = ScalarKalmanFilter::new(0.01, 1.0);
        assert_eq!(filter.estimate(), None);
        let out = filter.filter(-52.5);
        assert_approx_eq!(out, -52.5, 1e-12);
        assert_approx_eq!(filter.covariance(), 1.0, 1e-12);
    }

    #[test]
    fn covariance_is_non_increasing_for_a_constant_signal() {
        let mut filter = ScalarKalmanFilter::new(0.01, 1.0);
        filter.filter(-40.0);
        let mut previous = filter.covariance();
        for _ in 0..50 {
            filter.filter(-40.0);
            let current = filter.covariance();
            assert!(
                current <= previous + 1e-12,
                "covariance increased: {previous} -> {current}"
            );
            previous = current;
        }
    }

    #[test]
    fn constant_signal_estimate_is_unmoved() {
        let mut filter = ScalarKalmanFilter::new(0.0, 2.0);
        for _ in 0..20 {
            assert_approx_eq!(filter.filter(-45.0), -45.0, 1e-12);
        }
    }

    #[test]
    fn smoothing_recovers_the_mean_of_a_noisy_constant() {
        let mut rng = StdRng::seed_from_u64(99);
        let noise = Normal::new(0.0, 1.0).unwrap();
        let mut filter = ScalarKalmanFilter::new(0.005, 1.0);
        let mut estimate = 0.0;
        for _ in 0..300 {
            estimate = filter.filter(-50.0 + noise.sample(&mut rng));
        }
        assert!(
            (estimate + 50.0).abs() < 0.5,
            "smoothed estimate {estimate} strayed from the true -50.0"
        );
    }
}
