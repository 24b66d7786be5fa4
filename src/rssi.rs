//! Signal-strength ranging pipeline
//!
//! Beacons broadcast raw received-signal-strength samples; the estimator wants
//! smoothed ranges. This module bridges the two: [RssiModel] is the
//! log-distance path-loss model used to convert between signal strength and
//! distance, and [BeaconSensor] maintains one [ScalarKalmanFilter] per beacon,
//! smooths each raw sample, converts it to a range, and buffers the resulting
//! [Observation]s until the driver drains them for the current tick.
//!
//! Non-finite samples are rejected here, at the ingestion boundary, so a single
//! corrupt broadcast can never poison a per-beacon filter state.

use std::collections::HashMap;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::kalman::ScalarKalmanFilter;
use crate::{EstimatorError, Observation};

/// Log-distance path-loss model.
///
/// Signal strength falls off with the base-10 logarithm of distance:
/// `rssi = tx_power - 10 * n * log10(d)` with `n` the path-loss exponent.
/// The inverse converts a (smoothed) signal strength back into a range.
///
/// # Example
/// ```rust
/// use beaconslam::rssi::RssiModel;
///
/// let model = RssiModel::default();
/// let rssi = model.range_to_rssi(5.0);
/// assert!((model.rssi_to_range(rssi) - 5.0).abs() < 1e-9);
/// ```
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RssiModel {
    /// Received power at the reference distance of one meter, in dBm.
    pub tx_power_dbm: f64,
    /// Path-loss exponent; 2.0 in free space, larger indoors.
    pub path_loss_exponent: f64,
}

impl Default for RssiModel {
    fn default() -> Self {
        RssiModel {
            tx_power_dbm: -12.0,
            path_loss_exponent: 2.0,
        }
    }
}

impl RssiModel {
    /// Minimum modeled distance; the log-distance model diverges at zero range.
    const MIN_RANGE: f64 = 0.1;

    /// # Panics
    /// Panics if the path-loss exponent is not positive.
    pub fn new(tx_power_dbm: f64, path_loss_exponent: f64) -> Self {
        assert!(
            path_loss_exponent > 0.0,
            "path-loss exponent must be positive"
        );
        RssiModel {
            tx_power_dbm,
            path_loss_exponent,
        }
    }

    /// Signal strength at a given distance, in dBm.
    pub fn range_to_rssi(&self, range: f64) -> f64 {
        let clamped = range.max(Self::MIN_RANGE);
        self.tx_power_dbm - 10.0 * self.path_loss_exponent * clamped.log10()
    }

    /// Distance implied by a signal strength, in meters.
    pub fn rssi_to_range(&self, rssi: f64) -> f64 {
        10f64.powf((self.tx_power_dbm - rssi) / (10.0 * self.path_loss_exponent))
    }
}

/// Per-beacon smoothing pipeline turning raw broadcasts into range observations.
///
/// One [ScalarKalmanFilter] is created lazily per beacon identifier the first
/// time that beacon is heard. Smoothed observations accumulate until
/// [BeaconSensor::take_observations] drains them, once per tick.
pub struct BeaconSensor {
    model: RssiModel,
    process_variance: f64,
    measurement_variance: f64,
    filters: HashMap<String, ScalarKalmanFilter>,
    pending: Vec<Observation>,
}

impl BeaconSensor {
    /// Create a sensor with the given propagation model and smoother noise
    /// variances (Q, R), shared by every per-beacon filter.
    ///
    /// # Panics
    /// Panics on a negative process variance or a non-positive measurement
    /// variance.
    pub fn new(model: RssiModel, process_variance: f64, measurement_variance: f64) -> Self {
        assert!(
            process_variance >= 0.0,
            "process variance must be non-negative"
        );
        assert!(
            measurement_variance > 0.0,
            "measurement variance must be positive"
        );
        BeaconSensor {
            model,
            process_variance,
            measurement_variance,
            filters: HashMap::new(),
            pending: Vec::new(),
        }
    }

    /// Ingest one raw broadcast from a beacon.
    ///
    /// Rejects empty identifiers and non-finite samples without touching any
    /// filter state; on success the smoothed, range-converted observation is
    /// appended to the pending buffer.
    pub fn ingest(&mut self, uid: &str, rssi: f64) -> Result<(), EstimatorError> {
        if uid.is_empty() {
            return Err(EstimatorError::EmptyBeaconId);
        }
        if !rssi.is_finite() {
            warn!("dropping non-finite signal sample from beacon {uid}");
            return Err(EstimatorError::NonFiniteSignal(rssi));
        }
        let (q, r) = (self.process_variance, self.measurement_variance);
        let filter = self
            .filters
            .entry(uid.to_string())
            .or_insert_with(|| ScalarKalmanFilter::new(q, r));
        let smoothed = filter.filter(rssi);
        let range = self.model.rssi_to_range(smoothed);
        self.pending.push(Observation {
            uid: uid.to_string(),
            range,
        });
        Ok(())
    }

    /// Drain the observations accumulated since the last call.
    pub fn take_observations(&mut self) -> Vec<Observation> {
        std::mem::take(&mut self.pending)
    }

    /// Number of distinct beacons heard so far.
    pub fn tracked_beacons(&self) -> usize {
        self.filters.len()
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
    fn rssi_range_round_trip() {
        let model = RssiModel::default();
        for range in [0.5, 1.0, 2.5, 8.0, 19.0] {
            let rssi = model.range_to_rssi(range);
            assert_approx_eq!(model.rssi_to_range(rssi), range, 1e-9);
        }
    }

    #[test]
    fn rssi_decreases_with_distance() {
        let model = RssiModel::default();
        assert!(model.range_to_rssi(1.0) > model.range_to_rssi(5.0));
        assert!(model.range_to_rssi(5.0) > model.range_to_rssi(15.0));
    }

    #[test]
    fn sensor_rejects_bad_broadcasts() {
        let mut sensor = BeaconSensor::new(RssiModel::default(), 0.01, 1.0);
        assert_eq!(sensor.ingest("", -40.0), Err(EstimatorError::EmptyBeaconId));
        assert!(matches!(
            sensor.ingest("b-1", f64::NAN),
            Err(EstimatorError::NonFiniteSignal(_))
        ));
        assert_eq!(sensor.tracked_beacons(), 0);
        assert!(sensor.take_observations().is_empty());
    }

    #[test]
    fn sensor_buffers_and_drains_observations() {
        let mut sensor = BeaconSensor::new(RssiModel::default(), 0.01, 1.0);
        sensor.ingest("b-1", -40.0).unwrap();
        sensor.ingest("b-2", -35.0).unwrap();
        let observations = sensor.take_observations();
        assert_eq!(observations.len(), 2);
        assert!(sensor.take_observations().is_empty());
        assert_eq!(sensor.tracked_beacons(), 2);
    }

    #[test]
    fn smoothed_ranges_settle_near_the_true_distance() {
        let model = RssiModel::default();
        let true_range = 6.0;
        let true_rssi = model.range_to_rssi(true_range);
        let mut rng = StdRng::seed_from_u64(17);
        let noise = Normal::new(0.0, 1.0).unwrap();
        let mut sensor = BeaconSensor::new(model, 0.005, 1.0);
        let mut last = 0.0;
        for _ in 0..300 {
            sensor.ingest("b-1", true_rssi + noise.sample(&mut rng)).unwrap();
            last = sensor.take_observations()[0].range;
        }
        assert!(
            (last - true_range).abs() < 1.0,
            "smoothed range {last} strayed from the true {true_range}"
        );
    }
}
