//! Fine-rate integration stage
//!
//! Sensor increments arrive at the sample rate and are summed, `N` at a time (the decimation
//! factor), into [`FineIncrement`]s. The running sum is an immutable [`FineAccumulator`]
//! value: every call to [`FineAccumulator::accumulate`] consumes the accumulator and returns
//! the updated one, so a partially filled accumulator can never be observed half-updated.
//!
//! Closed fine increments pass through the accelerometer and gyro stages of an
//! [`ErrorCompensation`] implementation before they reach the coarse mechanization. The
//! stages are identity by default ([`NoCompensation`]); [`FixedCompensation`] removes known
//! constant bias and scale factor errors.
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::Increment;

/// Sum of `samples` consecutive sensor increments.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FineIncrement {
    /// Time of the last summed sample in seconds
    pub t: f64,
    /// Summed delta-velocity in m/s, body frame
    pub delta_velocity: Vector3<f64>,
    /// Summed delta-angle in rad, body frame
    pub delta_angle: Vector3<f64>,
    /// Number of sensor samples summed
    pub samples: usize,
    /// Duration covered by the summed samples in seconds
    pub dt: f64,
}
impl FineIncrement {
    pub fn new(
        t: f64,
        delta_velocity: Vector3<f64>,
        delta_angle: Vector3<f64>,
        samples: usize,
        dt: f64,
    ) -> FineIncrement {
        FineIncrement {
            t,
            delta_velocity,
            delta_angle,
            samples,
            dt,
        }
    }
}

/// Running sum of the sensor increments of one fine interval
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FineAccumulator {
    t: f64,
    delta_velocity: Vector3<f64>,
    delta_angle: Vector3<f64>,
    samples: usize,
}
impl FineAccumulator {
    /// Accumulator with no samples
    pub fn empty() -> FineAccumulator {
        FineAccumulator::default()
    }
    /// Add one sensor increment, returning the updated accumulator.
    ///
    /// # Example
    /// ```rust
    /// use bins::Increment;
    /// use bins::integration::FineAccumulator;
    /// use nalgebra::Vector3;
    ///
    /// let sample = Increment::new(0.1, Vector3::new(0.0, 0.0, 0.01), Vector3::new(1e-4, 0.0, 0.0));
    /// let accumulator = FineAccumulator::empty().accumulate(&sample).accumulate(&sample);
    /// assert_eq!(accumulator.samples(), 2);
    /// let fine = accumulator.finish(20.0);
    /// assert_eq!(fine.delta_angle[0], 2e-4);
    /// assert_eq!(fine.dt, 0.1);
    /// ```
    pub fn accumulate(self, increment: &Increment) -> FineAccumulator {
        FineAccumulator {
            t: increment.t,
            delta_velocity: self.delta_velocity + increment.delta_velocity,
            delta_angle: self.delta_angle + increment.delta_angle,
            samples: self.samples + 1,
        }
    }
    pub fn is_empty(&self) -> bool {
        self.samples == 0
    }
    pub fn samples(&self) -> usize {
        self.samples
    }
    /// Close the fine interval. Its duration is `samples / sample_rate`.
    pub fn finish(self, sample_rate: f64) -> FineIncrement {
        FineIncrement {
            t: self.t,
            delta_velocity: self.delta_velocity,
            delta_angle: self.delta_angle,
            samples: self.samples,
            dt: self.samples as f64 / sample_rate,
        }
    }
}

/// Sensor error compensation applied to every closed fine increment.
///
/// Both stages default to the identity. The accelerometer stage runs first, then the gyro
/// stage; each receives and returns the whole fine increment.
pub trait ErrorCompensation {
    /// Accelerometer (delta-velocity) compensation
    fn compensate_accelerometer(&self, increment: FineIncrement) -> FineIncrement {
        increment
    }
    /// Gyroscope (delta-angle) compensation
    fn compensate_gyro(&self, increment: FineIncrement) -> FineIncrement {
        increment
    }
    /// Run both stages
    fn compensate(&self, increment: FineIncrement) -> FineIncrement {
        self.compensate_gyro(self.compensate_accelerometer(increment))
    }
}

/// Identity compensation
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCompensation;
impl ErrorCompensation for NoCompensation {}

/// Known constant sensor errors.
///
/// The sensor model per axis is `measured = (1 + scale) * true + bias * dt`, so compensation
/// subtracts `bias * dt` and divides by `1 + scale`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FixedCompensation {
    /// Accelerometer bias in m/s^2
    #[serde(default)]
    pub accel_bias: [f64; 3],
    /// Gyroscope bias in rad/s
    #[serde(default)]
    pub gyro_bias: [f64; 3],
    /// Accelerometer scale factor error (unitless)
    #[serde(default)]
    pub accel_scale: [f64; 3],
    /// Gyroscope scale factor error (unitless)
    #[serde(default)]
    pub gyro_scale: [f64; 3],
}
fn remove_errors(
    measured: &Vector3<f64>,
    bias: &[f64; 3],
    scale: &[f64; 3],
    dt: f64,
) -> Vector3<f64> {
    Vector3::from_fn(|i, _| (measured[i] - bias[i] * dt) / (1.0 + scale[i]))
}
impl ErrorCompensation for FixedCompensation {
    fn compensate_accelerometer(&self, increment: FineIncrement) -> FineIncrement {
        FineIncrement {
            delta_velocity: remove_errors(
                &increment.delta_velocity,
                &self.accel_bias,
                &self.accel_scale,
                increment.dt,
            ),
            ..increment
        }
    }
    fn compensate_gyro(&self, increment: FineIncrement) -> FineIncrement {
        FineIncrement {
            delta_angle: remove_errors(
                &increment.delta_angle,
                &self.gyro_bias,
                &self.gyro_scale,
                increment.dt,
            ),
            ..increment
        }
    }
}
