//! Sources of inertial sensor increments.
//!
//! The mechanization consumes any `Iterator<Item = Increment>`. This module provides the two
//! sources used in practice:
//!
//! - [`ImuEmulator`], a closed-form generator of constant body-frame signals (typically the
//!   readings of a stationary, aligned IMU), and
//! - recorded logs, space-delimited tables with a `t ax ay az wx wy wz` header where every row
//!   is one increment ([`read_imu_log`] and [`write_imu_log`]).
//!
//! Timestamps must be strictly increasing; [`validate_increments`] enforces this for
//! materialized sequences.
use log::debug;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use std::path::Path;

use crate::earth::EarthModel;
use crate::{Increment, NavigationError, NavigationState};

/// Default column delimiter of recorded sensor logs
pub const DEFAULT_DELIMITER: u8 = b' ';

/// Closed-form IMU emulator producing constant body-frame signals.
///
/// Sample `k` (1-based) is stamped `start_time + k / sample_rate` and carries
/// `specific_force / sample_rate` and `angular_rate / sample_rate`. The emulator yields
/// `round(duration * sample_rate)` samples. Timestamps are computed from the sample index
/// so they do not accumulate rounding error over long runs.
#[derive(Clone, Debug)]
pub struct ImuEmulator {
    /// Body frame specific force in m/s^2
    pub specific_force: Vector3<f64>,
    /// Body frame angular rate in rad/s
    pub angular_rate: Vector3<f64>,
    /// Sample rate in Hz
    pub sample_rate: f64,
    /// Duration in seconds
    pub duration: f64,
    /// Time of the start of the first sample period in seconds
    pub start_time: f64,
    index: usize,
    count: usize,
}
impl ImuEmulator {
    /// Emulator with constant body-frame signals.
    ///
    /// # Arguments
    /// * `specific_force` - body frame specific force in m/s^2
    /// * `angular_rate` - body frame angular rate in rad/s
    /// * `sample_rate` - sample rate in Hz, must be positive
    /// * `duration` - emulated duration in seconds
    /// * `start_time` - time of the start of the first sample period in seconds
    pub fn new(
        specific_force: Vector3<f64>,
        angular_rate: Vector3<f64>,
        sample_rate: f64,
        duration: f64,
        start_time: f64,
    ) -> Result<ImuEmulator, NavigationError> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(NavigationError::InvalidConfig(format!(
                "emulator sample rate must be positive and finite, got {sample_rate} Hz"
            )));
        }
        if !(duration.is_finite() && duration >= 0.0) {
            return Err(NavigationError::InvalidConfig(format!(
                "emulator duration must be non-negative and finite, got {duration} s"
            )));
        }
        let count = (duration * sample_rate).round() as usize;
        debug!(
            "IMU emulator: {count} samples at {sample_rate} Hz, f_b = [{:.6}, {:.6}, {:.6}] m/s^2, w_b = [{:.6e}, {:.6e}, {:.6e}] rad/s",
            specific_force[0],
            specific_force[1],
            specific_force[2],
            angular_rate[0],
            angular_rate[1],
            angular_rate[2]
        );
        Ok(ImuEmulator {
            specific_force,
            angular_rate,
            sample_rate,
            duration,
            start_time,
            index: 0,
            count,
        })
    }
    /// Emulator for an IMU at rest at the position and attitude of `initial_state`.
    ///
    /// The sensed signals are the Earth rotation and the reaction to gravity, projected into
    /// the body frame: $\omega_b = (C_b^n)^T \omega_{ie}^n(\varphi)$, $f_b = (C_b^n)^T [0, 0, g]$.
    ///
    /// # Example
    /// ```rust
    /// use bins::NavigationState;
    /// use bins::earth::EarthModel;
    /// use bins::messages::ImuEmulator;
    /// use nalgebra::Vector3;
    ///
    /// let state = NavigationState::aligned(0.0, 0.9, 0.0, Vector3::zeros(), 0.0, 0.0, 0.0);
    /// let emulator = ImuEmulator::stationary(&state, &EarthModel::default(), 800.0, 1.0).unwrap();
    /// assert_eq!(emulator.count(), 800);
    /// ```
    pub fn stationary(
        initial_state: &NavigationState,
        earth: &EarthModel,
        sample_rate: f64,
        duration: f64,
    ) -> Result<ImuEmulator, NavigationError> {
        let c_ref_to_body = initial_state.c_body_to_ref.transpose();
        let angular_rate = c_ref_to_body * earth.earth_rate(&initial_state.latitude);
        let specific_force = c_ref_to_body * earth.stationary_specific_force();
        ImuEmulator::new(
            specific_force,
            angular_rate,
            sample_rate,
            duration,
            initial_state.t,
        )
    }
}
impl Iterator for ImuEmulator {
    type Item = Increment;

    fn next(&mut self) -> Option<Increment> {
        if self.index >= self.count {
            return None;
        }
        self.index += 1;
        let dt = 1.0 / self.sample_rate;
        Some(Increment::from_rates(
            self.start_time + self.index as f64 / self.sample_rate,
            &self.specific_force,
            &self.angular_rate,
            dt,
        ))
    }
    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.count - self.index;
        (remaining, Some(remaining))
    }
}
impl ExactSizeIterator for ImuEmulator {}

/// One row of a recorded sensor log: time and the six sensor increments.
///
/// `ax, ay, az` are delta-velocities in m/s and `wx, wy, wz` delta-angles in rad, body frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ImuLogRecord {
    pub t: f64,
    pub ax: f64,
    pub ay: f64,
    pub az: f64,
    pub wx: f64,
    pub wy: f64,
    pub wz: f64,
}
impl From<&ImuLogRecord> for Increment {
    fn from(record: &ImuLogRecord) -> Self {
        Increment::new(
            record.t,
            Vector3::new(record.ax, record.ay, record.az),
            Vector3::new(record.wx, record.wy, record.wz),
        )
    }
}
impl From<&Increment> for ImuLogRecord {
    fn from(increment: &Increment) -> Self {
        ImuLogRecord {
            t: increment.t,
            ax: increment.delta_velocity[0],
            ay: increment.delta_velocity[1],
            az: increment.delta_velocity[2],
            wx: increment.delta_angle[0],
            wy: increment.delta_angle[1],
            wz: increment.delta_angle[2],
        }
    }
}

/// Read a recorded sensor log.
///
/// The whole table is read before returning. A header row naming the `t ax ay az wx wy wz`
/// columns is required; column order does not matter and surrounding whitespace is trimmed.
/// Each row is used directly as one increment.
///
/// # Arguments
/// * `path` - path to the log file
/// * `delimiter` - column delimiter, [`DEFAULT_DELIMITER`] for the usual space-delimited logs
///
/// # Returns
/// The increments in file order, or [`NavigationError::NonMonotonicTime`] if the timestamps are
/// not strictly increasing.
pub fn read_imu_log<P: AsRef<Path>>(
    path: P,
    delimiter: u8,
) -> Result<Vec<Increment>, NavigationError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .from_path(path.as_ref())?;
    let mut increments = Vec::new();
    for result in reader.deserialize() {
        let record: ImuLogRecord = result?;
        increments.push(Increment::from(&record));
    }
    validate_increments(&increments)?;
    debug!(
        "Read {} increments from {}",
        increments.len(),
        path.as_ref().display()
    );
    Ok(increments)
}
/// Write increments in the recorded log format.
pub fn write_imu_log<P: AsRef<Path>>(
    increments: &[Increment],
    path: P,
    delimiter: u8,
) -> Result<(), NavigationError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_path(path)?;
    for increment in increments {
        writer.serialize(ImuLogRecord::from(increment))?;
    }
    writer.flush()?;
    Ok(())
}
/// Check that every timestamp is finite and strictly greater than the previous one.
pub fn validate_increments(increments: &[Increment]) -> Result<(), NavigationError> {
    let mut previous = f64::NEG_INFINITY;
    for (index, increment) in increments.iter().enumerate() {
        if !(increment.t.is_finite() && increment.t > previous) {
            return Err(NavigationError::NonMonotonicTime {
                index,
                previous,
                current: increment.t,
            });
        }
        previous = increment.t;
    }
    Ok(())
}
