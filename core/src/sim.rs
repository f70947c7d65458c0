//! Mechanization loop, configuration and trajectory I/O.
//!
//! This module provides:
//! - [`Navigator`], the state machine that drives the fine and coarse stages from a stream of
//!   sensor increments
//! - [`dead_reckoning`], a one-call wrapper around [`Navigator::run`]
//! - [`Trajectory`], the sequence of produced states with CSV import/export
//! - [`MechanizationConfig`] and [`SimulationConfig`], serializable as JSON, YAML or TOML
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use std::fs;
use std::io;
use std::path::Path;

use crate::earth::EarthModel;
use crate::integration::{
    ErrorCompensation, FineAccumulator, FineIncrement, FixedCompensation, NoCompensation,
};
use crate::messages::{ImuEmulator, read_imu_log};
use crate::{Increment, NavigationError, NavigationState, mechanize};

/// Number of fine increments per coarse update
pub const FINE_PER_COARSE: usize = 4;

/// What to do with sensor data left over when the source ends mid-interval.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrailingPolicy {
    /// Drop the incomplete fine increment and any buffered fine increments
    #[default]
    Discard,
    /// Close the incomplete fine increment and run one final, shorter coarse update
    Flush,
}

fn default_sample_rate() -> f64 {
    800.0
}
fn default_decimation() -> usize {
    4
}

/// Parameters of the mechanization itself.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MechanizationConfig {
    /// Sensor sample rate in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate_hz: f64,
    /// Sensor samples per fine increment (N)
    #[serde(default = "default_decimation")]
    pub decimation: usize,
    /// End-of-stream handling
    #[serde(default)]
    pub trailing: TrailingPolicy,
    /// Earth constants
    #[serde(default)]
    pub earth: EarthModel,
}
impl Default for MechanizationConfig {
    fn default() -> Self {
        MechanizationConfig {
            sample_rate_hz: default_sample_rate(),
            decimation: default_decimation(),
            trailing: TrailingPolicy::default(),
            earth: EarthModel::default(),
        }
    }
}
impl MechanizationConfig {
    pub fn validate(&self) -> Result<(), NavigationError> {
        if !(self.sample_rate_hz.is_finite() && self.sample_rate_hz > 0.0) {
            return Err(NavigationError::InvalidConfig(format!(
                "sample rate must be positive and finite, got {} Hz",
                self.sample_rate_hz
            )));
        }
        if self.decimation == 0 {
            return Err(NavigationError::InvalidConfig(
                "decimation factor must be at least 1".to_string(),
            ));
        }
        self.earth.validate()
    }
    /// Fine step $h = N / f_s$ in seconds
    pub fn fine_period(&self) -> f64 {
        self.decimation as f64 / self.sample_rate_hz
    }
    /// Coarse step $H = 4h$ in seconds
    pub fn coarse_period(&self) -> f64 {
        FINE_PER_COARSE as f64 * self.fine_period()
    }
}

/// Multi-rate mechanization state machine.
///
/// Increments are fed one at a time through [`Navigator::step`]. Every `decimation` increments
/// a fine increment is closed and compensated; every [`FINE_PER_COARSE`] fine increments a
/// coarse update produces a new [`NavigationState`]. Produced states are values: the navigator
/// never modifies a state after returning it.
pub struct Navigator {
    config: MechanizationConfig,
    compensation: Box<dyn ErrorCompensation>,
    state: NavigationState,
    accumulator: FineAccumulator,
    fine: Vec<FineIncrement>,
    previous_time: f64,
    index: usize,
}
impl Navigator {
    /// Create a navigator starting from `initial_state`.
    ///
    /// # Errors
    /// [`NavigationError::InvalidConfig`] if the configuration does not validate.
    pub fn new(
        config: MechanizationConfig,
        initial_state: NavigationState,
    ) -> Result<Navigator, NavigationError> {
        config.validate()?;
        debug!(
            "Navigator: {} Hz, N = {}, fine step {} s, coarse step {} s, trailing {:?}",
            config.sample_rate_hz,
            config.decimation,
            config.fine_period(),
            config.coarse_period(),
            config.trailing
        );
        debug!("Initial state: {initial_state}");
        Ok(Navigator {
            config,
            compensation: Box::new(NoCompensation),
            state: initial_state,
            accumulator: FineAccumulator::empty(),
            fine: Vec::with_capacity(FINE_PER_COARSE),
            previous_time: f64::NEG_INFINITY,
            index: 0,
        })
    }
    /// Replace the sensor error compensation stages
    pub fn with_compensation(mut self, compensation: Box<dyn ErrorCompensation>) -> Navigator {
        self.compensation = compensation;
        self
    }
    /// Most recently produced state (the initial state before the first coarse update)
    pub fn state(&self) -> &NavigationState {
        &self.state
    }
    pub fn config(&self) -> &MechanizationConfig {
        &self.config
    }
    /// Samples accumulated since the last coarse update
    pub fn pending_samples(&self) -> usize {
        self.accumulator.samples() + self.fine.iter().map(|fine| fine.samples).sum::<usize>()
    }
    /// Feed one sensor increment.
    ///
    /// # Returns
    /// `Ok(Some(state))` when the increment completes a coarse interval, `Ok(None)` otherwise.
    ///
    /// # Errors
    /// [`NavigationError::NonMonotonicTime`] if the timestamp is not finite or does not follow
    /// the previous increment. The rejected increment is not accumulated.
    pub fn step(&mut self, increment: Increment) -> Result<Option<NavigationState>, NavigationError> {
        let index = self.index;
        if !(increment.t.is_finite() && increment.t > self.previous_time) {
            return Err(NavigationError::NonMonotonicTime {
                index,
                previous: self.previous_time,
                current: increment.t,
            });
        }
        self.index += 1;
        self.previous_time = increment.t;
        self.accumulator = self.accumulator.accumulate(&increment);
        if self.accumulator.samples() < self.config.decimation {
            return Ok(None);
        }
        self.close_fine();
        if self.fine.len() < FINE_PER_COARSE {
            return Ok(None);
        }
        Ok(Some(self.coarse_update()))
    }
    /// Handle the end of the stream according to the configured [`TrailingPolicy`].
    ///
    /// Returns the extra state produced by [`TrailingPolicy::Flush`], if any. The navigator is
    /// left with no pending samples either way.
    pub fn finish(&mut self) -> Option<NavigationState> {
        let pending = self.pending_samples();
        if pending == 0 {
            return None;
        }
        match self.config.trailing {
            TrailingPolicy::Discard => {
                warn!(
                    "Discarding {pending} trailing samples after t = {} s that do not fill a coarse interval",
                    self.state.t
                );
                self.accumulator = FineAccumulator::empty();
                self.fine.clear();
                None
            }
            TrailingPolicy::Flush => {
                if !self.accumulator.is_empty() {
                    self.close_fine();
                }
                debug!(
                    "Flushing {pending} trailing samples in {} fine increments",
                    self.fine.len()
                );
                Some(self.coarse_update())
            }
        }
    }
    /// Drive the navigator over a whole source, then apply the trailing policy.
    ///
    /// The initial state is not part of the returned trajectory.
    pub fn run<I>(mut self, source: I) -> Result<Trajectory, NavigationError>
    where
        I: IntoIterator<Item = Increment>,
    {
        let source = source.into_iter();
        let per_state = self.config.decimation * FINE_PER_COARSE;
        let mut trajectory = Trajectory::with_capacity(source.size_hint().0 / per_state + 1);
        for increment in source {
            if let Some(state) = self.step(increment)? {
                trajectory.states.push(state);
            }
        }
        if let Some(state) = self.finish() {
            trajectory.states.push(state);
        }
        debug!(
            "Mechanization finished: {} increments, {} states",
            self.index,
            trajectory.len()
        );
        Ok(trajectory)
    }
    fn close_fine(&mut self) {
        let fine = std::mem::take(&mut self.accumulator).finish(self.config.sample_rate_hz);
        let compensated = self.compensation.compensate(fine);
        self.fine.push(compensated);
    }
    fn coarse_update(&mut self) -> NavigationState {
        let next = mechanize(&self.state, &self.fine, &self.config.earth);
        self.fine.clear();
        trace!("{next}");
        self.state = next;
        next
    }
}

/// Run the mechanization from `initial_state` over every increment of `source`.
///
/// # Example
/// ```rust
/// use bins::NavigationState;
/// use bins::messages::ImuEmulator;
/// use bins::sim::{MechanizationConfig, dead_reckoning};
/// use nalgebra::Vector3;
///
/// let config = MechanizationConfig::default();
/// let initial = NavigationState::aligned(0.0, 0.9, 0.0, Vector3::zeros(), 0.5, 0.0, 0.0);
/// let source = ImuEmulator::stationary(&initial, &config.earth, config.sample_rate_hz, 1.0).unwrap();
/// let trajectory = dead_reckoning(&config, initial, source).unwrap();
/// assert_eq!(trajectory.len(), 50);
/// ```
pub fn dead_reckoning<I>(
    config: &MechanizationConfig,
    initial_state: NavigationState,
    source: I,
) -> Result<Trajectory, NavigationError>
where
    I: IntoIterator<Item = Increment>,
{
    Navigator::new(*config, initial_state)?.run(source)
}

/// One row of a trajectory table. Angles in radians, velocity in m/s.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryRecord {
    pub t: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub velocity_x_ref: f64,
    pub velocity_y_ref: f64,
    pub velocity_z_ref: f64,
    pub heading: f64,
    pub pitch: f64,
    pub roll: f64,
}
impl From<&NavigationState> for TrajectoryRecord {
    fn from(state: &NavigationState) -> Self {
        TrajectoryRecord {
            t: state.t,
            latitude: state.latitude,
            longitude: state.longitude,
            velocity_x_ref: state.velocity[0],
            velocity_y_ref: state.velocity[1],
            velocity_z_ref: state.velocity[2],
            heading: state.heading,
            pitch: state.pitch,
            roll: state.roll,
        }
    }
}
impl From<&TrajectoryRecord> for NavigationState {
    /// Aligned state rebuilt from a table row; the inertial anchors are not stored in the table.
    fn from(record: &TrajectoryRecord) -> Self {
        NavigationState::aligned(
            record.t,
            record.latitude,
            record.longitude,
            nalgebra::Vector3::new(
                record.velocity_x_ref,
                record.velocity_y_ref,
                record.velocity_z_ref,
            ),
            record.heading,
            record.pitch,
            record.roll,
        )
    }
}

/// Sequence of navigation states produced by the mechanization, oldest first.
#[derive(Clone, Debug, Default)]
pub struct Trajectory {
    pub states: Vec<NavigationState>,
}
impl Trajectory {
    pub fn new() -> Trajectory {
        Trajectory::default()
    }
    pub fn with_capacity(capacity: usize) -> Trajectory {
        Trajectory {
            states: Vec::with_capacity(capacity),
        }
    }
    pub fn len(&self) -> usize {
        self.states.len()
    }
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
    pub fn last(&self) -> Option<&NavigationState> {
        self.states.last()
    }
    /// Writes the trajectory to a CSV file.
    ///
    /// Columns are `t, latitude, longitude, velocity_x_ref, velocity_y_ref, velocity_z_ref,
    /// heading, pitch, roll`. Values are written in full (shortest round-trip) precision.
    ///
    /// # Arguments
    /// * `path` - Path where the CSV file will be saved
    ///
    /// # Returns
    /// * `io::Result<()>` - Ok if successful, Err otherwise
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for state in &self.states {
            writer.serialize(TrajectoryRecord::from(state))?;
        }
        writer.flush()?;
        Ok(())
    }
    /// Reads a trajectory previously written with [`Trajectory::to_csv`].
    ///
    /// The direction cosine matrices are rebuilt from the Euler angles as aligned states.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Trajectory, NavigationError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)?;
        let mut trajectory = Trajectory::new();
        for result in reader.deserialize() {
            let record: TrajectoryRecord = result?;
            trajectory.states.push(NavigationState::from(&record));
        }
        Ok(trajectory)
    }
}

/// Starting position, velocity and attitude. Angles in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct InitialConditions {
    /// Start time in seconds
    #[serde(default)]
    pub t: f64,
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub heading_deg: f64,
    pub pitch_deg: f64,
    pub roll_deg: f64,
    /// East, north, up velocity in m/s
    #[serde(default)]
    pub velocity: [f64; 3],
}
impl InitialConditions {
    /// Aligned navigation state for these conditions
    pub fn to_state(&self) -> NavigationState {
        NavigationState::aligned(
            self.t,
            self.latitude_deg.to_radians(),
            self.longitude_deg.to_radians(),
            nalgebra::Vector3::from(self.velocity),
            self.heading_deg.to_radians(),
            self.pitch_deg.to_radians(),
            self.roll_deg.to_radians(),
        )
    }
    fn validate(&self) -> Result<(), NavigationError> {
        let values = [
            self.t,
            self.latitude_deg,
            self.longitude_deg,
            self.heading_deg,
            self.pitch_deg,
            self.roll_deg,
        ];
        if values.iter().chain(self.velocity.iter()).any(|v| !v.is_finite()) {
            return Err(NavigationError::InvalidConfig(
                "initial conditions must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_delimiter() -> char {
    ' '
}

/// Where the sensor increments come from
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceConfig {
    /// Stationary IMU emulated at the initial position and attitude
    #[default]
    Emulator,
    /// Recorded sensor log
    Log {
        path: String,
        #[serde(default = "default_delimiter")]
        delimiter: char,
    },
}

fn default_duration() -> f64 {
    5400.0
}

/// A complete, file-configurable navigation run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Emulated duration in seconds (ignored for recorded logs)
    #[serde(default = "default_duration")]
    pub duration_s: f64,
    /// Trajectory CSV output path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Log level used by the binary when none is given on the command line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    #[serde(default)]
    pub mechanization: MechanizationConfig,
    pub initial: InitialConditions,
    #[serde(default)]
    pub source: SourceConfig,
    /// Known sensor errors to remove before the coarse updates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensation: Option<FixedCompensation>,
}
impl Default for SimulationConfig {
    /// Stationary alignment scenario: 56 deg N, heading 45 deg, roll 5 deg, 90 minutes at 800 Hz
    fn default() -> Self {
        SimulationConfig {
            duration_s: default_duration(),
            output: None,
            log_level: None,
            mechanization: MechanizationConfig::default(),
            initial: InitialConditions {
                t: 0.0,
                latitude_deg: 56.0,
                longitude_deg: 0.0,
                heading_deg: 45.0,
                pitch_deg: 0.0,
                roll_deg: 5.0,
                velocity: [0.0; 3],
            },
            source: SourceConfig::Emulator,
            compensation: None,
        }
    }
}
impl SimulationConfig {
    pub fn validate(&self) -> Result<(), NavigationError> {
        self.mechanization.validate()?;
        self.initial.validate()?;
        if !(self.duration_s.is_finite() && self.duration_s >= 0.0) {
            return Err(NavigationError::InvalidConfig(format!(
                "duration must be non-negative and finite, got {} s",
                self.duration_s
            )));
        }
        if let SourceConfig::Log { delimiter, .. } = &self.source {
            if !delimiter.is_ascii() {
                return Err(NavigationError::InvalidConfig(format!(
                    "log delimiter must be a single ASCII character, got {delimiter:?}"
                )));
            }
        }
        Ok(())
    }
    /// Build the source and run the mechanization.
    pub fn run(&self) -> Result<Trajectory, NavigationError> {
        self.validate()?;
        let initial_state = self.initial.to_state();
        let mut navigator = Navigator::new(self.mechanization, initial_state)?;
        if let Some(compensation) = self.compensation {
            navigator = navigator.with_compensation(Box::new(compensation));
        }
        match &self.source {
            SourceConfig::Emulator => {
                let emulator = ImuEmulator::stationary(
                    &initial_state,
                    &self.mechanization.earth,
                    self.mechanization.sample_rate_hz,
                    self.duration_s,
                )?;
                navigator.run(emulator)
            }
            SourceConfig::Log { path, delimiter } => {
                let increments = read_imu_log(path, *delimiter as u8)?;
                navigator.run(increments)
            }
        }
    }
    /// Write the configuration, choosing JSON (pretty-printed), YAML or TOML from the file
    /// extension (`.json`, `.yaml`/`.yml`, `.toml`).
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let path = path.as_ref();
        let text = match ConfigFormat::from_path(path)? {
            ConfigFormat::Json => serde_json::to_string_pretty(self).map_err(io::Error::other)?,
            ConfigFormat::Yaml => serde_yaml::to_string(self).map_err(io::Error::other)?,
            ConfigFormat::Toml => toml::to_string(self).map_err(io::Error::other)?,
        };
        fs::write(path, text)
    }
    /// Read a configuration file written by [SimulationConfig::to_file] or by hand.
    pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;
        let text = fs::read_to_string(path)?;
        match format {
            ConfigFormat::Json => serde_json::from_str(&text).map_err(io::Error::other),
            ConfigFormat::Yaml => serde_yaml::from_str(&text).map_err(io::Error::other),
            ConfigFormat::Toml => toml::from_str(&text).map_err(io::Error::other),
        }
    }
}

/// Configuration file formats, keyed by extension
#[derive(Clone, Copy, Debug, PartialEq)]
enum ConfigFormat {
    Json,
    Yaml,
    Toml,
}
impl ConfigFormat {
    fn from_path(path: &Path) -> io::Result<ConfigFormat> {
        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("json") => Ok(ConfigFormat::Json),
            Some("yaml" | "yml") => Ok(ConfigFormat::Yaml),
            Some("toml") => Ok(ConfigFormat::Toml),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unsupported configuration file: {}", path.display()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use nalgebra::Vector3;
    use tempfile::tempdir;

    fn still_earth() -> EarthModel {
        EarthModel::new(0.0, crate::earth::GRAVITY, crate::earth::MEAN_RADIUS)
    }
    fn level_start() -> NavigationState {
        NavigationState::aligned(0.0, 0.8, 0.1, Vector3::zeros(), 0.3, 0.0, 0.0)
    }
    fn gravity_samples(count: usize, sample_rate: f64) -> Vec<Increment> {
        let f = Vector3::new(0.0, 0.0, crate::earth::GRAVITY);
        (1..=count)
            .map(|k| Increment::from_rates(k as f64 / sample_rate, &f, &Vector3::zeros(), 1.0 / sample_rate))
            .collect()
    }

    #[test]
    fn test_config_periods() {
        let config = MechanizationConfig::default();
        assert_eq!(config.sample_rate_hz, 800.0);
        assert_eq!(config.decimation, 4);
        assert_eq!(config.trailing, TrailingPolicy::Discard);
        assert_approx_eq!(config.fine_period(), 0.005, 1e-15);
        assert_approx_eq!(config.coarse_period(), 0.02, 1e-15);
    }
    #[test]
    fn test_config_validation() {
        assert!(MechanizationConfig::default().validate().is_ok());
        let zero_rate = MechanizationConfig {
            sample_rate_hz: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            zero_rate.validate(),
            Err(NavigationError::InvalidConfig(_))
        ));
        let zero_decimation = MechanizationConfig {
            decimation: 0,
            ..Default::default()
        };
        assert!(zero_decimation.validate().is_err());
        assert!(Navigator::new(zero_decimation, level_start()).is_err());
        let bad_earth = MechanizationConfig {
            earth: EarthModel::new(0.0, 9.8, -1.0),
            ..Default::default()
        };
        assert!(bad_earth.validate().is_err());
        let mut simulation = SimulationConfig::default();
        simulation.duration_s = -1.0;
        assert!(simulation.validate().is_err());
        simulation.duration_s = 1.0;
        simulation.initial.latitude_deg = f64::NAN;
        assert!(simulation.validate().is_err());
    }
    /// One state per decimation * 4 increments, stamped with the last increment time
    #[test]
    fn test_step_cadence() {
        let config = MechanizationConfig {
            earth: still_earth(),
            ..Default::default()
        };
        let mut navigator = Navigator::new(config, level_start()).unwrap();
        let samples = gravity_samples(48, 800.0);
        let mut produced = Vec::new();
        for (k, increment) in samples.into_iter().enumerate() {
            if let Some(state) = navigator.step(increment).unwrap() {
                produced.push((k, state));
            }
        }
        assert_eq!(produced.len(), 3);
        for (n, (k, state)) in produced.iter().enumerate() {
            assert_eq!(*k, 16 * n + 15);
            assert_eq!(state.t, (*k + 1) as f64 / 800.0);
        }
        assert_eq!(navigator.pending_samples(), 0);
        assert_eq!(navigator.state().t, 48.0 / 800.0);
    }
    #[test]
    fn test_step_rejects_time_going_backwards() {
        let mut navigator = Navigator::new(MechanizationConfig::default(), level_start()).unwrap();
        let mut samples = gravity_samples(3, 800.0);
        samples[2].t = samples[1].t;
        navigator.step(samples[0]).unwrap();
        navigator.step(samples[1]).unwrap();
        match navigator.step(samples[2]) {
            Err(NavigationError::NonMonotonicTime { index, .. }) => assert_eq!(index, 2),
            other => panic!("expected a timestamp error, got {other:?}"),
        }
        // The rejected sample was not accumulated
        assert_eq!(navigator.pending_samples(), 2);
        let nan = Increment::new(f64::NAN, Vector3::zeros(), Vector3::zeros());
        assert!(navigator.step(nan).is_err());
    }
    #[test]
    fn test_run_aborts_on_bad_time() {
        let mut samples = gravity_samples(40, 800.0);
        samples[20].t = 0.0;
        let result = dead_reckoning(&MechanizationConfig::default(), level_start(), samples);
        assert!(matches!(
            result,
            Err(NavigationError::NonMonotonicTime { index: 20, .. })
        ));
    }
    #[test]
    fn test_trailing_discard() {
        let config = MechanizationConfig {
            earth: still_earth(),
            ..Default::default()
        };
        let trajectory = dead_reckoning(&config, level_start(), gravity_samples(16 + 7, 800.0)).unwrap();
        assert_eq!(trajectory.len(), 1);
        assert_eq!(trajectory.states[0].t, 16.0 / 800.0);
    }
    #[test]
    fn test_trailing_flush() {
        let config = MechanizationConfig {
            earth: still_earth(),
            trailing: TrailingPolicy::Flush,
            ..Default::default()
        };
        let start = level_start();
        let trajectory = dead_reckoning(&config, start, gravity_samples(16 + 7, 800.0)).unwrap();
        assert_eq!(trajectory.len(), 2);
        let last = trajectory.last().unwrap();
        assert_eq!(last.t, 23.0 / 800.0);
        assert!(last.velocity.norm() < 1e-12);
        assert_approx_eq!(last.heading, start.heading, 1e-12);
        assert_approx_eq!(last.latitude, start.latitude, 1e-15);
        // Nothing to flush on an exact multiple
        let exact = dead_reckoning(&config, start, gravity_samples(32, 800.0)).unwrap();
        assert_eq!(exact.len(), 2);
    }
    #[test]
    fn test_flush_uses_partial_step() {
        // A level body accelerating north: velocity gain equals f * elapsed time
        let config = MechanizationConfig {
            earth: still_earth(),
            trailing: TrailingPolicy::Flush,
            ..Default::default()
        };
        let start = NavigationState::aligned(0.0, 0.8, 0.0, Vector3::zeros(), 0.0, 0.0, 0.0);
        let f = Vector3::new(0.0, 0.5, crate::earth::GRAVITY);
        let samples: Vec<Increment> = (1..=22)
            .map(|k| Increment::from_rates(k as f64 / 800.0, &f, &Vector3::zeros(), 1.0 / 800.0))
            .collect();
        let trajectory = dead_reckoning(&config, start, samples).unwrap();
        assert_eq!(trajectory.len(), 2);
        assert_approx_eq!(trajectory.states[0].velocity[1], 0.5 * 16.0 / 800.0, 1e-12);
        assert_approx_eq!(trajectory.states[1].velocity[1], 0.5 * 22.0 / 800.0, 1e-12);
    }
    #[test]
    fn test_compensation_removes_bias() {
        let config = MechanizationConfig {
            earth: still_earth(),
            ..Default::default()
        };
        let bias = [0.0, 0.02, 0.0];
        let f = Vector3::new(bias[0], bias[1], crate::earth::GRAVITY + bias[2]);
        let samples: Vec<Increment> = (1..=160)
            .map(|k| Increment::from_rates(k as f64 / 800.0, &f, &Vector3::zeros(), 1.0 / 800.0))
            .collect();
        let start = NavigationState::aligned(0.0, 0.8, 0.0, Vector3::zeros(), 0.0, 0.0, 0.0);
        let raw = dead_reckoning(&config, start, samples.clone()).unwrap();
        assert!(raw.last().unwrap().velocity[1] > 1e-3);
        let compensation = FixedCompensation {
            accel_bias: bias,
            ..Default::default()
        };
        let corrected = Navigator::new(config, start)
            .unwrap()
            .with_compensation(Box::new(compensation))
            .run(samples)
            .unwrap();
        assert_eq!(corrected.len(), 10);
        assert!(corrected.last().unwrap().velocity.norm() < 1e-12);
    }
    #[test]
    fn test_trajectory_csv_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trajectory.csv");
        let trajectory = Trajectory {
            states: (0..3)
                .map(|i| {
                    NavigationState::aligned(
                        0.02 * (i + 1) as f64,
                        0.977384381116824 + 1e-9 * i as f64,
                        1.0 / 3.0,
                        Vector3::new(1e-7 * i as f64, -2.5e-3, 0.0),
                        std::f64::consts::FRAC_PI_4,
                        1e-6,
                        0.087266462599716,
                    )
                })
                .collect(),
        };
        trajectory.to_csv(&path).unwrap();
        let header = std::fs::read_to_string(&path).unwrap();
        assert!(header.starts_with(
            "t,latitude,longitude,velocity_x_ref,velocity_y_ref,velocity_z_ref,heading,pitch,roll"
        ));
        let read = Trajectory::from_csv(&path).unwrap();
        assert_eq!(read.len(), 3);
        for (a, b) in trajectory.states.iter().zip(read.states.iter()) {
            let row_a: Vec<f64> = a.into();
            let row_b: Vec<f64> = b.into();
            assert_eq!(row_a, row_b);
        }
    }
    #[test]
    fn test_trajectory_from_missing_file() {
        assert!(Trajectory::from_csv("/nonexistent/trajectory.csv").is_err());
    }
    #[test]
    fn test_simulation_config_file_formats() {
        let dir = tempdir().unwrap();
        let config = SimulationConfig {
            duration_s: 12.5,
            output: Some("out.csv".to_string()),
            log_level: Some("debug".to_string()),
            mechanization: MechanizationConfig {
                sample_rate_hz: 400.0,
                decimation: 2,
                trailing: TrailingPolicy::Flush,
                earth: EarthModel::default(),
            },
            initial: InitialConditions {
                t: 0.0,
                latitude_deg: 56.0,
                longitude_deg: -3.25,
                heading_deg: 45.0,
                pitch_deg: 0.0,
                roll_deg: 5.0,
                velocity: [0.0, 1.5, 0.0],
            },
            source: SourceConfig::Log {
                path: "imu.txt".to_string(),
                delimiter: ' ',
            },
            compensation: Some(FixedCompensation {
                accel_bias: [0.01, 0.0, -0.02],
                ..Default::default()
            }),
        };
        for name in ["config.json", "config.yaml", "config.yml", "config.toml"] {
            let path = dir.path().join(name);
            config.to_file(&path).unwrap();
            let read = SimulationConfig::from_file(&path).unwrap();
            assert_eq!(read, config, "round trip through {name}");
        }
        let default = SimulationConfig::default();
        let path = dir.path().join("default.toml");
        default.to_file(&path).unwrap();
        assert_eq!(SimulationConfig::from_file(&path).unwrap(), default);
        assert!(config.to_file(dir.path().join("config.txt")).is_err());
        assert!(SimulationConfig::from_file(dir.path().join("config.ini")).is_err());
        assert!(!dir.path().join("config.txt").exists());
    }
    #[test]
    fn test_config_format_from_extension() {
        assert_eq!(
            ConfigFormat::from_path(Path::new("a/scenario.JSON")).unwrap(),
            ConfigFormat::Json
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("scenario.Yml")).unwrap(),
            ConfigFormat::Yaml
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("scenario.toml")).unwrap(),
            ConfigFormat::Toml
        );
        let err = ConfigFormat::from_path(Path::new("scenario")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
    #[test]
    fn test_simulation_config_minimal_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("minimal.yaml");
        std::fs::write(
            &path,
            "initial:\n  latitude_deg: 10.0\n  longitude_deg: 20.0\n  heading_deg: 0.0\n  pitch_deg: 0.0\n  roll_deg: 0.0\n",
        )
        .unwrap();
        let config = SimulationConfig::from_file(&path).unwrap();
        assert_eq!(config.duration_s, 5400.0);
        assert_eq!(config.mechanization, MechanizationConfig::default());
        assert_eq!(config.source, SourceConfig::Emulator);
        assert!(config.compensation.is_none());
        // Initial conditions have no defaults
        std::fs::write(&path, "duration_s: 1.0\n").unwrap();
        assert!(SimulationConfig::from_file(&path).is_err());
    }
    #[test]
    fn test_simulation_config_run() {
        let config = SimulationConfig {
            duration_s: 2.0,
            ..Default::default()
        };
        let trajectory = config.run().unwrap();
        assert_eq!(trajectory.len(), 100);
        assert_approx_eq!(trajectory.last().unwrap().t, 2.0, 1e-12);
    }
}
