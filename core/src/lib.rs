//! Multi-rate strapdown inertial navigation mechanization
//!
//! This crate turns a stream of inertial sensor increments (delta-velocity and delta-angle
//! samples from an accelerometer and gyroscope triad) into a trajectory of geodetic position,
//! reference frame velocity and attitude. It is an unaided strapdown inertial navigation system
//! (BINS): there is no filtering and no external aiding, only the forward mechanization.
//!
//! The mechanization runs at two rates:
//! - **fine** rate: every `N` sensor samples (the decimation factor, 4 by default) the samples are
//!   summed into a fine increment, and optional error compensation stages are applied to it.
//! - **coarse** rate: every 4 fine increments the attitude, velocity and position are updated.
//!
//! This crate is built on:
//! - [`nalgebra`](https://crates.io/crates/nalgebra): vectors, direction cosine matrices and the SVD.
//! - [`serde`](https://crates.io/crates/serde) and [`csv`](https://crates.io/crates/csv): recorded
//!   sensor logs, trajectory tables and configuration files.
//! - [`log`](https://crates.io/crates/log): diagnostics, routed by the binary through `env_logger`.
//!
//! ## Crate overview
//!
//! - [earth]: the Earth model (rotation rate, gravity, radius) and the Earth/transport rates.
//! - [linalg]: rotation math (Euler angles, skew-symmetric matrices, rotation vectors, SVD orthonormalization).
//! - [integration]: fine-rate accumulation of increments and the error compensation stages.
//! - [messages]: increment sources, the closed-form IMU emulator and the recorded log reader.
//! - [sim]: the mechanization loop ([sim::Navigator]), configuration and the trajectory table.
//!
//! This top-level module holds the data types ([Increment], [NavigationState]) and one public
//! function per coarse mechanization step, chained together by [mechanize].
//!
//! ## Coordinate and state definitions
//!
//! The reference (navigation) frame is the local-level East-North-Up frame. The body frame has
//! x to the right, y forward and z up. Heading is measured clockwise from north. The vertical
//! channel is not mechanized: the vertical velocity is forced to zero after every update
//! (planar navigation) and there is no altitude state.
//!
//! Three direction cosine matrices are carried:
//! - $C_i^b$ inertial to body, propagated with the gyro rotation vector,
//! - $C_i^n$ inertial to reference, propagated with the Earth and transport rates,
//! - $C_b^n = C_i^n (C_i^b)^T$, recombined and re-orthonormalized at every coarse update.
//!
//! Euler angles are only ever derived from $C_b^n$, never integrated.
//!
//! ## Coarse mechanization equations
//!
//! With $h$ the fine step and $H = 4h$ the coarse step:
//!
//! 1. Specific force integral in the body frame, classic RK4 over each fine sub-interval with
//!    $\dot{\Delta v} = a - [w \times] \Delta v$, where $a = \Delta v_k / h$ and $w = \Delta\theta_k / h$.
//! 2. Rotation into the reference frame: $\Delta v^n = C_b^n(-) \Delta v^b$.
//! 3. Rotation vector with two-sample coning correction:
//!
//! $$
//! \vec\theta = \sum_{k=1}^{4} \Delta\theta_k + \frac{2}{3} (\Delta\theta_1 + \Delta\theta_2) \times (\Delta\theta_3 + \Delta\theta_4)
//! $$
//!
//! 4. $C_i^b(+) = C(\vec\theta) C_i^b(-)$, with $C(\vec\theta)$ from [linalg::rotation_vector_to_dcm].
//! 5. $C_i^n(+) = (I - H\Omega + \frac{H^2}{2}\Omega^2) C_i^n(-)$, $\Omega = [\omega_{in}^n \times]$.
//! 6. $C_b^n(+) = \operatorname{orth}(C_i^n(+) C_i^b(+)^T)$.
//! 7. Velocity update with Coriolis and gravity, then $v_z = 0$:
//!
//! $$
//! \begin{aligned}
//! v_x(+) &= v_x + \Delta v^n_x + H((\omega_{e,z} + \omega_z) v_y - (\omega_{e,y} + \omega_y) v_z) \\\\
//! v_y(+) &= v_y + \Delta v^n_y + H(-(\omega_{e,z} + \omega_z) v_x + \omega_x v_z) \\\\
//! v_z(+) &= v_z + \Delta v^n_z + H((\omega_{e,y} + \omega_y) v_x - \omega_x v_y - g)
//! \end{aligned}
//! $$
//!
//! 8. Position: $\varphi(+) = \varphi + H v_y(+)/R$, $\lambda(+) = \lambda + H v_x(+) / (R \cos\varphi)$.
//!
//! The latitude terms ($\tan\varphi$, $1/\cos\varphi$) are singular at the poles; polar latitudes
//! are outside the domain of this mechanization and are not guarded.
pub mod earth;
pub mod integration;
pub mod linalg;
pub mod messages;
pub mod sim;

use nalgebra::{Matrix3, Vector3};
use thiserror::Error;

use std::fmt::{self, Debug, Display};

use crate::earth::EarthModel;
use crate::integration::FineIncrement;

/// Errors surfaced by the mechanization and its data sources
#[derive(Debug, Error)]
pub enum NavigationError {
    /// Increment timestamps must be finite and strictly increasing
    #[error("increment {index} has time {current} s which does not follow {previous} s")]
    NonMonotonicTime {
        /// Zero-based position of the offending increment in the stream
        index: usize,
        /// Time of the preceding increment, negative infinity for the first one
        previous: f64,
        /// Time of the offending increment
        current: f64,
    },
    /// Configuration values outside of their valid domain
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

/// One timestamped inertial sensor sample.
///
/// The vectors are body frame increments accumulated over one sensor period, not
/// instantaneous rates: `delta_velocity` is the integral of specific force (m/s) and
/// `delta_angle` the integral of angular rate (rad).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Increment {
    /// Time of the end of the sample period in seconds
    pub t: f64,
    /// Specific force integral in m/s, body frame x, y, z axis
    pub delta_velocity: Vector3<f64>,
    /// Angular rate integral in rad, body frame x, y, z axis
    pub delta_angle: Vector3<f64>,
}
impl Display for Increment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Increment {{ t: {:.6} s, dv: [{:.6e}, {:.6e}, {:.6e}], dθ: [{:.6e}, {:.6e}, {:.6e}] }}",
            self.t,
            self.delta_velocity[0],
            self.delta_velocity[1],
            self.delta_velocity[2],
            self.delta_angle[0],
            self.delta_angle[1],
            self.delta_angle[2]
        )
    }
}
impl Increment {
    /// Create a new increment from delta-velocity and delta-angle vectors
    ///
    /// # Example
    /// ```rust
    /// use bins::Increment;
    /// use nalgebra::Vector3;
    /// let increment = Increment::new(
    ///     0.00125,
    ///     Vector3::new(0.0, 0.0, 9.8067 / 800.0), // one 800 Hz sample of a level accelerometer
    ///     Vector3::zeros(),
    /// );
    /// assert_eq!(increment.t, 0.00125);
    /// ```
    pub fn new(t: f64, delta_velocity: Vector3<f64>, delta_angle: Vector3<f64>) -> Increment {
        Increment {
            t,
            delta_velocity,
            delta_angle,
        }
    }
    /// Create an increment from constant rates held over `dt` seconds
    pub fn from_rates(
        t: f64,
        specific_force: &Vector3<f64>,
        angular_rate: &Vector3<f64>,
        dt: f64,
    ) -> Increment {
        Increment {
            t,
            delta_velocity: specific_force * dt,
            delta_angle: angular_rate * dt,
        }
    }
}

/// Full kinematic and attitude state at one coarse epoch.
///
/// Latitude and longitude are radians and are never wrapped. The velocity is expressed in the
/// East-North-Up reference frame. The Euler angles are derived from `c_body_to_ref` when the
/// state is built and are kept only as a readable projection of it.
#[derive(Clone, Copy, PartialEq)]
pub struct NavigationState {
    /// Time in seconds
    pub t: f64,
    /// Latitude in radians
    pub latitude: f64,
    /// Longitude in radians
    pub longitude: f64,
    /// Reference frame velocity in m/s (x east, y north, z up)
    pub velocity: Vector3<f64>,
    /// Heading in radians, clockwise from north
    pub heading: f64,
    /// Pitch in radians
    pub pitch: f64,
    /// Roll in radians
    pub roll: f64,
    /// Body to reference frame direction cosine matrix
    pub c_body_to_ref: Matrix3<f64>,
    /// Inertial to body frame direction cosine matrix
    pub c_inertial_to_body: Matrix3<f64>,
    /// Inertial to reference frame direction cosine matrix
    pub c_inertial_to_ref: Matrix3<f64>,
}
impl Debug for NavigationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NavigationState")
            .field("t (s)", &self.t)
            .field("latitude (deg)", &self.latitude.to_degrees())
            .field("longitude (deg)", &self.longitude.to_degrees())
            .field(
                "velocity (m/s)",
                &format_args!(
                    "[{:.6}, {:.6}, {:.6}]",
                    self.velocity[0], self.velocity[1], self.velocity[2]
                ),
            )
            .field(
                "attitude (heading, pitch, roll in deg)",
                &format_args!(
                    "[{:.6}, {:.6}, {:.6}]",
                    self.heading.to_degrees(),
                    self.pitch.to_degrees(),
                    self.roll.to_degrees()
                ),
            )
            .finish()
    }
}
impl Display for NavigationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "NavigationState {{ t: {:.3} s, lat: {:.8} deg, lon: {:.8} deg, v_x: {:.4} m/s, v_y: {:.4} m/s, v_z: {:.4} m/s, attitude: [{:.4} deg, {:.4} deg, {:.4} deg] }}",
            self.t,
            self.latitude.to_degrees(),
            self.longitude.to_degrees(),
            self.velocity[0],
            self.velocity[1],
            self.velocity[2],
            self.heading.to_degrees(),
            self.pitch.to_degrees(),
            self.roll.to_degrees()
        )
    }
}
impl NavigationState {
    /// Create a state from explicit direction cosine matrices.
    ///
    /// The Euler angles are derived from `c_body_to_ref`.
    ///
    /// # Arguments
    /// * `t` - time in seconds
    /// * `latitude` - latitude in radians
    /// * `longitude` - longitude in radians
    /// * `velocity` - East-North-Up velocity in m/s
    /// * `c_body_to_ref` - body to reference frame DCM
    /// * `c_inertial_to_body` - inertial to body frame DCM
    /// * `c_inertial_to_ref` - inertial to reference frame DCM
    pub fn new(
        t: f64,
        latitude: f64,
        longitude: f64,
        velocity: Vector3<f64>,
        c_body_to_ref: Matrix3<f64>,
        c_inertial_to_body: Matrix3<f64>,
        c_inertial_to_ref: Matrix3<f64>,
    ) -> NavigationState {
        let (heading, pitch, roll) = linalg::euler_from_dcm(&c_body_to_ref);
        NavigationState {
            t,
            latitude,
            longitude,
            velocity,
            heading,
            pitch,
            roll,
            c_body_to_ref,
            c_inertial_to_body,
            c_inertial_to_ref,
        }
    }
    /// Create an aligned starting state from Euler angles.
    ///
    /// The inertial frame is anchored to the reference frame at the starting epoch:
    /// $C_b^n = C(H, P, R)$, $C_i^b = (C_b^n)^T$, $C_i^n = I$. The Euler angles are stored
    /// as given.
    ///
    /// # Arguments
    /// * `t` - time in seconds
    /// * `latitude` - latitude in radians
    /// * `longitude` - longitude in radians
    /// * `velocity` - East-North-Up velocity in m/s
    /// * `heading`, `pitch`, `roll` - attitude in radians
    ///
    /// # Example
    /// ```rust
    /// use bins::NavigationState;
    /// use nalgebra::Vector3;
    /// let state = NavigationState::aligned(
    ///     0.0,
    ///     56.0_f64.to_radians(),
    ///     0.0,
    ///     Vector3::zeros(),
    ///     45.0_f64.to_radians(),
    ///     0.0,
    ///     5.0_f64.to_radians(),
    /// );
    /// assert_eq!(state.c_inertial_to_body, state.c_body_to_ref.transpose());
    /// ```
    pub fn aligned(
        t: f64,
        latitude: f64,
        longitude: f64,
        velocity: Vector3<f64>,
        heading: f64,
        pitch: f64,
        roll: f64,
    ) -> NavigationState {
        let c_body_to_ref = linalg::body_to_ref_from_euler(heading, pitch, roll);
        NavigationState {
            t,
            latitude,
            longitude,
            velocity,
            heading,
            pitch,
            roll,
            c_body_to_ref,
            c_inertial_to_body: c_body_to_ref.transpose(),
            c_inertial_to_ref: Matrix3::identity(),
        }
    }
    /// Largest orthonormality error over the three direction cosine matrices
    pub fn attitude_error(&self) -> f64 {
        linalg::orthonormality_error(&self.c_body_to_ref)
            .max(linalg::orthonormality_error(&self.c_inertial_to_body))
            .max(linalg::orthonormality_error(&self.c_inertial_to_ref))
    }
}
impl From<&NavigationState> for Vec<f64> {
    /// Converts a state to a row `[t, lat, lon, v_x, v_y, v_z, heading, pitch, roll]`, radians.
    fn from(state: &NavigationState) -> Self {
        vec![
            state.t,
            state.latitude,
            state.longitude,
            state.velocity[0],
            state.velocity[1],
            state.velocity[2],
            state.heading,
            state.pitch,
            state.roll,
        ]
    }
}
impl From<NavigationState> for Vec<f64> {
    fn from(state: NavigationState) -> Self {
        (&state).into()
    }
}
impl TryFrom<&[f64]> for NavigationState {
    type Error = &'static str;
    /// Rebuilds an aligned state from a row `[t, lat, lon, v_x, v_y, v_z, heading, pitch, roll]`.
    ///
    /// The inertial anchors are not part of the row, so the result uses $C_i^n = I$.
    fn try_from(slice: &[f64]) -> Result<Self, Self::Error> {
        if slice.len() != 9 {
            return Err("Slice must have length 9 for NavigationState");
        }
        Ok(NavigationState::aligned(
            slice[0],
            slice[1],
            slice[2],
            Vector3::new(slice[3], slice[4], slice[5]),
            slice[6],
            slice[7],
            slice[8],
        ))
    }
}

// ============= Coarse mechanization steps ====================================================

/// Integrate the body frame specific force over the coarse interval.
///
/// Each fine increment is integrated with one classic fourth-order Runge-Kutta step of size
/// $h$ (the fine increment duration) on
///
/// $$
/// \dot{\Delta v} = a - [w \times] \Delta v, \quad a = \Delta v_k / h, \quad w = \Delta\theta_k / h
/// $$
///
/// starting from $\Delta v = 0$. Sub-steps are strictly sequential.
///
/// # Returns
/// The specific force integral in m/s, body frame.
pub fn integrate_specific_force(fine: &[FineIncrement]) -> Vector3<f64> {
    let mut delta_velocity: Vector3<f64> = Vector3::zeros();
    for increment in fine.iter().filter(|increment| increment.dt > 0.0) {
        let h = increment.dt;
        let acceleration = increment.delta_velocity / h;
        let rate = linalg::vector_to_skew_symmetric(&(increment.delta_angle / h));
        let derivative = |dv: &Vector3<f64>| acceleration - rate * dv;
        let k1 = derivative(&delta_velocity);
        let k2 = derivative(&(delta_velocity + k1 * (h / 2.0)));
        let k3 = derivative(&(delta_velocity + k2 * (h / 2.0)));
        let k4 = derivative(&(delta_velocity + k3 * h));
        delta_velocity += (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (h / 6.0);
    }
    delta_velocity
}
/// Euler rotation vector of the body over the coarse interval.
///
/// With exactly four fine increments of equal length the two-sample coning correction is
/// applied:
///
/// $$
/// \vec\theta = \sum_k \Delta\theta_k + \frac{2}{3} (\Delta\theta_1 + \Delta\theta_2) \times (\Delta\theta_3 + \Delta\theta_4)
/// $$
///
/// Anything else (only produced when a partial coarse interval is flushed) falls back to the
/// plain sum, which ignores the non-commutativity of the rotations.
pub fn rotation_vector(fine: &[FineIncrement]) -> Vector3<f64> {
    let sum: Vector3<f64> = fine.iter().map(|increment| increment.delta_angle).sum();
    match fine {
        [first, second, third, fourth]
            if fine.iter().all(|increment| increment.samples == first.samples) =>
        {
            let early = first.delta_angle + second.delta_angle;
            let late = third.delta_angle + fourth.delta_angle;
            sum + early.cross(&late) * (2.0 / 3.0)
        }
        _ => sum,
    }
}
/// Propagate the inertial to body DCM with the body rotation vector: $C_i^b(+) = C(\vec\theta) C_i^b(-)$
pub fn body_attitude_update(
    c_inertial_to_body: &Matrix3<f64>,
    rotation_vector: &Vector3<f64>,
) -> Matrix3<f64> {
    linalg::rotation_vector_to_dcm(rotation_vector) * c_inertial_to_body
}
/// Propagate the inertial to reference DCM with the absolute reference frame rate over `dt`
pub fn reference_attitude_update(
    c_inertial_to_ref: &Matrix3<f64>,
    angular_rate_ref: &Vector3<f64>,
    dt: f64,
) -> Matrix3<f64> {
    linalg::small_angle_dcm(angular_rate_ref, dt) * c_inertial_to_ref
}
/// Recombine the body to reference DCM, $C_b^n = \operatorname{orth}(C_i^n (C_i^b)^T)$
pub fn body_to_ref(
    c_inertial_to_ref: &Matrix3<f64>,
    c_inertial_to_body: &Matrix3<f64>,
) -> Matrix3<f64> {
    linalg::orthonormalize(&(c_inertial_to_ref * c_inertial_to_body.transpose()))
}
/// Reference frame velocity update.
///
/// Uses the previous velocity and latitude, the specific force integral already rotated into
/// the reference frame and the absolute reference frame rate. The vertical component is
/// forced to exactly zero (planar navigation), so the vertical channel
/// $v_z + \Delta v_z + dt ((\Omega_y + \omega_y) v_x - \omega_x v_y - g)$ is never evaluated and
/// gravity does not enter the result.
///
/// # Arguments
/// * `previous` - state at the start of the coarse interval
/// * `delta_velocity_ref` - specific force integral in the reference frame, m/s
/// * `angular_rate_ref` - absolute reference frame rate, rad/s
/// * `dt` - coarse step in seconds
/// * `earth` - Earth model
pub fn velocity_update(
    previous: &NavigationState,
    delta_velocity_ref: &Vector3<f64>,
    angular_rate_ref: &Vector3<f64>,
    dt: f64,
    earth: &EarthModel,
) -> Vector3<f64> {
    let earth_rate = earth.earth_rate(&previous.latitude);
    let v = &previous.velocity;
    let w = angular_rate_ref;
    let v_x = v[0]
        + delta_velocity_ref[0]
        + dt * ((earth_rate[2] + w[2]) * v[1] - (earth_rate[1] + w[1]) * v[2]);
    let v_y = v[1] + delta_velocity_ref[1] + dt * (-(earth_rate[2] + w[2]) * v[0] + w[0] * v[2]);
    Vector3::new(v_x, v_y, 0.0)
}
/// Geodetic position update over one coarse step.
///
/// # Returns
/// `(latitude, longitude)` in radians. Longitude is not wrapped.
pub fn position_update(
    previous: &NavigationState,
    velocity: &Vector3<f64>,
    dt: f64,
    earth: &EarthModel,
) -> (f64, f64) {
    let latitude = previous.latitude + dt * velocity[1] / earth.radius;
    let longitude =
        previous.longitude + dt * velocity[0] / (earth.radius * previous.latitude.cos());
    (latitude, longitude)
}
/// Run one coarse mechanization update.
///
/// Consumes the fine increments of one coarse interval (normally four) and the previous state
/// and returns the new state, stamped with the time of the last fine increment. `previous` is
/// not modified.
///
/// # Arguments
/// * `previous` - state at the start of the interval
/// * `fine` - the fine increments of the interval, oldest first
/// * `earth` - Earth model
///
/// # Example
/// ```rust
/// use bins::{mechanize, NavigationState};
/// use bins::earth::EarthModel;
/// use bins::integration::FineIncrement;
/// use nalgebra::Vector3;
///
/// let earth = EarthModel::new(0.0, 9.8067, 6_371_000.0);
/// let previous = NavigationState::aligned(0.0, 0.5, 0.0, Vector3::zeros(), 0.0, 0.0, 0.0);
/// let h = 4.0 / 800.0;
/// let fine: Vec<FineIncrement> = (1..=4)
///     .map(|k| FineIncrement::new(k as f64 * h, Vector3::new(0.0, 0.0, 9.8067 * h), Vector3::zeros(), 4, h))
///     .collect();
/// let next = mechanize(&previous, &fine, &earth);
/// assert_eq!(next.velocity[2], 0.0);
/// assert!(next.velocity.norm() < 1e-12);
/// ```
pub fn mechanize(
    previous: &NavigationState,
    fine: &[FineIncrement],
    earth: &EarthModel,
) -> NavigationState {
    let dt: f64 = fine.iter().map(|increment| increment.dt).sum();
    let t = fine.last().map_or(previous.t + dt, |increment| increment.t);
    // Specific force
    let delta_velocity_body = integrate_specific_force(fine);
    let delta_velocity_ref = previous.c_body_to_ref * delta_velocity_body;
    // Body attitude
    let theta = rotation_vector(fine);
    let c_inertial_to_body = body_attitude_update(&previous.c_inertial_to_body, &theta);
    // Reference frame attitude
    let angular_rate_ref = earth.angular_rate_ref(&previous.latitude, &previous.velocity);
    let c_inertial_to_ref =
        reference_attitude_update(&previous.c_inertial_to_ref, &angular_rate_ref, dt);
    let c_body_to_ref = body_to_ref(&c_inertial_to_ref, &c_inertial_to_body);
    // Velocity and position
    let velocity = velocity_update(previous, &delta_velocity_ref, &angular_rate_ref, dt, earth);
    let (latitude, longitude) = position_update(previous, &velocity, dt, earth);
    NavigationState::new(
        t,
        latitude,
        longitude,
        velocity,
        c_body_to_ref,
        c_inertial_to_body,
        c_inertial_to_ref,
    )
}
