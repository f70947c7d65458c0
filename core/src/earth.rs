//! Earth-related constants and functions
//!
//! This module contains the Earth model used by the mechanization: gravity of constant
//! magnitude on a sphere of constant radius, spinning at a constant rate. The constants are
//! carried as an explicit [`EarthModel`] value, so a run can use alternate constants (for
//! example a zero rotation rate in static tests).
//!
//! # Coordinate Systems
//! The local-level reference frame is East-North-Up (ENU):
//! - x points east (along-track for a vehicle heading east),
//! - y points north,
//! - z points up, so that a stationary accelerometer reads `+g` on the z axis.
//!
//! The Earth rotation rate vector in this frame is $\omega_{ie}^n = [0, \Omega \cos\varphi, \Omega \sin\varphi]$
//! and the transport rate of the frame due to motion over the sphere is
//! $\omega_{en}^n = [-v_n / R, v_e / R, v_e \tan\varphi / R]$.
//!
//! Both quantities are singular at the poles ($\tan\varphi$ and $1/\cos\varphi$ diverge). The model
//! does not guard against this; polar latitudes are outside the domain of this mechanization.
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::NavigationError;

/// Earth's rotation rate in rad/s ($\Omega$), 15 degrees per hour converted once.
pub const RATE: f64 = 15.0 * (std::f64::consts::PI / 180.0) / 3600.0;
/// Gravitational acceleration in $m/s^2$ (constant gravity model)
pub const GRAVITY: f64 = 9.8067;
/// Earth's mean radius in meters (spherical model)
pub const MEAN_RADIUS: f64 = 6_371_000.0;

/// Immutable set of Earth constants used by the mechanization equations.
///
/// The default values reproduce the classic spherical, constant-gravity model:
/// $\Omega = 15°/h$, $g = 9.8067\ m/s^2$, $R = 6\,371\,000\ m$.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EarthModel {
    /// Earth rotation rate in rad/s
    #[serde(default = "default_rotation_rate")]
    pub rotation_rate: f64,
    /// Gravity magnitude in m/s^2
    #[serde(default = "default_gravity")]
    pub gravity: f64,
    /// Earth radius in meters
    #[serde(default = "default_radius")]
    pub radius: f64,
}
fn default_rotation_rate() -> f64 {
    RATE
}
fn default_gravity() -> f64 {
    GRAVITY
}
fn default_radius() -> f64 {
    MEAN_RADIUS
}
impl Default for EarthModel {
    fn default() -> Self {
        EarthModel {
            rotation_rate: RATE,
            gravity: GRAVITY,
            radius: MEAN_RADIUS,
        }
    }
}
impl EarthModel {
    /// Create a new Earth model from explicit constants
    ///
    /// # Parameters
    /// - `rotation_rate` - Earth rotation rate in rad/s
    /// - `gravity` - gravity magnitude in m/s^2
    /// - `radius` - Earth radius in meters
    pub fn new(rotation_rate: f64, gravity: f64, radius: f64) -> EarthModel {
        EarthModel {
            rotation_rate,
            gravity,
            radius,
        }
    }
    /// Check that every constant is finite and the radius is positive.
    pub fn validate(&self) -> Result<(), NavigationError> {
        if !self.rotation_rate.is_finite() || !self.gravity.is_finite() {
            return Err(NavigationError::InvalidConfig(format!(
                "Earth rotation rate and gravity must be finite, got {} rad/s and {} m/s^2",
                self.rotation_rate, self.gravity
            )));
        }
        if !(self.radius.is_finite() && self.radius > 0.0) {
            return Err(NavigationError::InvalidConfig(format!(
                "Earth radius must be positive and finite, got {} m",
                self.radius
            )));
        }
        Ok(())
    }
    /// Calculate the Earth rotation rate vector in the local-level (ENU) frame
    ///
    /// # Parameters
    /// - `latitude` - latitude in radians
    ///
    /// # Returns
    /// $[0, \Omega \cos\varphi, \Omega \sin\varphi]$ in rad/s
    ///
    /// # Example
    /// ```rust
    /// use bins::earth::EarthModel;
    /// let earth = EarthModel::default();
    /// let omega_ie = earth.earth_rate(&0.0);
    /// assert_eq!(omega_ie[0], 0.0);
    /// assert_eq!(omega_ie[1], earth.rotation_rate);
    /// ```
    pub fn earth_rate(&self, latitude: &f64) -> Vector3<f64> {
        Vector3::new(
            0.0,
            self.rotation_rate * latitude.cos(),
            self.rotation_rate * latitude.sin(),
        )
    }
    /// Calculate the transport rate vector in the local-level (ENU) frame
    ///
    /// # Parameters
    /// - `latitude` - latitude in radians
    /// - `velocity` - reference frame velocity (east, north, up) in m/s
    ///
    /// # Returns
    /// $[-v_n / R, v_e / R, v_e \tan\varphi / R]$ in rad/s
    pub fn transport_rate(&self, latitude: &f64, velocity: &Vector3<f64>) -> Vector3<f64> {
        Vector3::new(
            -velocity[1] / self.radius,
            velocity[0] / self.radius,
            velocity[0] / self.radius * latitude.tan(),
        )
    }
    /// Absolute angular rate of the reference frame.
    ///
    /// This is the sum of the Earth rate and the transport rate, except for the east
    /// component which carries no Earth rate in ENU:
    /// $[-v_n / R, \Omega \cos\varphi + v_e / R, \Omega \sin\varphi + v_e \tan\varphi / R]$.
    /// It drives the reference frame attitude update and the Coriolis terms of the
    /// velocity update.
    ///
    /// # Example
    /// ```rust
    /// use bins::earth::EarthModel;
    /// use nalgebra::Vector3;
    /// let earth = EarthModel::default();
    /// let latitude = 45.0_f64.to_radians();
    /// let omega = earth.angular_rate_ref(&latitude, &Vector3::zeros());
    /// assert_eq!(omega, earth.earth_rate(&latitude));
    /// ```
    pub fn angular_rate_ref(&self, latitude: &f64, velocity: &Vector3<f64>) -> Vector3<f64> {
        self.earth_rate(latitude) + self.transport_rate(latitude, velocity)
    }
    /// Gravity vector in the local-level (ENU) frame, pointing down
    pub fn gravity_vector(&self) -> Vector3<f64> {
        Vector3::new(0.0, 0.0, -self.gravity)
    }
    /// Specific force sensed by a stationary accelerometer, expressed in the local-level frame
    pub fn stationary_specific_force(&self) -> Vector3<f64> {
        -self.gravity_vector()
    }
}
