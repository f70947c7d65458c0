//! Rotation and direction-cosine-matrix helpers for the mechanization.
//!
//! Public API:
//!     pub fn vector_to_skew_symmetric(v: &Vector3<f64>) -> Matrix3<f64>
//!     pub fn skew_symmetric_to_vector(skew: &Matrix3<f64>) -> Vector3<f64>
//!     pub fn body_to_ref_from_euler(heading: f64, pitch: f64, roll: f64) -> Matrix3<f64>
//!     pub fn euler_from_dcm(dcm: &Matrix3<f64>) -> (f64, f64, f64)
//!     pub fn rotation_vector_to_dcm(rotation_vector: &Vector3<f64>) -> Matrix3<f64>
//!     pub fn small_angle_dcm(rate: &Vector3<f64>, dt: f64) -> Matrix3<f64>
//!     pub fn orthonormalize(matrix: &Matrix3<f64>) -> Matrix3<f64>
//!
//! All functions are stateless. Angles are radians, matrices are row-major in the
//! mathematical sense (`m[(row, column)]`).
//!
//! Euler convention: heading $H$ (clockwise from north), pitch $P$, roll $R$. The
//! body-to-reference matrix is
//!
//! $$
//! C_b^n = \begin{bmatrix}
//! \cos H \cos R + \sin H \sin P \sin R & \sin H \cos P & \cos H \sin R - \sin H \sin P \cos R \\\\
//! -\sin H \cos R + \cos H \sin P \sin R & \cos H \cos P & -\sin H \sin R - \cos H \sin P \cos R \\\\
//! -\cos P \sin R & \sin P & \cos P \cos R
//! \end{bmatrix}
//! $$
use nalgebra::{Matrix3, Vector3};

/// Below this rotation angle the Rodrigues coefficients are evaluated from their Taylor series.
const SMALL_ANGLE: f64 = 1e-8;
/// Iteration cap for the SVD so that garbage input cannot stall the mechanization.
const MAX_SVD_ITERATIONS: usize = 1000;

/// Convert a three-element vector to a skew-symmetric matrix
///
/// $$
/// x = \begin{bmatrix} a \\\\ b \\\\ c \end{bmatrix} \rightarrow X = \begin{bmatrix} 0 & -c & b \\\\ c & 0 & -a \\\\ -b & a & 0 \end{bmatrix}
/// $$
///
/// so that `X * y == x.cross(&y)`.
///
/// # Example
/// ```rust
/// use nalgebra::{Vector3, Matrix3};
/// use bins::linalg;
/// let v: Vector3<f64> = Vector3::new(1.0, 2.0, 3.0);
/// let skew: Matrix3<f64> = linalg::vector_to_skew_symmetric(&v);
/// let y = Vector3::new(-1.0, 0.5, 2.0);
/// assert_eq!(skew * y, v.cross(&y));
/// ```
pub fn vector_to_skew_symmetric(v: &Vector3<f64>) -> Matrix3<f64> {
    let mut skew: Matrix3<f64> = Matrix3::zeros();
    skew[(0, 1)] = -v[2];
    skew[(0, 2)] = v[1];
    skew[(1, 0)] = v[2];
    skew[(1, 2)] = -v[0];
    skew[(2, 0)] = -v[1];
    skew[(2, 1)] = v[0];
    skew
}
/// Convert a skew-symmetric matrix back to its three-element vector
///
/// Inverse of [vector_to_skew_symmetric].
pub fn skew_symmetric_to_vector(skew: &Matrix3<f64>) -> Vector3<f64> {
    Vector3::new(skew[(2, 1)], skew[(0, 2)], skew[(1, 0)])
}
/// Build the body-to-reference direction cosine matrix from Euler angles.
///
/// # Arguments
/// * `heading` - heading in radians, clockwise from north
/// * `pitch` - pitch in radians
/// * `roll` - roll in radians
///
/// # Returns
/// The proper rotation $C_b^n$ given in the module documentation.
///
/// # Example
/// ```rust
/// use bins::linalg;
/// let c = linalg::body_to_ref_from_euler(0.0, 0.0, 0.0);
/// assert_eq!(c, nalgebra::Matrix3::identity());
/// ```
pub fn body_to_ref_from_euler(heading: f64, pitch: f64, roll: f64) -> Matrix3<f64> {
    let (sin_h, cos_h) = heading.sin_cos();
    let (sin_p, cos_p) = pitch.sin_cos();
    let (sin_r, cos_r) = roll.sin_cos();
    Matrix3::new(
        cos_h * cos_r + sin_h * sin_p * sin_r,
        sin_h * cos_p,
        cos_h * sin_r - sin_h * sin_p * cos_r,
        -sin_h * cos_r + cos_h * sin_p * sin_r,
        cos_h * cos_p,
        -sin_h * sin_r - cos_h * sin_p * cos_r,
        -cos_p * sin_r,
        sin_p,
        cos_p * cos_r,
    )
}
/// Extract (heading, pitch, roll) from a body-to-reference direction cosine matrix.
///
/// Exact inverse of [body_to_ref_from_euler] for pitch in $(-\pi/2, \pi/2)$:
/// - heading $= \operatorname{atan2}(C_{01}, C_{11})$
/// - pitch $= \operatorname{atan2}(C_{21}, \sqrt{C_{01}^2 + C_{11}^2})$
/// - roll $= -\operatorname{atan2}(C_{20}, C_{22})$
///
/// # Example
/// ```rust
/// use bins::linalg;
/// let c = linalg::body_to_ref_from_euler(0.3, -0.2, 0.1);
/// let (heading, pitch, roll) = linalg::euler_from_dcm(&c);
/// assert!((heading - 0.3).abs() < 1e-12);
/// assert!((pitch + 0.2).abs() < 1e-12);
/// assert!((roll - 0.1).abs() < 1e-12);
/// ```
pub fn euler_from_dcm(dcm: &Matrix3<f64>) -> (f64, f64, f64) {
    let heading = dcm[(0, 1)].atan2(dcm[(1, 1)]);
    let pitch = dcm[(2, 1)].atan2(dcm[(0, 1)].hypot(dcm[(1, 1)]));
    let roll = -dcm[(2, 0)].atan2(dcm[(2, 2)]);
    (heading, pitch, roll)
}
/// Direction cosine matrix of a finite rotation given by its Euler rotation vector.
///
/// $$
/// C = I - \frac{\sin\theta}{\theta} \Theta + \frac{1 - \cos\theta}{\theta^2} \Theta^2, \quad \theta = |\vec\theta|, \quad \Theta = [\vec\theta \times]
/// $$
///
/// The matrix maps components from the frame before the rotation to the frame after it,
/// i.e. it is the transpose of the active rotation about $\vec\theta$. A zero vector returns
/// the identity exactly; for very small angles the coefficients are evaluated from their
/// Taylor series. $1 - \cos\theta$ is evaluated as $2 \sin^2(\theta / 2)$.
///
/// # Example
/// ```rust
/// use bins::linalg;
/// use nalgebra::{Matrix3, Vector3};
/// assert_eq!(linalg::rotation_vector_to_dcm(&Vector3::zeros()), Matrix3::identity());
/// ```
pub fn rotation_vector_to_dcm(rotation_vector: &Vector3<f64>) -> Matrix3<f64> {
    let angle = rotation_vector.norm();
    if angle == 0.0 {
        return Matrix3::identity();
    }
    let (first, second) = if angle < SMALL_ANGLE {
        let angle_sq = angle * angle;
        (1.0 - angle_sq / 6.0, 0.5 - angle_sq / 24.0)
    } else {
        let half_sin = (0.5 * angle).sin();
        (angle.sin() / angle, 2.0 * half_sin * half_sin / (angle * angle))
    };
    let skew = vector_to_skew_symmetric(rotation_vector);
    Matrix3::identity() - skew * first + skew * skew * second
}
/// Second-order small-angle direction cosine matrix for a rotation at `rate` over `dt`.
///
/// $$
/// C = I - \Omega\, dt + \frac{dt^2}{2} \Omega^2, \quad \Omega = [\omega \times]
/// $$
///
/// Used for the reference frame update where the rotation over one coarse step is tiny.
pub fn small_angle_dcm(rate: &Vector3<f64>, dt: f64) -> Matrix3<f64> {
    let skew = vector_to_skew_symmetric(rate);
    Matrix3::identity() - skew * dt + skew * skew * (0.5 * dt * dt)
}
/// Project a near-orthogonal matrix onto the closest proper rotation matrix.
///
/// Uses the singular value decomposition $M = U \Sigma V^T \rightarrow R = U V^T$. If the
/// product is a reflection the last left singular vector is flipped so that the result
/// always has determinant +1.
///
/// Precondition: `matrix` is close to orthogonal. A singular input produces an unspecified
/// (but finite when the input is finite) result rather than a panic.
///
/// # Example
/// ```rust
/// use bins::linalg;
/// use nalgebra::Matrix3;
/// let skewed = Matrix3::new(1.0, 1e-6, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0);
/// let r = linalg::orthonormalize(&skewed);
/// assert!(linalg::orthonormality_error(&r) < 1e-14);
/// ```
pub fn orthonormalize(matrix: &Matrix3<f64>) -> Matrix3<f64> {
    let Some(svd) = matrix.try_svd(true, true, f64::EPSILON, MAX_SVD_ITERATIONS) else {
        return *matrix;
    };
    match (svd.u, svd.v_t) {
        (Some(mut u), Some(v_t)) => {
            if (u * v_t).determinant() < 0.0 {
                let mut last = u.column_mut(2);
                last.neg_mut();
            }
            u * v_t
        }
        _ => *matrix,
    }
}
/// Largest absolute deviation of $R^T R$ from the identity.
pub fn orthonormality_error(matrix: &Matrix3<f64>) -> f64 {
    (matrix.transpose() * matrix - Matrix3::identity()).amax()
}
/// True when `matrix` is orthonormal within `tolerance` and has determinant +1 within `tolerance`.
pub fn is_rotation(matrix: &Matrix3<f64>, tolerance: f64) -> bool {
    orthonormality_error(matrix) < tolerance && (matrix.determinant() - 1.0).abs() < tolerance
}
