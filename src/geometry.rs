//! Unit vectors, Euler triples and the conversions between them.
//!
//! Euler angles follow the ZYZ convention used throughout 3D reconstruction:
//! the Euler matrix `A(rot, tilt, psi) = Rz(psi) · Ry(tilt) · Rz(rot)` maps
//! the particle frame onto the projection frame, and its third row is the
//! projection direction
//!
//! ```text
//! d = (cos(rot) sin(tilt), sin(rot) sin(tilt), cos(tilt))
//! ```
//!
//! All angles are radians.

use rkyv::{Archive, Deserialize, Serialize};

use crate::error::{Result, SamplingError};
use crate::{Matrix3, Vector3};

/// Vectors shorter than this are rejected as directions.
pub const DEGENERATE_NORM: f64 = 1e-9;

/// An orientation as a (rot, tilt, psi) triple in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default, Archive, Serialize, Deserialize)]
pub struct EulerAngles {
    pub rot: f64,
    pub tilt: f64,
    pub psi: f64,
}

impl EulerAngles {
    pub fn new(rot: f64, tilt: f64, psi: f64) -> Self {
        Self { rot, tilt, psi }
    }

    /// Build from angles given in degrees.
    pub fn from_degrees(rot: f64, tilt: f64, psi: f64) -> Self {
        Self::new(rot.to_radians(), tilt.to_radians(), psi.to_radians())
    }

    /// `[rot, tilt, psi]` in degrees.
    pub fn to_degrees(&self) -> [f64; 3] {
        [
            self.rot.to_degrees(),
            self.tilt.to_degrees(),
            self.psi.to_degrees(),
        ]
    }

    pub fn is_finite(&self) -> bool {
        self.rot.is_finite() && self.tilt.is_finite() && self.psi.is_finite()
    }

    /// Projection direction (third row of the Euler matrix). Psi does not
    /// affect it.
    pub fn direction(&self) -> Vector3 {
        let (sa, ca) = self.rot.sin_cos();
        let (sb, cb) = self.tilt.sin_cos();
        Vector3::new(ca * sb, sa * sb, cb)
    }

    /// The ZYZ Euler matrix.
    pub fn matrix(&self) -> Matrix3 {
        let (sa, ca) = self.rot.sin_cos();
        let (sb, cb) = self.tilt.sin_cos();
        let (sg, cg) = self.psi.sin_cos();

        let cc = cb * ca;
        let cs = cb * sa;
        let sc = sb * ca;
        let ss = sb * sa;

        Matrix3::new(
            cg * cc - sg * sa,
            cg * cs + sg * ca,
            -cg * sb,
            -sg * cc - cg * sa,
            -sg * cs + cg * ca,
            sg * sb,
            sc,
            ss,
            cb,
        )
    }

    /// Recover a triple from a rotation matrix. Tilt is returned in `[0, π]`;
    /// at tilt 0 or π only `rot + psi` (resp. `psi - rot`) is defined and
    /// rot is set to 0.
    pub fn from_matrix(a: &Matrix3) -> Self {
        let abs_sb = (a[(2, 0)] * a[(2, 0)] + a[(2, 1)] * a[(2, 1)]).sqrt();
        if abs_sb > 16.0 * f64::EPSILON {
            let psi = a[(1, 2)].atan2(-a[(0, 2)]);
            let rot = a[(2, 1)].atan2(a[(2, 0)]);
            let tilt = abs_sb.atan2(a[(2, 2)]);
            Self::new(rot, tilt, psi)
        } else if a[(2, 2)] > 0.0 {
            Self::new(0.0, 0.0, (-a[(1, 0)]).atan2(a[(0, 0)]))
        } else {
            Self::new(0.0, std::f64::consts::PI, a[(1, 0)].atan2(-a[(0, 0)]))
        }
    }

    /// Angles of a direction with psi = 0. `dir` is assumed to be a unit vector.
    pub fn from_direction(dir: &Vector3) -> Self {
        let tilt = dir.z.clamp(-1.0, 1.0).acos();
        let rho = (dir.x * dir.x + dir.y * dir.y).sqrt();
        let rot = if rho > DEGENERATE_NORM {
            dir.y.atan2(dir.x)
        } else {
            0.0
        };
        Self::new(rot, tilt, 0.0)
    }
}

/// A direction on the projection sphere, stored both as a unit vector and as
/// its Euler triple.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct SpherePoint {
    /// Unit vector `[x, y, z]`.
    pub vector: [f64; 3],
    /// Euler triple; psi is 0 for grid points.
    pub angles: EulerAngles,
}

impl SpherePoint {
    /// Build from an arbitrary (non-zero) vector, normalizing it.
    pub fn from_vector(v: Vector3) -> Result<Self> {
        let u = normalize_checked(v, "sampling point")?;
        Ok(Self::from_unit(u))
    }

    /// Build from a vector that is already unit length.
    pub(crate) fn from_unit(u: Vector3) -> Self {
        Self {
            vector: [u.x, u.y, u.z],
            angles: EulerAngles::from_direction(&u),
        }
    }

    /// Build from (rot, tilt) in radians.
    pub fn from_angles(rot: f64, tilt: f64) -> Self {
        let angles = EulerAngles::new(rot, tilt, 0.0);
        let d = angles.direction();
        Self {
            vector: [d.x, d.y, d.z],
            angles,
        }
    }

    /// Unit vector as an nalgebra vector.
    #[inline]
    pub fn uvec(&self) -> Vector3 {
        Vector3::new(self.vector[0], self.vector[1], self.vector[2])
    }
}

/// Normalize `v`, rejecting zero-length and non-finite input instead of
/// picking an arbitrary direction.
pub fn normalize_checked(v: Vector3, what: &str) -> Result<Vector3> {
    let norm = v.norm();
    if !(norm.is_finite() && norm > DEGENERATE_NORM) {
        return Err(SamplingError::Degenerate {
            what: what.to_string(),
            norm,
        });
    }
    Ok(v / norm)
}

/// Center angle (radians) between two unit vectors given their dot product.
#[inline]
pub fn angle_from_dot(dot: f64) -> f64 {
    dot.clamp(-1.0, 1.0).acos()
}

/// Point at fraction `t` along the great circle from `a` to `b`.
///
/// Sin-weighted combination of the endpoints, projected back onto the
/// sphere. Falls back to `a` when the endpoints coincide.
pub fn great_circle_point(a: &Vector3, b: &Vector3, t: f64) -> Vector3 {
    let omega = angle_from_dot(a.dot(b));
    let sin_omega = omega.sin();
    if sin_omega.abs() < DEGENERATE_NORM {
        return *a;
    }
    let wa = ((1.0 - t) * omega).sin() / sin_omega;
    let wb = (t * omega).sin() / sin_omega;
    let p = a * wa + b * wb;
    p / p.norm()
}
