//! Point-group descriptors and their generator matrices.
//!
//! Conventions: the principal n-fold axis is z, the dihedral 2-fold axis is
//! x, tetrahedral and octahedral groups have their 2-/4-fold axes on x, y and
//! z with a 3-fold axis along (1, 1, 1).

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use nalgebra::{Rotation3, Unit};

use crate::error::SamplingError;
use crate::{Matrix3, Vector3};

/// Orientation of the icosahedral group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcosahedralSetting {
    /// 2-folds on x, y, z; 5-folds in the yz-plane through (0, ±1, φ).
    I1,
    /// I1 rotated 90° about z: 5-folds in the xz-plane.
    I2,
    /// 5-fold on z, a 2-fold on x.
    I3,
    /// I3 rotated 90° about z: 5-fold on z, a 2-fold on y.
    I4,
}

/// A crystallographic-style point group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymmetryGroup {
    /// Cyclic Cn (C1 is the trivial group).
    Cyclic(u32),
    /// Inversion centre only.
    Ci,
    /// Single mirror plane (xy).
    Cs,
    /// Cn plus vertical mirror planes.
    CyclicVertical(u32),
    /// Cn plus the horizontal mirror plane.
    CyclicHorizontal(u32),
    /// Rotoreflection axis of even order n.
    Rotoreflection(u32),
    /// Dihedral Dn.
    Dihedral(u32),
    /// Dn plus diagonal mirror planes bisecting the 2-fold axes (Dnd).
    DihedralVertical(u32),
    /// Dn plus the horizontal mirror plane.
    DihedralHorizontal(u32),
    Tetrahedral,
    TetrahedralDiagonal,
    TetrahedralHorizontal,
    Octahedral,
    OctahedralFull,
    Icosahedral(IcosahedralSetting),
    IcosahedralFull(IcosahedralSetting),
}

impl SymmetryGroup {
    /// Number of distinct operators (including the identity).
    pub fn order(&self) -> usize {
        match *self {
            SymmetryGroup::Cyclic(n) => n as usize,
            SymmetryGroup::Ci | SymmetryGroup::Cs => 2,
            SymmetryGroup::CyclicVertical(n) | SymmetryGroup::CyclicHorizontal(n) => 2 * n as usize,
            SymmetryGroup::Rotoreflection(n) => n as usize,
            SymmetryGroup::Dihedral(n) => 2 * n as usize,
            SymmetryGroup::DihedralVertical(n) | SymmetryGroup::DihedralHorizontal(n) => {
                4 * n as usize
            }
            SymmetryGroup::Tetrahedral => 12,
            SymmetryGroup::TetrahedralDiagonal | SymmetryGroup::TetrahedralHorizontal => 24,
            SymmetryGroup::Octahedral => 24,
            SymmetryGroup::OctahedralFull => 48,
            SymmetryGroup::Icosahedral(_) => 60,
            SymmetryGroup::IcosahedralFull(_) => 120,
        }
    }

    /// Generators of the group. The identity is implied.
    pub(crate) fn generators(&self) -> Vec<Matrix3> {
        match *self {
            SymmetryGroup::Cyclic(n) => vec![rot_z(n)],
            SymmetryGroup::Ci => vec![inversion()],
            SymmetryGroup::Cs => vec![mirror_xy()],
            SymmetryGroup::CyclicVertical(n) => vec![rot_z(n), mirror_xz()],
            SymmetryGroup::CyclicHorizontal(n) => vec![rot_z(n), mirror_xy()],
            SymmetryGroup::Rotoreflection(n) => vec![mirror_xy() * rot_z(n)],
            SymmetryGroup::Dihedral(n) => vec![rot_z(n), two_fold_x()],
            SymmetryGroup::DihedralVertical(n) => {
                // Mirror plane containing z, at π/(2n) from the xz-plane.
                let half = PI / (2.0 * n as f64);
                let normal = Vector3::new(-half.sin(), half.cos(), 0.0);
                vec![rot_z(n), two_fold_x(), reflection(&normal)]
            }
            SymmetryGroup::DihedralHorizontal(n) => vec![rot_z(n), two_fold_x(), mirror_xy()],
            SymmetryGroup::Tetrahedral => tetrahedral(),
            SymmetryGroup::TetrahedralDiagonal => {
                let mut g = tetrahedral();
                g.push(reflection(&Vector3::new(1.0, -1.0, 0.0)));
                g
            }
            SymmetryGroup::TetrahedralHorizontal => {
                let mut g = tetrahedral();
                g.push(inversion());
                g
            }
            SymmetryGroup::Octahedral => vec![rot_z(4), three_fold_111()],
            SymmetryGroup::OctahedralFull => vec![rot_z(4), three_fold_111(), inversion()],
            SymmetryGroup::Icosahedral(s) => icosahedral(s),
            SymmetryGroup::IcosahedralFull(s) => {
                let mut g = icosahedral(s);
                g.push(inversion());
                g
            }
        }
    }
}

impl fmt::Display for SymmetryGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let setting = |s: &IcosahedralSetting| match s {
            IcosahedralSetting::I1 => 1,
            IcosahedralSetting::I2 => 2,
            IcosahedralSetting::I3 => 3,
            IcosahedralSetting::I4 => 4,
        };
        match self {
            SymmetryGroup::Cyclic(n) => write!(f, "c{n}"),
            SymmetryGroup::Ci => write!(f, "ci"),
            SymmetryGroup::Cs => write!(f, "cs"),
            SymmetryGroup::CyclicVertical(n) => write!(f, "c{n}v"),
            SymmetryGroup::CyclicHorizontal(n) => write!(f, "c{n}h"),
            SymmetryGroup::Rotoreflection(n) => write!(f, "s{n}"),
            SymmetryGroup::Dihedral(n) => write!(f, "d{n}"),
            SymmetryGroup::DihedralVertical(n) => write!(f, "d{n}v"),
            SymmetryGroup::DihedralHorizontal(n) => write!(f, "d{n}h"),
            SymmetryGroup::Tetrahedral => write!(f, "t"),
            SymmetryGroup::TetrahedralDiagonal => write!(f, "td"),
            SymmetryGroup::TetrahedralHorizontal => write!(f, "th"),
            SymmetryGroup::Octahedral => write!(f, "o"),
            SymmetryGroup::OctahedralFull => write!(f, "oh"),
            SymmetryGroup::Icosahedral(s) => write!(f, "i{}", setting(s)),
            SymmetryGroup::IcosahedralFull(s) => write!(f, "i{}h", setting(s)),
        }
    }
}

impl FromStr for SymmetryGroup {
    type Err = SamplingError;

    fn from_str(descriptor: &str) -> Result<Self, Self::Err> {
        let s = descriptor.trim().to_ascii_lowercase();
        let unknown = || SamplingError::UnknownSymmetry(descriptor.to_string());

        let group = match s.as_str() {
            "ci" => SymmetryGroup::Ci,
            "cs" => SymmetryGroup::Cs,
            "t" => SymmetryGroup::Tetrahedral,
            "td" => SymmetryGroup::TetrahedralDiagonal,
            "th" => SymmetryGroup::TetrahedralHorizontal,
            "o" => SymmetryGroup::Octahedral,
            "oh" => SymmetryGroup::OctahedralFull,
            "i" | "i1" => SymmetryGroup::Icosahedral(IcosahedralSetting::I1),
            "i2" => SymmetryGroup::Icosahedral(IcosahedralSetting::I2),
            "i3" => SymmetryGroup::Icosahedral(IcosahedralSetting::I3),
            "i4" => SymmetryGroup::Icosahedral(IcosahedralSetting::I4),
            "ih" | "i1h" => SymmetryGroup::IcosahedralFull(IcosahedralSetting::I1),
            "i2h" => SymmetryGroup::IcosahedralFull(IcosahedralSetting::I2),
            "i3h" => SymmetryGroup::IcosahedralFull(IcosahedralSetting::I3),
            "i4h" => SymmetryGroup::IcosahedralFull(IcosahedralSetting::I4),
            _ => {
                let family = s.chars().next().ok_or_else(unknown)?;
                let rest = &s[family.len_utf8()..];
                let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
                let suffix = &rest[digits.len()..];
                let n: u32 = digits.parse().map_err(|_| unknown())?;
                if n == 0 {
                    return Err(unknown());
                }
                match (family, suffix) {
                    ('c', "") => SymmetryGroup::Cyclic(n),
                    ('c', "v") => SymmetryGroup::CyclicVertical(n),
                    ('c', "h") => SymmetryGroup::CyclicHorizontal(n),
                    ('s', "") if n % 2 == 0 => SymmetryGroup::Rotoreflection(n),
                    ('d', "") => SymmetryGroup::Dihedral(n),
                    ('d', "v") => SymmetryGroup::DihedralVertical(n),
                    ('d', "h") => SymmetryGroup::DihedralHorizontal(n),
                    _ => return Err(unknown()),
                }
            }
        };
        Ok(group)
    }
}

// ── Generator matrices ──────────────────────────────────────────────────────

fn rot_z(n: u32) -> Matrix3 {
    let (s, c) = (2.0 * PI / n as f64).sin_cos();
    Matrix3::new(c, -s, 0.0, s, c, 0.0, 0.0, 0.0, 1.0)
}

fn two_fold_x() -> Matrix3 {
    Matrix3::from_diagonal(&Vector3::new(1.0, -1.0, -1.0))
}

fn mirror_xy() -> Matrix3 {
    Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, -1.0))
}

fn mirror_xz() -> Matrix3 {
    Matrix3::from_diagonal(&Vector3::new(1.0, -1.0, 1.0))
}

fn inversion() -> Matrix3 {
    -Matrix3::identity()
}

/// Householder reflection through the plane with the given normal.
fn reflection(normal: &Vector3) -> Matrix3 {
    let u = normal.normalize();
    Matrix3::identity() - 2.0 * u * u.transpose()
}

/// Cyclic permutation x → y → z → x (3-fold about (1, 1, 1)).
fn three_fold_111() -> Matrix3 {
    Matrix3::new(0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0)
}

fn tetrahedral() -> Vec<Matrix3> {
    vec![rot_z(2), three_fold_111()]
}

fn icosahedral(setting: IcosahedralSetting) -> Vec<Matrix3> {
    let phi = (1.0 + 5.0_f64.sqrt()) / 2.0;
    let five_fold_axis = Unit::new_normalize(Vector3::new(0.0, 1.0, phi));
    let five_fold = Rotation3::from_axis_angle(&five_fold_axis, 2.0 * PI / 5.0).into_inner();
    let base = vec![rot_z(2), three_fold_111(), five_fold];

    // Rotation bringing the I1 frame into the requested setting.
    let to_setting = match setting {
        IcosahedralSetting::I1 => return base,
        IcosahedralSetting::I2 => rot_z(4),
        IcosahedralSetting::I3 => x_rotation((1.0 / phi).atan()),
        IcosahedralSetting::I4 => rot_z(4) * x_rotation((1.0 / phi).atan()),
    };
    base.iter()
        .map(|g| to_setting * g * to_setting.transpose())
        .collect()
}

fn x_rotation(angle: f64) -> Matrix3 {
    let (s, c) = angle.sin_cos();
    Matrix3::new(1.0, 0.0, 0.0, 0.0, c, -s, 0.0, s, c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_descriptors() {
        assert_eq!("C1".parse::<SymmetryGroup>().unwrap(), SymmetryGroup::Cyclic(1));
        assert_eq!("c4".parse::<SymmetryGroup>().unwrap(), SymmetryGroup::Cyclic(4));
        assert_eq!(
            "D7h".parse::<SymmetryGroup>().unwrap(),
            SymmetryGroup::DihedralHorizontal(7)
        );
        assert_eq!(
            " c3v ".parse::<SymmetryGroup>().unwrap(),
            SymmetryGroup::CyclicVertical(3)
        );
        assert_eq!("s4".parse::<SymmetryGroup>().unwrap(), SymmetryGroup::Rotoreflection(4));
        assert_eq!(
            "I".parse::<SymmetryGroup>().unwrap(),
            SymmetryGroup::Icosahedral(IcosahedralSetting::I1)
        );
        assert_eq!(
            "i3h".parse::<SymmetryGroup>().unwrap(),
            SymmetryGroup::IcosahedralFull(IcosahedralSetting::I3)
        );
    }

    #[test]
    fn test_parse_rejects_unknown() {
        for bad in ["", "x", "c0", "c", "cq", "d2x", "s3", "i5", "c-1"] {
            let err = bad.parse::<SymmetryGroup>().unwrap_err();
            assert!(matches!(err, SamplingError::UnknownSymmetry(_)), "{bad}");
        }
    }

    #[test]
    fn test_display_roundtrip() {
        let descriptors = [
            "c1", "c6", "ci", "cs", "c2v", "c5h", "s6", "d3", "d4v", "d2h", "t", "td", "th", "o",
            "oh", "i1", "i2", "i3", "i4", "i2h",
        ];
        for s in descriptors {
            let g: SymmetryGroup = s.parse().unwrap();
            assert_eq!(g.to_string(), s);
        }
    }

    #[test]
    fn test_icosahedral_settings() {
        // I3: the 5-fold must sit on z
        let g = icosahedral(IcosahedralSetting::I3);
        let z = Vector3::new(0.0, 0.0, 1.0);
        assert!((g[2] * z - z).norm() < 1e-12);
        // I1: z is a 2-fold
        let g = icosahedral(IcosahedralSetting::I1);
        assert!((g[0] * z - z).norm() < 1e-12);
    }
}
