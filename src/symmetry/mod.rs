//! Symmetry operator repository.
//!
//! A point group is given by a short descriptor (`c4`, `d7`, `i2`, ...). The
//! repository holds every element of the group as a pair of matrices:
//!
//! - `L` acts on projection directions: the symmetry-equivalent images of a
//!   direction `v` are `L · v`. `L` may be improper (mirrors, inversion).
//! - `R` is the proper rotation used to compose full Euler matrices:
//!   `A' = P · A · R`, where `P` is the identity for proper operators and a
//!   180° in-plane flip for improper ones. The third row of `A'` is then
//!   exactly `L · v`.
//!
//! The identity is always the first operator.

pub mod groups;

pub use groups::{IcosahedralSetting, SymmetryGroup};

use tracing::{debug, info};

use crate::error::{Result, SamplingError};
use crate::geometry::EulerAngles;
use crate::{Matrix3, Vector3};

/// Largest group accepted (Cn/Dn with huge n are rejected).
pub const MAX_GROUP_ORDER: usize = 1024;

/// Two matrices are the same group element below this max-abs difference.
const SAME_ELEMENT_TOL: f64 = 1e-6;

/// Parallel L/R matrix sequences for one point group.
#[derive(Debug, Clone)]
pub struct SymmetryRepository {
    group: SymmetryGroup,
    l: Vec<Matrix3>,
    r: Vec<Matrix3>,
}

impl SymmetryRepository {
    /// Parse a descriptor and build its repository.
    pub fn from_descriptor(descriptor: &str) -> Result<Self> {
        let group: SymmetryGroup = descriptor.parse()?;
        Self::build(group)
    }

    /// Enumerate every element of `group` by closing its generators under
    /// multiplication.
    pub fn build(group: SymmetryGroup) -> Result<Self> {
        let expected = group.order();
        if expected > MAX_GROUP_ORDER {
            return Err(SamplingError::InvalidInput(format!(
                "symmetry {group} has order {expected}, more than {MAX_GROUP_ORDER}"
            )));
        }

        let generators = group.generators();
        let mut elements: Vec<Matrix3> = vec![Matrix3::identity()];
        for g in &generators {
            push_unique(&mut elements, *g);
        }

        // Breadth-first closure: multiply each known element by every generator.
        let mut cursor = 0;
        while cursor < elements.len() {
            let e = elements[cursor];
            for g in &generators {
                push_unique(&mut elements, e * g);
            }
            if elements.len() > expected {
                break;
            }
            cursor += 1;
        }

        if elements.len() != expected {
            return Err(SamplingError::InvalidInput(format!(
                "symmetry {group}: closure produced {} operators, expected {expected}",
                elements.len()
            )));
        }

        let r = elements
            .iter()
            .map(|m| (*m * m.determinant().signum()).transpose())
            .collect();
        debug!("Symmetry {}: {} generators", group, generators.len());
        info!("Built symmetry repository {} with {} operators", group, elements.len());

        Ok(Self {
            group,
            l: elements,
            r,
        })
    }

    pub fn group(&self) -> SymmetryGroup {
        self.group
    }

    /// Number of operators (the group order).
    pub fn len(&self) -> usize {
        self.l.len()
    }

    /// Never true: the identity is always present.
    pub fn is_empty(&self) -> bool {
        self.l.is_empty()
    }

    /// Left (direction) operators.
    pub fn l_repository(&self) -> &[Matrix3] {
        &self.l
    }

    /// Right (Euler composition) operators.
    pub fn r_repository(&self) -> &[Matrix3] {
        &self.r
    }

    /// `true` when operator `k` includes a reflection.
    pub fn is_improper(&self, k: usize) -> bool {
        self.l[k].determinant() < 0.0
    }

    /// Image `L_k · v` of a direction.
    #[inline]
    pub fn image(&self, k: usize, v: &Vector3) -> Vector3 {
        self.l[k] * v
    }

    /// All images of `v`, in operator order (identity first).
    pub fn images(&self, v: &Vector3) -> Vec<Vector3> {
        self.l.iter().map(|m| m * v).collect()
    }

    /// Euler triple of an orientation after applying operator `k`.
    ///
    /// The projection direction of the result is `L_k` applied to the
    /// direction of `angles`; psi carries the in-plane rotation the operator
    /// induces.
    pub fn apply_to_angles(&self, k: usize, angles: &EulerAngles) -> EulerAngles {
        let mut a = angles.matrix() * self.r[k];
        if self.is_improper(k) {
            // P = diag(1, -1, -1)
            for c in 0..3 {
                a[(1, c)] = -a[(1, c)];
                a[(2, c)] = -a[(2, c)];
            }
        }
        EulerAngles::from_matrix(&a)
    }
}

fn push_unique(elements: &mut Vec<Matrix3>, m: Matrix3) {
    let known = elements
        .iter()
        .any(|e| (e - m).amax() < SAME_ELEMENT_TOL);
    if !known {
        elements.push(m);
    }
}
