//! Icosahedral sampling of the projection sphere.
//!
//! The sphere is triangulated by a regular icosahedron with one vertex at the
//! north pole (a triangular grid first used in meteorological models and
//! popularized by Baumgardner's diamond layout). Every edge is split into `n`
//! equal great-circle segments and each face is filled row by row between
//! points of its two edges meeting at the face's first vertex, giving
//! `10 n² + 2` points on the full sphere.
//!
//! Point order is fixed: the 12 vertices, then the interior points of the 30
//! edges in discovery order, then the interior points of the 20 faces.
//! Downstream stages reference points by position, so this order must not
//! change between runs.

use std::collections::HashSet;
use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use rkyv::{Archive, Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, SamplingError};
use crate::geometry::{great_circle_point, SpherePoint};
use crate::Vector3;

/// Arc (radians) of an icosahedron edge on the unit sphere: `atan(2)`.
pub const ICOSAHEDRON_EDGE_RAD: f64 = 1.107_148_717_794_090_4;

/// Finest subdivision accepted (about 0.03°, 42M points on the sphere).
pub const MAX_SUBDIVISIONS: usize = 2048;

/// Equator / tilt boundary tolerance.
const BOUNDARY_EPS: f64 = 1e-9;

/// An ordered set of sampling directions.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct SamplingGrid {
    /// Target angular spacing in radians.
    pub spacing_rad: f64,
    /// Points in generation order.
    pub points: Vec<SpherePoint>,
}

impl SamplingGrid {
    /// Wrap an explicit list of points (e.g. loaded from disk).
    pub fn from_points(spacing_rad: f64, points: Vec<SpherePoint>) -> Self {
        Self {
            spacing_rad,
            points,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[SpherePoint] {
        &self.points
    }

    /// Unit vector of point `idx`.
    #[inline]
    pub fn uvec(&self, idx: usize) -> Vector3 {
        self.points[idx].uvec()
    }
}

/// Number of segments per icosahedron edge for a target spacing.
pub fn subdivisions_for_spacing(spacing_rad: f64) -> Result<usize> {
    if !(spacing_rad.is_finite() && spacing_rad > 0.0) {
        return Err(SamplingError::InvalidInput(format!(
            "sampling spacing must be positive, got {spacing_rad}"
        )));
    }
    let n = (ICOSAHEDRON_EDGE_RAD / spacing_rad).round().max(1.0);
    if n > MAX_SUBDIVISIONS as f64 {
        return Err(SamplingError::InvalidInput(format!(
            "sampling spacing {:.4}° is too fine",
            spacing_rad.to_degrees()
        )));
    }
    Ok(n as usize)
}

/// Generate the icosahedral grid.
///
/// `tilt_range` is `(min_tilt, max_tilt)` in radians and is applied to the
/// tilt of every point (`[0, π]` keeps everything). With `hemisphere_only`,
/// only directions with z > 0 and half of the equator (rot in `[0, π)`) are
/// kept, so a direction and its antipode never both appear.
pub fn generate(
    spacing_rad: f64,
    tilt_range: (f64, f64),
    hemisphere_only: bool,
) -> Result<SamplingGrid> {
    let n = subdivisions_for_spacing(spacing_rad)?;
    let (min_tilt, max_tilt) = tilt_range;
    if min_tilt.is_nan() || max_tilt.is_nan() || min_tilt > max_tilt {
        return Err(SamplingError::InvalidInput(format!(
            "invalid tilt range [{min_tilt}, {max_tilt}]"
        )));
    }
    debug!(
        "Icosahedral grid: spacing {:.3}°, {} segments per edge",
        spacing_rad.to_degrees(),
        n
    );

    let all = full_sphere_points(n);
    let total = all.len();

    let points: Vec<SpherePoint> = all
        .into_iter()
        .filter(|v| !hemisphere_only || in_upper_hemisphere(v))
        .map(SpherePoint::from_unit)
        .filter(|p| {
            p.angles.tilt >= min_tilt - BOUNDARY_EPS && p.angles.tilt <= max_tilt + BOUNDARY_EPS
        })
        .collect();

    info!(
        "Generated {} sampling points ({} on the full sphere)",
        points.len(),
        total
    );
    Ok(SamplingGrid {
        spacing_rad,
        points,
    })
}

/// Perturb every point with isotropic Gaussian noise of deviation
/// `sigma_rad` and project back onto the sphere. Reproducible for a given
/// seed.
pub fn add_noise(grid: &mut SamplingGrid, sigma_rad: f64, seed: u64) -> Result<()> {
    if sigma_rad == 0.0 {
        return Ok(());
    }
    let normal = Normal::new(0.0, sigma_rad).map_err(|e| {
        SamplingError::InvalidInput(format!("invalid sampling noise {sigma_rad}: {e}"))
    })?;
    let mut rng = StdRng::seed_from_u64(seed);
    for p in grid.points.iter_mut() {
        let jitter = Vector3::new(
            normal.sample(&mut rng),
            normal.sample(&mut rng),
            normal.sample(&mut rng),
        );
        *p = SpherePoint::from_vector(p.uvec() + jitter)?;
    }
    debug!(
        "Added {:.3}° sampling noise to {} points",
        sigma_rad.to_degrees(),
        grid.len()
    );
    Ok(())
}

fn in_upper_hemisphere(v: &Vector3) -> bool {
    if v.z > BOUNDARY_EPS {
        return true;
    }
    if v.z < -BOUNDARY_EPS {
        return false;
    }
    // Equator: keep rot in [0, π)
    v.y > BOUNDARY_EPS || (v.y.abs() <= BOUNDARY_EPS && v.x > 0.0)
}

/// Icosahedron vertices: north pole, upper ring at rot = -36° + 72°k,
/// lower ring at rot = 72°k, south pole.
fn icosahedron_vertices() -> [Vector3; 12] {
    let z = 1.0 / 5.0_f64.sqrt();
    let r = 2.0 * z;
    let mut v = [Vector3::zeros(); 12];
    v[0] = Vector3::new(0.0, 0.0, 1.0);
    for k in 0..5 {
        let (s, c) = ((-36.0 + 72.0 * k as f64) * PI / 180.0).sin_cos();
        v[1 + k] = Vector3::new(r * c, r * s, z);
        let (s, c) = ((72.0 * k as f64) * PI / 180.0).sin_cos();
        v[6 + k] = Vector3::new(r * c, r * s, -z);
    }
    v[11] = Vector3::new(0.0, 0.0, -1.0);
    v
}

/// The 20 faces, grouped as the 10 diamonds (5 northern, 5 southern).
fn icosahedron_faces() -> [[usize; 3]; 20] {
    let up = |k: usize| 1 + k % 5;
    let lo = |k: usize| 6 + k % 5;
    let mut faces = [[0usize; 3]; 20];
    for k in 0..5 {
        faces[2 * k] = [0, up(k), up(k + 1)];
        faces[2 * k + 1] = [up(k), lo(k), up(k + 1)];
        faces[10 + 2 * k] = [up(k + 1), lo(k), lo(k + 1)];
        faces[10 + 2 * k + 1] = [lo(k), 11, lo(k + 1)];
    }
    faces
}

fn full_sphere_points(n: usize) -> Vec<Vector3> {
    let verts = icosahedron_vertices();
    let faces = icosahedron_faces();
    let mut out: Vec<Vector3> = Vec::with_capacity(10 * n * n + 2);
    out.extend_from_slice(&verts);
    if n == 1 {
        return out;
    }

    let mut seen_edges: HashSet<(usize, usize)> = HashSet::with_capacity(30);
    for face in &faces {
        for (a, b) in [(face[0], face[1]), (face[1], face[2]), (face[2], face[0])] {
            let key = (a.min(b), a.max(b));
            if !seen_edges.insert(key) {
                continue;
            }
            let (va, vb) = (verts[key.0], verts[key.1]);
            for i in 1..n {
                out.push(great_circle_point(&va, &vb, i as f64 / n as f64));
            }
        }
    }

    for face in &faces {
        let (a, b, c) = (verts[face[0]], verts[face[1]], verts[face[2]]);
        for i in 2..n {
            let t = i as f64 / n as f64;
            let left = great_circle_point(&a, &b, t);
            let right = great_circle_point(&a, &c, t);
            for j in 1..i {
                out.push(great_circle_point(&left, &right, j as f64 / i as f64));
            }
        }
    }
    out
}
