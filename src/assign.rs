//! Assignment of experimental orientations to their closest sampling point.
//!
//! Every experimental projection direction is expanded into its symmetry
//! images; each image is matched against all reduced sampling points by a
//! linear scan, and the best (operator, point) pair over the whole orbit is
//! reported. The distance is therefore the true minimum over the
//! symmetry-equivalent directions, independent of how the asymmetric unit
//! was chosen.

use std::io::Write;

use tracing::{debug, info, warn};

use crate::error::{Result, SamplingError};
use crate::geometry::{angle_from_dot, normalize_checked, EulerAngles};
use crate::reduce::{Redundancy, ReducedGrid};
use crate::symmetry::SymmetryRepository;
use crate::Vector3;

/// One experimental image orientation (read from the image metadata table).
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentalOrientation {
    /// Caller-side image identifier.
    pub id: u64,
    pub angles: EulerAngles,
}

impl ExperimentalOrientation {
    pub fn new(id: u64, angles: EulerAngles) -> Self {
        Self { id, angles }
    }

    /// Projection direction, rejecting malformed (non-finite) records.
    pub fn direction(&self) -> Result<Vector3> {
        normalize_checked(
            self.angles.direction(),
            &format!("experimental image {}", self.id),
        )
    }
}

/// Symmetry images of the experimental directions, computed once and reused
/// by the assigner and the far-point filter.
#[derive(Debug, Clone)]
pub struct SymmetrizedExperimentalData {
    /// Ids of the usable records, in input order.
    pub ids: Vec<u64>,
    /// `images[i][k]` = `L_k` applied to the direction of record `ids[i]`.
    pub images: Vec<Vec<Vector3>>,
    /// `angles[i][k]` = Euler triple of record `ids[i]` under operator `k`.
    pub angles: Vec<Vec<EulerAngles>>,
    /// Records that could not be used.
    pub rejected: Vec<RejectedOrientation>,
}

/// An experimental record skipped because its orientation is degenerate.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedOrientation {
    pub id: u64,
    pub reason: String,
}

impl SymmetrizedExperimentalData {
    pub fn new(experimental: &[ExperimentalOrientation], repository: &SymmetryRepository) -> Self {
        let mut data = Self {
            ids: Vec::with_capacity(experimental.len()),
            images: Vec::with_capacity(experimental.len()),
            angles: Vec::with_capacity(experimental.len()),
            rejected: Vec::new(),
        };
        for record in experimental {
            let dir = match record.direction() {
                Ok(d) => d,
                Err(e) => {
                    warn!("Skipping experimental image {}: {}", record.id, e);
                    data.rejected.push(RejectedOrientation {
                        id: record.id,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            data.ids.push(record.id);
            data.images.push(repository.images(&dir));
            data.angles.push(
                (0..repository.len())
                    .map(|k| repository.apply_to_angles(k, &record.angles))
                    .collect(),
            );
        }
        debug!(
            "Symmetrized {} experimental orientations over {} operators ({} rejected)",
            data.ids.len(),
            repository.len(),
            data.rejected.len()
        );
        data
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Closest sampling point of one experimental image.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub id: u64,
    /// Reduced index of the closest sampling point.
    pub grid_index: u32,
    /// Cosine of the achieved angular distance.
    pub dot: f64,
    /// Symmetry operator that produced the match (0 = identity).
    pub operator: u32,
    /// Euler triple of the experimental image under that operator.
    pub symmetrized: EulerAngles,
}

impl Assignment {
    /// Achieved angular distance in radians.
    pub fn angular_distance(&self) -> f64 {
        angle_from_dot(self.dot)
    }
}

/// Result of matching a batch of experimental orientations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExperimentalAssignment {
    /// One entry per usable record, in input order.
    pub assignments: Vec<Assignment>,
    /// Records skipped as degenerate.
    pub rejected: Vec<RejectedOrientation>,
}

impl ExperimentalAssignment {
    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn get(&self, id: u64) -> Option<&Assignment> {
        self.assignments.iter().find(|a| a.id == id)
    }

    /// For each of `num_points` sampling points, the positions (in
    /// `assignments`) of the images whose closest point it is.
    pub fn images_per_point(&self, num_points: usize) -> Vec<Vec<usize>> {
        let mut out = vec![Vec::new(); num_points];
        for (pos, a) in self.assignments.iter().enumerate() {
            if let Some(slot) = out.get_mut(a.grid_index as usize) {
                slot.push(pos);
            }
        }
        out
    }

    /// Write one line per assignment:
    /// `id grid_index operator distance_deg rot tilt psi` (degrees).
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        writeln!(writer, "# id grid_index operator distance_deg rot tilt psi")?;
        for a in &self.assignments {
            let [rot, tilt, psi] = a.symmetrized.to_degrees();
            writeln!(
                writer,
                "{} {} {} {} {} {} {}",
                a.id,
                a.grid_index,
                a.operator,
                a.angular_distance().to_degrees(),
                rot,
                tilt,
                psi
            )?;
        }
        Ok(())
    }
}

fn check_grid(grid: &ReducedGrid) -> Result<()> {
    if grid.is_empty() {
        return Err(SamplingError::InconsistentState(
            "cannot assign orientations to an empty sampling grid",
        ));
    }
    Ok(())
}

/// Best `(grid index, dot)` for one direction; lowest index wins ties.
fn closest_point(grid_vecs: &[Vector3], dir: &Vector3) -> (usize, f64) {
    let mut best = (0, f64::NEG_INFINITY);
    for (i, v) in grid_vecs.iter().enumerate() {
        let d = v.dot(dir);
        if d > best.1 {
            best = (i, d);
        }
    }
    best
}

/// Assign precomputed experimental images to the reduced grid.
pub fn assign_symmetrized(
    data: &SymmetrizedExperimentalData,
    grid: &ReducedGrid,
) -> Result<ExperimentalAssignment> {
    check_grid(grid)?;
    let grid_vecs = grid.uvecs();

    let assignments = data
        .images
        .iter()
        .enumerate()
        .map(|(pos, images)| {
            // (operator, grid index, dot); strict comparison keeps the lowest
            // operator on ties.
            let (operator, grid_index, dot) = images.iter().enumerate().fold(
                (0, 0, f64::NEG_INFINITY),
                |best, (op, img)| {
                    let (idx, d) = closest_point(&grid_vecs, img);
                    if d > best.2 || (d == best.2 && idx < best.1) {
                        (op, idx, d)
                    } else {
                        best
                    }
                },
            );
            Assignment {
                id: data.ids[pos],
                grid_index: grid_index as u32,
                dot,
                operator: operator as u32,
                symmetrized: data.angles[pos][operator],
            }
        })
        .collect();

    Ok(ExperimentalAssignment {
        assignments,
        rejected: data.rejected.clone(),
    })
}

/// Find the closest reduced sampling point of every experimental
/// orientation, searching all symmetry-equivalent directions.
///
/// Degenerate records are skipped and listed in
/// [`ExperimentalAssignment::rejected`]; they do not abort the batch.
pub fn assign(
    experimental: &[ExperimentalOrientation],
    grid: &ReducedGrid,
    repository: &SymmetryRepository,
) -> Result<ExperimentalAssignment> {
    check_grid(grid)?;
    let data = SymmetrizedExperimentalData::new(experimental, repository);
    let result = assign_symmetrized(&data, grid)?;
    info!(
        "Assigned {} experimental orientations to {} sampling points ({} rejected)",
        result.len(),
        grid.len(),
        result.rejected.len()
    );
    Ok(result)
}

/// Drop the sampling points that no experimental image (over all symmetry
/// images) comes within `radius_rad` of.
///
/// The result is a new view over the same arena; dropped points are marked
/// [`Redundancy::Discarded`]. Points that stay keep their relative order, so
/// assignments to them are unchanged.
pub fn remove_points_far_away_from_experimental_data(
    data: &SymmetrizedExperimentalData,
    grid: &ReducedGrid,
    radius_rad: f64,
) -> Result<ReducedGrid> {
    if !(radius_rad.is_finite() && radius_rad > 0.0) {
        return Err(SamplingError::InvalidInput(format!(
            "neighborhood radius must be positive, got {radius_rad}"
        )));
    }
    let cos_radius = radius_rad.cos();
    let grid_vecs = grid.uvecs();

    let reduced = grid.retain(
        |pos| {
            let v = &grid_vecs[pos];
            data.images
                .iter()
                .any(|imgs| imgs.iter().any(|img| img.dot(v) >= cos_radius))
        },
        |_| Redundancy::Discarded,
    );
    info!(
        "Kept {} of {} sampling points within {:.3}° of experimental data",
        reduced.len(),
        grid.len(),
        radius_rad.to_degrees()
    );
    Ok(reduced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    use crate::grid::generate;
    use crate::reduce::remove_redundant;

    #[test]
    fn test_exact_grid_point_assigned_with_identity() {
        let grid = generate(10f64.to_radians(), (0.0, PI), true).unwrap();
        let repo = SymmetryRepository::from_descriptor("c4").unwrap();
        let reduced = remove_redundant(&grid, &repo, None).unwrap();
        let exp: Vec<_> = (0..reduced.len())
            .map(|i| ExperimentalOrientation::new(i as u64, reduced.point(i).angles))
            .collect();
        let result = assign(&exp, &reduced, &repo).unwrap();
        assert_eq!(result.len(), reduced.len());
        for (i, a) in result.assignments.iter().enumerate() {
            assert_eq!(a.grid_index as usize, i);
            assert_eq!(a.operator, 0);
            assert!((a.dot - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_symmetry_mate_found() {
        let grid = generate(10f64.to_radians(), (0.0, PI), true).unwrap();
        let repo = SymmetryRepository::from_descriptor("c4").unwrap();
        let reduced = remove_redundant(&grid, &repo, None).unwrap();
        // Rotate a kept point by 90° about z: it must come back through a
        // non-identity operator at distance zero.
        let p = reduced.point(3).angles;
        let rotated = EulerAngles::new(p.rot + PI / 2.0, p.tilt, 0.0);
        let result = assign(&[ExperimentalOrientation::new(9, rotated)], &reduced, &repo).unwrap();
        let a = &result.assignments[0];
        assert_eq!(a.grid_index, 3);
        assert_ne!(a.operator, 0);
        assert!(a.angular_distance() < 1e-6);
        assert!((a.symmetrized.direction() - reduced.uvec(3)).norm() < 1e-6);
    }

    #[test]
    fn test_degenerate_record_skipped() {
        let grid = ReducedGrid::identity(generate(20f64.to_radians(), (0.0, PI), false).unwrap());
        let repo = SymmetryRepository::from_descriptor("c1").unwrap();
        let exp = vec![
            ExperimentalOrientation::new(1, EulerAngles::from_degrees(10.0, 20.0, 0.0)),
            ExperimentalOrientation::new(2, EulerAngles::new(0.0, f64::NAN, 0.0)),
            ExperimentalOrientation::new(3, EulerAngles::from_degrees(-40.0, 120.0, 5.0)),
        ];
        let result = assign(&exp, &grid, &repo).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result.rejected.len(), 1);
        assert_eq!(result.rejected[0].id, 2);
        assert!(result.get(1).is_some() && result.get(3).is_some());
    }

    #[test]
    fn test_assignment_is_true_minimum() {
        let grid = ReducedGrid::identity(generate(15f64.to_radians(), (0.0, PI), false).unwrap());
        let repo = SymmetryRepository::from_descriptor("c1").unwrap();
        let angles = EulerAngles::from_degrees(33.0, 71.0, 0.0);
        let result = assign(&[ExperimentalOrientation::new(0, angles)], &grid, &repo).unwrap();
        let d = angles.direction();
        let best = grid
            .uvecs()
            .iter()
            .map(|v| v.dot(&d))
            .fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(result.assignments[0].dot, best);
    }

    #[test]
    fn test_images_per_point() {
        let grid = ReducedGrid::identity(generate(20f64.to_radians(), (0.0, PI), false).unwrap());
        let repo = SymmetryRepository::from_descriptor("c1").unwrap();
        let exp: Vec<_> = [0usize, 5, 5, 7]
            .iter()
            .enumerate()
            .map(|(id, &i)| ExperimentalOrientation::new(id as u64, grid.point(i).angles))
            .collect();
        let result = assign(&exp, &grid, &repo).unwrap();
        let per_point = result.images_per_point(grid.len());
        assert_eq!(per_point[0], vec![0]);
        assert_eq!(per_point[5], vec![1, 2]);
        assert_eq!(per_point[7], vec![3]);
        assert_eq!(per_point.iter().map(Vec::len).sum::<usize>(), 4);
    }

    #[test]
    fn test_write_table() {
        let grid = ReducedGrid::identity(generate(20f64.to_radians(), (0.0, PI), false).unwrap());
        let repo = SymmetryRepository::from_descriptor("c1").unwrap();
        let exp = vec![ExperimentalOrientation::new(
            42,
            EulerAngles::from_degrees(0.0, 0.0, 30.0),
        )];
        let result = assign(&exp, &grid, &repo).unwrap();
        let mut buf = Vec::new();
        result.write_to(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let rows: Vec<&str> = text.lines().filter(|l| !l.starts_with('#')).collect();
        assert_eq!(rows.len(), 1);
        let fields: Vec<f64> = rows[0]
            .split_whitespace()
            .map(|t| t.parse().unwrap())
            .collect();
        assert_eq!(fields.len(), 7);
        assert_eq!(fields[0], 42.0);
        assert_eq!(fields[1], 0.0);
        assert!(fields[3].abs() < 1e-9);
    }

    #[test]
    fn test_far_away_points_removed() {
        let grid = ReducedGrid::identity(generate(10f64.to_radians(), (0.0, PI), false).unwrap());
        let repo = SymmetryRepository::from_descriptor("c1").unwrap();
        let exp = vec![
            ExperimentalOrientation::new(0, EulerAngles::from_degrees(0.0, 0.0, 0.0)),
            ExperimentalOrientation::new(1, EulerAngles::from_degrees(90.0, 90.0, 0.0)),
        ];
        let data = SymmetrizedExperimentalData::new(&exp, &repo);
        let before = assign_symmetrized(&data, &grid).unwrap();
        let radius = 12f64.to_radians();
        let pruned = remove_points_far_away_from_experimental_data(&data, &grid, radius).unwrap();
        assert!(pruned.len() < grid.len());
        assert!(pruned.len() >= 2);
        let after = assign_symmetrized(&data, &pruned).unwrap();
        for (b, a) in before.assignments.iter().zip(&after.assignments) {
            assert_eq!(
                grid.original_index(b.grid_index as usize),
                pruned.original_index(a.grid_index as usize)
            );
            assert_eq!(a.dot, b.dot);
        }
        let discarded = pruned
            .map
            .entries
            .iter()
            .filter(|e| matches!(e, Redundancy::Discarded))
            .count();
        assert_eq!(discarded, grid.len() - pruned.len());
    }

    #[test]
    fn test_empty_grid_is_inconsistent() {
        let grid = ReducedGrid::identity(crate::grid::SamplingGrid::from_points(0.1, Vec::new()));
        let repo = SymmetryRepository::from_descriptor("c1").unwrap();
        let err = assign(&[], &grid, &repo).unwrap_err();
        assert!(matches!(err, SamplingError::InconsistentState(_)));
    }
}
