//! Removal of symmetry-redundant sampling points.
//!
//! Points are visited in generation order. A point is redundant when one of
//! its symmetry images lies closer than a threshold to a point that was
//! already kept; it is then merged into the lowest-index such point.
//!
//! The original grid is never modified. A [`ReducedGrid`] is a view over it
//! (arena + index list) together with a [`RedundancyMap`] recording, for
//! every original index, whether it was kept, merged or discarded.

use std::sync::Arc;

use rkyv::{Archive, Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, SamplingError};
use crate::geometry::SpherePoint;
use crate::grid::SamplingGrid;
use crate::symmetry::SymmetryRepository;
use crate::Vector3;

/// Fraction of the grid spacing under which two points are considered the
/// same direction.
pub const DEFAULT_REDUNDANCY_FACTOR: f64 = 0.8;

/// Fate of one original grid point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub enum Redundancy {
    /// Retained at position `reduced_index` of the reduced view.
    Kept { reduced_index: u32 },
    /// Equivalent to original point `into` through `operator` (and the
    /// antipodal map when `antipodal`).
    Merged {
        into: u32,
        operator: u32,
        antipodal: bool,
    },
    /// Dropped for reasons other than symmetry (far from experimental data).
    Discarded,
}

/// Per-original-index record of the reduction.
#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub struct RedundancyMap {
    pub entries: Vec<Redundancy>,
}

impl RedundancyMap {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, original: usize) -> Option<Redundancy> {
        self.entries.get(original).copied()
    }

    pub fn num_kept(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, Redundancy::Kept { .. }))
            .count()
    }

    pub fn num_merged(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, Redundancy::Merged { .. }))
            .count()
    }
}

/// A reduced view over a sampling grid.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct ReducedGrid {
    /// All generated points (the arena), shared by every view derived from
    /// this one.
    pub grid: Arc<SamplingGrid>,
    /// Original indices of the kept points, ascending.
    pub kept: Vec<u32>,
    /// Fate of every original point.
    pub map: RedundancyMap,
}

impl ReducedGrid {
    /// A view that keeps every point.
    pub fn identity(grid: SamplingGrid) -> Self {
        let n = grid.len();
        Self {
            kept: (0..n as u32).collect(),
            map: RedundancyMap {
                entries: (0..n as u32)
                    .map(|i| Redundancy::Kept { reduced_index: i })
                    .collect(),
            },
            grid: Arc::new(grid),
        }
    }

    /// Number of kept points.
    pub fn len(&self) -> usize {
        self.kept.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kept.is_empty()
    }

    pub fn spacing_rad(&self) -> f64 {
        self.grid.spacing_rad
    }

    /// Kept point at reduced position `idx`.
    #[inline]
    pub fn point(&self, idx: usize) -> &SpherePoint {
        &self.grid.points[self.kept[idx] as usize]
    }

    /// Unit vector of the kept point at reduced position `idx`.
    #[inline]
    pub fn uvec(&self, idx: usize) -> Vector3 {
        self.point(idx).uvec()
    }

    /// Unit vectors of all kept points, in reduced order.
    pub fn uvecs(&self) -> Vec<Vector3> {
        (0..self.len()).map(|i| self.uvec(i)).collect()
    }

    pub fn points(&self) -> impl Iterator<Item = &SpherePoint> + '_ {
        self.kept.iter().map(|&i| &self.grid.points[i as usize])
    }

    /// Original index of reduced position `idx`.
    pub fn original_index(&self, idx: usize) -> usize {
        self.kept[idx] as usize
    }

    /// Reduced position of an original index, if that point was kept.
    pub fn reduced_index(&self, original: usize) -> Option<usize> {
        match self.map.get(original)? {
            Redundancy::Kept { reduced_index } => Some(reduced_index as usize),
            _ => None,
        }
    }

    /// Reduced position representing an original index: the point itself if
    /// kept, otherwise the point it was (transitively) merged into.
    pub fn representative(&self, original: usize) -> Option<usize> {
        let mut current = original;
        for _ in 0..self.map.len() {
            match self.map.get(current)? {
                Redundancy::Kept { reduced_index } => return Some(reduced_index as usize),
                Redundancy::Merged { into, .. } => current = into as usize,
                Redundancy::Discarded => return None,
            }
        }
        None
    }

    /// Compact the kept points into a standalone grid.
    pub fn to_grid(&self) -> SamplingGrid {
        SamplingGrid::from_points(self.grid.spacing_rad, self.points().cloned().collect())
    }

    /// Keep only the reduced positions for which `keep` is true, marking
    /// the others with `dropped`.
    pub(crate) fn retain<F>(&self, mut keep: F, dropped: impl Fn(usize) -> Redundancy) -> Self
    where
        F: FnMut(usize) -> bool,
    {
        let mut entries = self.map.entries.clone();
        let mut kept = Vec::with_capacity(self.kept.len());
        for (pos, &orig) in self.kept.iter().enumerate() {
            if keep(pos) {
                entries[orig as usize] = Redundancy::Kept {
                    reduced_index: kept.len() as u32,
                };
                kept.push(orig);
            } else {
                entries[orig as usize] = dropped(pos);
            }
        }
        Self {
            grid: Arc::clone(&self.grid),
            kept,
            map: RedundancyMap { entries },
        }
    }
}

/// Remove points equivalent under `repository` to an earlier kept point.
///
/// Two points are equivalent when the angle between one of them and an
/// image of the other is below `threshold_rad` (`None` uses
/// 0.8 × grid spacing). Ties resolve to the lowest kept index, then the
/// lowest operator index.
pub fn remove_redundant(
    grid: &SamplingGrid,
    repository: &SymmetryRepository,
    threshold_rad: Option<f64>,
) -> Result<ReducedGrid> {
    let threshold = threshold_rad.unwrap_or(DEFAULT_REDUNDANCY_FACTOR * grid.spacing_rad);
    if !(threshold.is_finite() && threshold >= 0.0) {
        return Err(SamplingError::InvalidInput(format!(
            "redundancy threshold must be non-negative, got {threshold}"
        )));
    }
    let cos_threshold = threshold.cos();
    debug!(
        "Removing redundant points: {} points, {} operators, threshold {:.3}°",
        grid.len(),
        repository.len(),
        threshold.to_degrees()
    );

    let mut kept: Vec<u32> = Vec::new();
    let mut kept_vecs: Vec<Vector3> = Vec::new();
    let mut entries = Vec::with_capacity(grid.len());

    for (idx, point) in grid.points().iter().enumerate() {
        let images = repository.images(&point.uvec());
        let merge = kept_vecs.iter().enumerate().find_map(|(slot, q)| {
            images
                .iter()
                .position(|img| img.dot(q) > cos_threshold)
                .map(|op| (slot, op))
        });
        match merge {
            Some((slot, op)) => entries.push(Redundancy::Merged {
                into: kept[slot],
                operator: op as u32,
                antipodal: false,
            }),
            None => {
                entries.push(Redundancy::Kept {
                    reduced_index: kept.len() as u32,
                });
                kept.push(idx as u32);
                kept_vecs.push(point.uvec());
            }
        }
    }

    info!(
        "Symmetry {}: kept {} of {} sampling points",
        repository.group(),
        kept.len(),
        grid.len()
    );
    // The input grid is copied once into the arena; views derived with
    // `retain` share it.
    Ok(ReducedGrid {
        grid: Arc::new(grid.clone()),
        kept,
        map: RedundancyMap { entries },
    })
}

/// [`remove_redundant`] at `threshold_rad` followed by a pairwise rescan of
/// the kept points.
///
/// Each kept pair `(i, j)` with `i < j` is compared over all symmetry
/// images of `j` (and their antipodes when `hemisphere_only`); if any is
/// closer than 0.8 × spacing the later point `j` is dropped and recorded as
/// merged into `i`.
pub fn remove_redundant_exhaustive(
    grid: &SamplingGrid,
    repository: &SymmetryRepository,
    threshold_rad: Option<f64>,
    hemisphere_only: bool,
) -> Result<ReducedGrid> {
    let first = remove_redundant(grid, repository, threshold_rad)?;
    let cos_threshold = (DEFAULT_REDUNDANCY_FACTOR * grid.spacing_rad).cos();

    let vecs = first.uvecs();
    let mut survivors: Vec<usize> = Vec::with_capacity(vecs.len());
    let mut merged_into: Vec<Option<(usize, u32, bool)>> = vec![None; vecs.len()];

    for j in 0..vecs.len() {
        let images = repository.images(&vecs[j]);
        let hit = survivors.iter().find_map(|&i| {
            images.iter().enumerate().find_map(|(op, img)| {
                let d = img.dot(&vecs[i]);
                if d > cos_threshold {
                    Some((i, op as u32, false))
                } else if hemisphere_only && -d > cos_threshold {
                    Some((i, op as u32, true))
                } else {
                    None
                }
            })
        });
        match hit {
            Some(m) => merged_into[j] = Some(m),
            None => survivors.push(j),
        }
    }

    let removed = vecs.len() - survivors.len();
    let reduced = first.retain(
        |pos| merged_into[pos].is_none(),
        |pos| match merged_into[pos] {
            Some((i, operator, antipodal)) => Redundancy::Merged {
                into: first.kept[i],
                operator,
                antipodal,
            },
            None => Redundancy::Discarded,
        },
    );
    info!(
        "Exhaustive pass removed {} more points ({} kept)",
        removed,
        reduced.len()
    );
    Ok(reduced)
}
