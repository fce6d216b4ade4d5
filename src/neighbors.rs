//! Neighbor graph over the reduced sampling points.
//!
//! Distances are stored as dot products (cosines) so downstream comparisons
//! need no inverse trigonometry. The search is a plain O(n²) scan; grids are
//! thousands of points, not millions.

use rkyv::{Archive, Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, SamplingError};
use crate::reduce::ReducedGrid;
use crate::symmetry::SymmetryRepository;

/// One entry of a neighbor list.
#[derive(Debug, Clone, Copy, PartialEq, Archive, Serialize, Deserialize)]
pub struct Neighbor {
    /// Reduced index of the neighbor.
    pub index: u32,
    /// Cosine of the angular distance.
    pub dot: f64,
    /// In-plane angle (radians) of the neighbor after the symmetry operator
    /// that brought it closest. Zero unless psi tracking is enabled.
    pub psi: f64,
}

/// Neighbors of every reduced sampling point.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct NeighborList {
    /// Angular radius used to build the list (radians).
    pub radius_rad: f64,
    /// Whether `psi` values are meaningful.
    pub track_psi: bool,
    /// `lists[i]` holds the neighbors of point `i`, ordered by index.
    pub lists: Vec<Vec<Neighbor>>,
}

impl NeighborList {
    /// Number of sampling points covered.
    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    pub fn neighbors_of(&self, idx: usize) -> &[Neighbor] {
        &self.lists[idx]
    }

    /// Total number of (directed) neighbor entries.
    pub fn num_edges(&self) -> usize {
        self.lists.iter().map(Vec::len).sum()
    }
}

/// Parameters for [`build_neighbors_with_symmetry`].
#[derive(Debug, Clone)]
pub struct NeighborConfig {
    /// Neighborhood radius in radians.
    pub radius_rad: f64,
    /// Keep only the single closest neighbor of each point.
    pub only_winner: bool,
    /// Record the in-plane angle induced by the winning symmetry operator.
    pub track_psi: bool,
}

impl Default for NeighborConfig {
    fn default() -> Self {
        Self {
            radius_rad: 0.0,
            only_winner: false,
            track_psi: false,
        }
    }
}

fn check_radius(radius_rad: f64) -> Result<()> {
    if !(radius_rad.is_finite() && radius_rad > 0.0) {
        return Err(SamplingError::InvalidInput(format!(
            "neighborhood radius must be positive, got {radius_rad}"
        )));
    }
    Ok(())
}

/// For every point `i`, every other point `j` with `acos(v_i · v_j) ≤ radius`.
///
/// With `only_winner`, each point keeps just its closest neighbor (lowest
/// index on ties), and nothing when no point lies within the radius.
pub fn build_neighbors(
    grid: &ReducedGrid,
    radius_rad: f64,
    only_winner: bool,
) -> Result<NeighborList> {
    check_radius(radius_rad)?;
    let cos_radius = radius_rad.cos();
    let vecs = grid.uvecs();

    let lists: Vec<Vec<Neighbor>> = vecs
        .iter()
        .enumerate()
        .map(|(i, vi)| {
            let found = vecs
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .map(|(j, vj)| Neighbor {
                    index: j as u32,
                    dot: vi.dot(vj),
                    psi: 0.0,
                })
                .filter(|n| n.dot >= cos_radius);
            collect_neighbors(found, only_winner)
        })
        .collect();

    let list = NeighborList {
        radius_rad,
        track_psi: false,
        lists,
    };
    info!(
        "Neighbor graph: {} points, {} entries within {:.3}°",
        list.len(),
        list.num_edges(),
        radius_rad.to_degrees()
    );
    Ok(list)
}

/// Neighbor search folding in symmetry: the distance from `i` to `j` is the
/// smallest over the images `L_k · v_j`.
///
/// Points near the border of the asymmetric unit thereby see their
/// neighbors across the border. With `track_psi`, the psi of `j`'s Euler
/// triple under the winning operator is stored.
pub fn build_neighbors_with_symmetry(
    grid: &ReducedGrid,
    repository: &SymmetryRepository,
    config: &NeighborConfig,
) -> Result<NeighborList> {
    check_radius(config.radius_rad)?;
    let cos_radius = config.radius_rad.cos();
    let vecs = grid.uvecs();
    let images: Vec<Vec<_>> = vecs.iter().map(|v| repository.images(v)).collect();
    debug!(
        "Symmetric neighbor search over {} points x {} operators",
        vecs.len(),
        repository.len()
    );

    let lists: Vec<Vec<Neighbor>> = vecs
        .iter()
        .enumerate()
        .map(|(i, vi)| {
            let found = images
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .filter_map(|(j, imgs_j)| {
                    let (op, dot) = imgs_j
                        .iter()
                        .map(|img| vi.dot(img))
                        .enumerate()
                        .fold((0, f64::NEG_INFINITY), |best, (op, d)| {
                            if d > best.1 {
                                (op, d)
                            } else {
                                best
                            }
                        });
                    if dot < cos_radius {
                        return None;
                    }
                    let psi = if config.track_psi {
                        repository.apply_to_angles(op, &grid.point(j).angles).psi
                    } else {
                        0.0
                    };
                    Some(Neighbor {
                        index: j as u32,
                        dot,
                        psi,
                    })
                });
            collect_neighbors(found, config.only_winner)
        })
        .collect();

    let list = NeighborList {
        radius_rad: config.radius_rad,
        track_psi: config.track_psi,
        lists,
    };
    info!(
        "Neighbor graph ({}): {} points, {} entries within {:.3}°",
        repository.group(),
        list.len(),
        list.num_edges(),
        config.radius_rad.to_degrees()
    );
    Ok(list)
}

fn collect_neighbors(found: impl Iterator<Item = Neighbor>, only_winner: bool) -> Vec<Neighbor> {
    if !only_winner {
        return found.collect();
    }
    let mut winner: Option<Neighbor> = None;
    for n in found {
        if winner.map_or(true, |w| n.dot > w.dot) {
            winner = Some(n);
        }
    }
    winner.into_iter().collect()
}
