//! Pipeline facade owning the configuration and every stage result.
//!
//! Stages run in order: repository → sampling points → redundancy removal →
//! neighbors. Assignment and the far-point filter need the repository and the
//! reduced grid. Calling a stage before its prerequisite returns
//! [`SamplingError::InconsistentState`]; re-running an early stage clears the
//! results that depended on it.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::Context;
use rkyv::{Archive, Deserialize, Serialize};
use tracing::info;

use crate::assign::{
    assign_symmetrized, remove_points_far_away_from_experimental_data, ExperimentalAssignment,
    ExperimentalOrientation, SymmetrizedExperimentalData,
};
use crate::error::{Result, SamplingError};
use crate::grid::{add_noise, generate, SamplingGrid};
use crate::neighbors::{
    build_neighbors, build_neighbors_with_symmetry, NeighborConfig, NeighborList,
};
use crate::persistence::{self, FormatOptions, SamplingFile};
use crate::reduce::{
    remove_redundant, remove_redundant_exhaustive, ReducedGrid, DEFAULT_REDUNDANCY_FACTOR,
};
use crate::symmetry::SymmetryRepository;

/// Sampling parameters. Angles are in degrees.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Target angular distance between neighboring sampling points.
    pub spacing_deg: f64,
    /// Point-group descriptor (`c1`, `d7`, `i3h`, ...).
    pub symmetry: String,
    /// Keep only one of each pair of antipodal directions.
    pub hemisphere_only: bool,
    pub min_tilt_deg: f64,
    pub max_tilt_deg: f64,
    /// Neighborhood radius; required for neighbor search and for the
    /// far-from-experimental-data filter.
    pub neighborhood_radius_deg: Option<f64>,
    /// Redundancy threshold as a fraction of `spacing_deg`.
    pub redundancy_factor: f64,
    /// Run the pairwise rescan after the greedy reduction.
    pub exhaustive: bool,
    /// Keep only the closest neighbor of each point.
    pub only_winner: bool,
    /// Record the in-plane angle of each neighbor.
    pub track_psi: bool,
    /// Gaussian perturbation of the generated directions.
    pub noise_deg: Option<f64>,
    pub noise_seed: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            spacing_deg: 5.0,
            symmetry: "c1".to_string(),
            hemisphere_only: false,
            min_tilt_deg: 0.0,
            max_tilt_deg: 180.0,
            neighborhood_radius_deg: None,
            redundancy_factor: DEFAULT_REDUNDANCY_FACTOR,
            exhaustive: false,
            only_winner: false,
            track_psi: false,
            noise_deg: None,
            noise_seed: 0,
        }
    }
}

impl SamplingConfig {
    pub fn spacing_rad(&self) -> f64 {
        self.spacing_deg.to_radians()
    }

    pub fn tilt_range_rad(&self) -> (f64, f64) {
        (self.min_tilt_deg.to_radians(), self.max_tilt_deg.to_radians())
    }

    fn radius_rad(&self) -> Result<f64> {
        self.neighborhood_radius_deg
            .map(f64::to_radians)
            .ok_or_else(|| SamplingError::InvalidInput("no neighborhood radius configured".into()))
    }
}

/// Furthest stage reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Empty,
    Generated,
    Reduced,
    Linked,
}

/// Stage results stored by [`SphereSampling::save_to_file`]. The symmetry
/// repository is rebuilt from the descriptor on load.
#[derive(Archive, Serialize, Deserialize)]
struct Snapshot {
    config: SamplingConfig,
    grid: Option<SamplingGrid>,
    reduced: Option<ReducedGrid>,
    neighbors: Option<NeighborList>,
}

impl Snapshot {
    fn from_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        // Archived data must be read from an aligned buffer.
        let mut aligned = rkyv::util::AlignedVec::<16>::with_capacity(bytes.len());
        aligned.extend_from_slice(bytes);
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(&aligned)
            .map_err(|e| anyhow::anyhow!("rkyv deserialization failed: {}", e))
    }
}

/// Orientation sampling of the projection sphere for one symmetry.
#[derive(Debug, Clone)]
pub struct SphereSampling {
    config: SamplingConfig,
    repository: Option<SymmetryRepository>,
    grid: Option<SamplingGrid>,
    reduced: Option<ReducedGrid>,
    neighbors: Option<NeighborList>,
}

impl SphereSampling {
    pub fn new(config: SamplingConfig) -> Self {
        Self {
            config,
            repository: None,
            grid: None,
            reduced: None,
            neighbors: None,
        }
    }

    /// Run repository, grid, reduction and (if a radius is configured)
    /// neighbor stages.
    pub fn build(config: SamplingConfig) -> Result<Self> {
        let mut sampling = Self::new(config);
        sampling.fill_repository()?;
        sampling.compute_sampling_points()?;
        sampling.remove_redundant_points()?;
        if sampling.config.neighborhood_radius_deg.is_some() {
            sampling.compute_neighbors()?;
        }
        Ok(sampling)
    }

    pub fn config(&self) -> &SamplingConfig {
        &self.config
    }

    pub fn repository(&self) -> Option<&SymmetryRepository> {
        self.repository.as_ref()
    }

    /// Full generated grid (before reduction).
    pub fn grid(&self) -> Option<&SamplingGrid> {
        self.grid.as_ref()
    }

    pub fn reduced(&self) -> Option<&ReducedGrid> {
        self.reduced.as_ref()
    }

    pub fn neighbors(&self) -> Option<&NeighborList> {
        self.neighbors.as_ref()
    }

    pub fn stage(&self) -> Stage {
        if self.neighbors.is_some() {
            Stage::Linked
        } else if self.reduced.is_some() {
            Stage::Reduced
        } else if self.grid.is_some() {
            Stage::Generated
        } else {
            Stage::Empty
        }
    }

    fn require_repository(&self) -> Result<&SymmetryRepository> {
        self.repository
            .as_ref()
            .ok_or(SamplingError::InconsistentState("symmetry repository not built"))
    }

    fn require_reduced(&self) -> Result<&ReducedGrid> {
        self.reduced
            .as_ref()
            .ok_or(SamplingError::InconsistentState("redundant points not removed"))
    }

    /// Parse the symmetry descriptor and build its L/R matrices.
    pub fn fill_repository(&mut self) -> Result<()> {
        let repository = SymmetryRepository::from_descriptor(&self.config.symmetry)?;
        if self.reduced.is_some() {
            self.reduced = None;
            self.neighbors = None;
        }
        self.repository = Some(repository);
        Ok(())
    }

    /// Generate the icosahedral grid, with optional noise.
    pub fn compute_sampling_points(&mut self) -> Result<()> {
        let mut grid = generate(
            self.config.spacing_rad(),
            self.config.tilt_range_rad(),
            self.config.hemisphere_only,
        )?;
        if let Some(noise_deg) = self.config.noise_deg {
            add_noise(&mut grid, noise_deg.to_radians(), self.config.noise_seed)?;
        }
        self.grid = Some(grid);
        self.reduced = None;
        self.neighbors = None;
        Ok(())
    }

    /// Remove the points equivalent under the configured symmetry.
    pub fn remove_redundant_points(&mut self) -> Result<()> {
        let grid = self
            .grid
            .as_ref()
            .ok_or(SamplingError::InconsistentState("sampling points not computed"))?;
        let repository = self.require_repository()?;
        let threshold = Some(self.config.redundancy_factor * grid.spacing_rad);
        let reduced = if self.config.exhaustive {
            remove_redundant_exhaustive(grid, repository, threshold, self.config.hemisphere_only)?
        } else {
            remove_redundant(grid, repository, threshold)?
        };
        self.reduced = Some(reduced);
        self.neighbors = None;
        Ok(())
    }

    /// Build the neighbor lists of the reduced points.
    pub fn compute_neighbors(&mut self) -> Result<()> {
        let reduced = self.require_reduced()?;
        let repository = self.require_repository()?;
        let radius_rad = self.config.radius_rad()?;
        let neighbors = if repository.len() == 1 && !self.config.track_psi {
            build_neighbors(reduced, radius_rad, self.config.only_winner)?
        } else {
            let config = NeighborConfig {
                radius_rad,
                only_winner: self.config.only_winner,
                track_psi: self.config.track_psi,
            };
            build_neighbors_with_symmetry(reduced, repository, &config)?
        };
        self.neighbors = Some(neighbors);
        Ok(())
    }

    /// Closest reduced point of every experimental orientation.
    pub fn find_closest_sampling_point(
        &self,
        experimental: &[ExperimentalOrientation],
    ) -> Result<ExperimentalAssignment> {
        let repository = self.require_repository()?;
        let reduced = self.require_reduced()?;
        let data = SymmetrizedExperimentalData::new(experimental, repository);
        let result = assign_symmetrized(&data, reduced)?;
        info!(
            "Assigned {} experimental orientations ({} rejected)",
            result.len(),
            result.rejected.len()
        );
        Ok(result)
    }

    /// Drop the reduced points farther than the neighborhood radius from
    /// every experimental direction. Neighbor lists must be recomputed
    /// afterwards.
    pub fn remove_points_far_away_from_experimental_data(
        &mut self,
        experimental: &[ExperimentalOrientation],
    ) -> Result<()> {
        let repository = self.require_repository()?;
        let reduced = self.require_reduced()?;
        let radius_rad = self.config.radius_rad()?;
        let data = SymmetrizedExperimentalData::new(experimental, repository);
        let pruned = remove_points_far_away_from_experimental_data(&data, reduced, radius_rad)?;
        self.reduced = Some(pruned);
        self.neighbors = None;
        Ok(())
    }

    fn format_options(&self) -> FormatOptions {
        FormatOptions {
            track_psi: self.config.track_psi,
            write_vectors: true,
        }
    }

    /// Write the reduced points and their neighbor lists as ASCII.
    pub fn save_sampling_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        let reduced = self.require_reduced()?;
        let neighbors = self
            .neighbors
            .as_ref()
            .ok_or(SamplingError::InconsistentState("neighbors not computed"))?;
        let file = File::create(path)
            .with_context(|| format!("creating sampling file {}", path.display()))?;
        let writer = BufWriter::new(file);
        persistence::save_sampling_file(writer, reduced, neighbors, self.format_options())
            .with_context(|| format!("writing sampling file {}", path.display()))?;
        info!("Saved sampling file {} ({} points)", path.display(), reduced.len());
        Ok(())
    }

    /// Replace the reduced points and neighbor lists with the contents of a
    /// file written by [`save_sampling_file`](Self::save_sampling_file) with
    /// the same `track_psi` setting. The symmetry repository is built from
    /// the configuration if it is not there yet.
    pub fn read_sampling_file<P: AsRef<Path>>(&mut self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        if self.repository.is_none() {
            self.repository = Some(SymmetryRepository::from_descriptor(&self.config.symmetry)?);
        }
        let file = File::open(path)
            .with_context(|| format!("opening sampling file {}", path.display()))?;
        let SamplingFile { mut neighbors, points } =
            persistence::read_sampling_file(BufReader::new(file), self.format_options())
                .with_context(|| format!("reading sampling file {}", path.display()))?;
        let points = points.ok_or(SamplingError::InconsistentState(
            "sampling file carries no vectors",
        ))?;
        neighbors.radius_rad = self.config.neighborhood_radius_deg.unwrap_or(0.0).to_radians();

        let grid = SamplingGrid::from_points(self.config.spacing_rad(), points);
        self.reduced = Some(ReducedGrid::identity(grid.clone()));
        self.grid = Some(grid);
        self.neighbors = Some(neighbors);
        info!("Loaded sampling file {} ({} points)", path.display(), self.stage_len());
        Ok(())
    }

    /// List the reduced points (`index rot tilt x y z`).
    pub fn save_asym_unit<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        let reduced = self.require_reduced()?;
        let file = File::create(path)
            .with_context(|| format!("creating asymmetric unit file {}", path.display()))?;
        persistence::write_asym_unit(BufWriter::new(file), reduced)
            .with_context(|| format!("writing asymmetric unit file {}", path.display()))?;
        Ok(())
    }

    fn stage_len(&self) -> usize {
        self.reduced.as_ref().map_or(0, ReducedGrid::len)
    }

    /// Serialize configuration and stage results using rkyv.
    pub fn to_rkyv_bytes(&self) -> anyhow::Result<Vec<u8>> {
        let snapshot = Snapshot {
            config: self.config.clone(),
            grid: self.grid.clone(),
            reduced: self.reduced.clone(),
            neighbors: self.neighbors.clone(),
        };
        let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(&snapshot)
            .map_err(|e| anyhow::anyhow!("rkyv serialization failed: {}", e))?;
        Ok(bytes.to_vec())
    }

    /// Save a binary snapshot of the pipeline.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        let bytes = self.to_rkyv_bytes()?;
        std::fs::write(path, &bytes)
            .with_context(|| format!("writing snapshot {}", path.display()))?;
        info!("Saved sampling snapshot to {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    /// Load a snapshot written by [`save_to_file`](Self::save_to_file).
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .with_context(|| format!("reading snapshot {}", path.display()))?;
        let snapshot = Snapshot::from_bytes(&bytes)?;
        let repository = SymmetryRepository::from_descriptor(&snapshot.config.symmetry)?;
        let sampling = Self {
            config: snapshot.config,
            repository: Some(repository),
            grid: snapshot.grid,
            reduced: snapshot.reduced,
            neighbors: snapshot.neighbors,
        };
        info!(
            "Loaded sampling snapshot: symmetry {}, {} points, stage {:?}",
            sampling.config.symmetry,
            sampling.stage_len(),
            sampling.stage()
        );
        Ok(sampling)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SamplingConfig {
        SamplingConfig {
            spacing_deg: 15.0,
            symmetry: "c2".into(),
            hemisphere_only: true,
            neighborhood_radius_deg: Some(20.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_stage_order_enforced() {
        let mut s = SphereSampling::new(config());
        assert_eq!(s.stage(), Stage::Empty);
        assert!(matches!(
            s.remove_redundant_points(),
            Err(SamplingError::InconsistentState(_))
        ));
        assert!(matches!(
            s.compute_neighbors(),
            Err(SamplingError::InconsistentState(_))
        ));
        assert!(matches!(
            s.find_closest_sampling_point(&[]),
            Err(SamplingError::InconsistentState(_))
        ));
        s.compute_sampling_points().unwrap();
        assert_eq!(s.stage(), Stage::Generated);
        // Grid exists but the repository does not.
        assert!(matches!(
            s.remove_redundant_points(),
            Err(SamplingError::InconsistentState(_))
        ));
        s.fill_repository().unwrap();
        s.remove_redundant_points().unwrap();
        assert_eq!(s.stage(), Stage::Reduced);
        s.compute_neighbors().unwrap();
        assert_eq!(s.stage(), Stage::Linked);
        s.compute_sampling_points().unwrap();
        assert_eq!(s.stage(), Stage::Generated);
    }

    #[test]
    fn test_missing_radius_is_invalid_input() {
        let mut s = SphereSampling::new(SamplingConfig {
            neighborhood_radius_deg: None,
            ..config()
        });
        s.fill_repository().unwrap();
        s.compute_sampling_points().unwrap();
        s.remove_redundant_points().unwrap();
        assert!(s.compute_neighbors().unwrap_err().is_invalid_input());
    }

    #[test]
    fn test_bad_symmetry_rejected() {
        let mut s = SphereSampling::new(SamplingConfig {
            symmetry: "x3".into(),
            ..config()
        });
        assert!(matches!(
            s.fill_repository(),
            Err(SamplingError::UnknownSymmetry(_))
        ));
    }

    #[test]
    fn test_exhaustive_uses_redundancy_factor() {
        let cfg = SamplingConfig {
            spacing_deg: 10.0,
            symmetry: "c4".into(),
            hemisphere_only: false,
            redundancy_factor: 0.5,
            exhaustive: true,
            ..Default::default()
        };
        let s = SphereSampling::build(cfg.clone()).unwrap();
        let grid = s.grid().unwrap();
        let repo = s.repository().unwrap();
        let direct =
            remove_redundant_exhaustive(grid, repo, Some(0.5 * grid.spacing_rad), false).unwrap();
        assert_eq!(s.reduced().unwrap().kept, direct.kept);

        let greedy = SphereSampling::build(SamplingConfig {
            exhaustive: false,
            ..cfg
        })
        .unwrap();
        assert!(s.reduced().unwrap().len() < greedy.reduced().unwrap().len());
    }

    #[test]
    fn test_snapshot_bytes_roundtrip() {
        let s = SphereSampling::build(config()).unwrap();
        let bytes = s.to_rkyv_bytes().unwrap();
        let back = Snapshot::from_bytes(&bytes).unwrap();
        assert_eq!(back.config, *s.config());
        assert_eq!(back.reduced.as_ref(), s.reduced());
        assert_eq!(back.neighbors.as_ref(), s.neighbors());
    }
}
