//! # sphere-sampling
//!
//! Orientation sampling of the **projection sphere** for single-particle
//! cryo-EM reconstruction.
//!
//! Every 2D projection of a particle is characterized by a projection
//! direction (a point on the unit sphere) and an in-plane rotation. This crate
//! discretizes the sphere of directions into a near-uniform grid, folds it
//! into the asymmetric unit of the particle's point group, links neighboring
//! directions and matches experimental orientations to their closest grid
//! point.
//!
//! ## Features
//!
//! - **Icosahedral grid**: recursive subdivision of the icosahedron with
//!   great-circle interpolation, `10 n² + 2` points, deterministic order
//! - **Point groups**: Cn, Ci, Cs, Cnv, Cnh, Sn, Dn, Dnv, Dnh, T, Td, Th, O, Oh,
//!   I (four settings) and Ih, enumerated as L/R matrix repositories
//! - **Redundancy removal**: greedy symmetry reduction plus an exhaustive
//!   pairwise pass, with a full original → reduced index map
//! - **Neighbor graph**: dot-product neighbor lists, optionally folded over the
//!   symmetry group with in-plane angle tracking
//! - **Assignment**: closest sampling point of each experimental orientation
//!   over all its symmetry mates
//! - **Persistence**: ASCII sampling files and [rkyv](https://docs.rs/rkyv)
//!   snapshots of the whole pipeline
//!
//! ## Example
//!
//! ```no_run
//! use sphere_sampling::{EulerAngles, ExperimentalOrientation, SamplingConfig, SphereSampling};
//!
//! let config = SamplingConfig {
//!     spacing_deg: 5.0,
//!     symmetry: "d7".into(),
//!     hemisphere_only: true,
//!     neighborhood_radius_deg: Some(10.0),
//!     ..Default::default()
//! };
//! let sampling = SphereSampling::build(config).unwrap();
//! println!("{} points in the asymmetric unit", sampling.reduced().unwrap().len());
//!
//! let images = vec![
//!     ExperimentalOrientation::new(1, EulerAngles::from_degrees(12.0, 48.0, 130.0)),
//!     ExperimentalOrientation::new(2, EulerAngles::from_degrees(-75.0, 101.0, 3.0)),
//! ];
//! let result = sampling.find_closest_sampling_point(&images).unwrap();
//! for a in &result.assignments {
//!     println!("image {} -> point {} ({:.2}°)", a.id, a.grid_index,
//!         a.angular_distance().to_degrees());
//! }
//!
//! sampling.save_sampling_file("sampling.txt").unwrap();
//! sampling.save_to_file("sampling.rkyv").unwrap();
//! ```
//!
//! ## Conventions
//!
//! Euler angles are ZYZ `(rot, tilt, psi)` in radians; the projection
//! direction is the third row of the Euler matrix. Configuration is given in
//! degrees.

pub mod assign;
pub mod error;
pub mod geometry;
pub mod grid;
pub mod neighbors;
pub mod persistence;
pub mod reduce;
pub mod sampling;
pub mod symmetry;

pub use assign::{
    assign, remove_points_far_away_from_experimental_data, Assignment, ExperimentalAssignment,
    ExperimentalOrientation, RejectedOrientation, SymmetrizedExperimentalData,
};
pub use error::{Result, SamplingError};
pub use geometry::{EulerAngles, SpherePoint};
pub use grid::{generate, SamplingGrid};
pub use neighbors::{
    build_neighbors, build_neighbors_with_symmetry, Neighbor, NeighborConfig, NeighborList,
};
pub use persistence::{read_sampling_file, save_sampling_file, FormatOptions, SamplingFile};
pub use reduce::{
    remove_redundant, remove_redundant_exhaustive, Redundancy, RedundancyMap, ReducedGrid,
};
pub use sampling::{SamplingConfig, SphereSampling, Stage};
pub use symmetry::{SymmetryGroup, SymmetryRepository};

// Commonly used types
// Double precision throughout: grid vectors must stay unit length within 1e-9.
pub type Vector3 = nalgebra::Vector3<f64>;
pub type Matrix3 = nalgebra::Matrix3<f64>;
