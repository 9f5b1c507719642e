//! Core geometry for procam tracking.
//!
//! This crate is intentionally small and purely geometric. It does *not*
//! depend on any concrete marker detector, image type, or file format:
//! the projective device model, the plane model, the geometry solver, and
//! the scalar one-euro filter all operate on plain `nalgebra` values.

mod device;
mod filter;
mod logger;
mod plane;
mod solver;
mod transform;

pub use device::{DeviceError, Intrinsics, ProjectiveDevice};
pub use filter::{FilterError, OneEuroFilter, OneEuroParams};
pub use logger::init_with_level;
pub use plane::{PlaneModel, HEIGHT_NOT_SET};
pub use solver::{DltSolver, GeometrySolver, PoseAlgorithm, SolverError};
pub use transform::{pose_from_parts, position_of, rotation_of, set_position};

/// A 6-DoF pose: rotation and translation embedded in a 4x4 matrix with the
/// last row fixed to `[0, 0, 0, 1]`.
pub type Pose = nalgebra::Matrix4<f64>;
