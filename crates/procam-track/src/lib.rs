//! Marker-board pose tracking.
//!
//! A [`MarkerBoard`] owns one tracking slot per registered camera: the
//! current pose, an optional bank of one-euro filters, and a gating mode
//! (`Normal` / `BlockUpdate` / `ForceUpdate`). Each frame the caller hands
//! the slot's detector output through [`MarkerBoard::update_position`]; the
//! board converts correspondences to a pose via a
//! [`procam_core::ProjectiveDevice`], applies the gating policy, and commits
//! the (optionally filtered) result. Marker detection itself stays behind
//! the [`MarkerDetector`] trait.

mod board;
mod detector;
mod filter_bank;
mod registry;
mod tuning;

pub use board::{CameraId, GatingMode, MarkerBoard, TrackError};
pub use detector::{Correspondence, Detection, DetectorKind, Frame, MarkerDetector};
pub use filter_bank::PoseFilterBank;
pub use registry::CameraBoards;
pub use tuning::TrackingTuning;
