//! Camera/projector calibration and planar marker-board pose tracking.
//!
//! This facade re-exports the workspace crates:
//!
//! - [`core`] — projective device model, plane model, geometry solver, and
//!   the one-euro scalar filter;
//! - [`calib`] — calibration document persistence and the incremental
//!   homography creator;
//! - [`track`] — the per-(board, camera) tracking state machine.

pub use procam_calib as calib;
pub use procam_core as core;
pub use procam_track as track;

pub use procam_calib::{
    Calibration, CalibrationDocument, CalibrationError, CalibrationLoadError, CameraConfiguration,
    HomographyCalibration, HomographyCreator, PlaneCalibration, PlaneProjectionCalibration,
    ProjectiveDeviceCalibration,
};
pub use procam_core::{Intrinsics, OneEuroFilter, Pose, ProjectiveDevice};
pub use procam_track::{CameraBoards, CameraId, MarkerBoard, MarkerDetector, TrackingTuning};
