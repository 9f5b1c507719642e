//! Calibration persistence for procam tracking.
//!
//! A calibration document is a flat collection of named nodes (`Camera`,
//! `Plane`, `Homography`, `ProjectiveDevice`); each [`Calibration`] variant
//! knows how to validate itself and to serialize into / deserialize from its
//! node. Composites own their constituents and persist all-or-nothing.

mod camera;
mod creator;
mod device;
mod document;
mod homography;
mod plane;
mod plane_projection;

pub use camera::{CameraConfiguration, CameraType, CAMERA_KEY};
pub use creator::{HomographyCreator, HomographyCreatorError, HomographyDim};
pub use device::{load_camera_device, ProjectiveDeviceCalibration, DEVICE_KEY, DEVICE_LIST_KEY};
pub use document::{Calibration, CalibrationDocument, CalibrationError, CalibrationLoadError, DocumentError};
pub use homography::{HomographyCalibration, HOMOGRAPHY_KEY};
pub use plane::{PlaneCalibration, DEFAULT_PLANE_HEIGHT, PLANE_KEY};
pub use plane_projection::PlaneProjectionCalibration;
