use nalgebra::{Matrix4, Point3, Vector3};
use serde::{Deserialize, Serialize};

use procam_core::{PlaneModel, HEIGHT_NOT_SET};

use crate::document::{Calibration, CalibrationDocument, CalibrationError, CalibrationLoadError};

/// Document key of the plane node.
pub const PLANE_KEY: &str = "Plane";

/// Interaction height assigned to planes derived from a board pose.
pub const DEFAULT_PLANE_HEIGHT: f64 = 15.0;

/// Persistable wrapper around a [`PlaneModel`]: a touch/interaction surface
/// in camera space.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PlaneCalibration {
    model: Option<PlaneModel>,
}

#[derive(Serialize, Deserialize)]
struct VectorNode {
    x: f64,
    y: f64,
    z: f64,
}

#[derive(Serialize, Deserialize)]
struct PlaneNode {
    #[serde(rename = "Position")]
    position: VectorNode,
    #[serde(rename = "Normal")]
    normal: VectorNode,
    #[serde(rename = "Height")]
    height: f64,
}

impl PlaneCalibration {
    pub fn from_model(model: PlaneModel) -> Self {
        Self { model: Some(model) }
    }

    /// Derive the plane of a tracked board pose, the way a freshly detected
    /// board becomes a touch surface: plane through the board corners, the
    /// default interaction height, normal flipped to face the camera.
    pub fn from_board_pose(pose: &Matrix4<f64>, width: f64, height: f64) -> Option<Self> {
        let mut model = PlaneModel::from_pose_and_size(pose, width, height)?;
        model.set_height(DEFAULT_PLANE_HEIGHT);
        model.flip_normal();
        Some(Self::from_model(model))
    }

    pub fn model(&self) -> Option<&PlaneModel> {
        self.model.as_ref()
    }

    pub fn model_mut(&mut self) -> Option<&mut PlaneModel> {
        self.model.as_mut()
    }

    pub fn set_model(&mut self, model: PlaneModel) {
        self.model = Some(model);
    }
}

impl Calibration for PlaneCalibration {
    fn is_valid(&self) -> bool {
        self.model.as_ref().is_some_and(|m| m.has_height())
    }

    fn serialize_into(&self, doc: &mut CalibrationDocument) -> Result<(), CalibrationError> {
        if !self.is_valid() {
            return Err(CalibrationError::NotValid { kind: "plane" });
        }
        // is_valid checked both presence and height just above.
        let model = self.model.as_ref().unwrap();
        let position = model.point();
        let normal = model.normal();
        doc.insert_node(
            PLANE_KEY,
            &PlaneNode {
                position: VectorNode {
                    x: position.x,
                    y: position.y,
                    z: position.z,
                },
                normal: VectorNode {
                    x: normal.x,
                    y: normal.y,
                    z: normal.z,
                },
                height: model.height().unwrap_or(HEIGHT_NOT_SET),
            },
        )
    }

    fn deserialize_from(&mut self, doc: &CalibrationDocument) -> Result<(), CalibrationLoadError> {
        let node: PlaneNode = doc.node(PLANE_KEY)?;
        let normal = Vector3::new(node.normal.x, node.normal.y, node.normal.z);
        let mut model = PlaneModel::new(
            Point3::new(node.position.x, node.position.y, node.position.z),
            normal,
        )
        .ok_or_else(|| CalibrationLoadError::MalformedNode {
            key: PLANE_KEY,
            source: serde::de::Error::custom("plane normal has zero length"),
        })?;
        model.set_height(node.height);
        self.model = Some(model);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_plane() -> PlaneCalibration {
        let mut model =
            PlaneModel::new(Point3::new(1.0, 2.0, 300.0), Vector3::new(0.0, 0.0, 1.0))
                .expect("valid normal");
        model.set_height(12.5);
        PlaneCalibration::from_model(model)
    }

    #[test]
    fn serializing_incomplete_plane_is_a_checked_error() {
        let empty = PlaneCalibration::default();
        let mut doc = CalibrationDocument::new();
        assert!(matches!(
            empty.serialize_into(&mut doc),
            Err(CalibrationError::NotValid { kind: "plane" })
        ));
        assert!(doc.is_empty());
    }

    #[test]
    fn plane_without_height_is_invalid() {
        let model =
            PlaneModel::new(Point3::origin(), Vector3::z()).expect("valid normal");
        let calib = PlaneCalibration::from_model(model);
        assert!(!calib.is_valid());
    }

    #[test]
    fn plane_node_round_trips() {
        let original = sample_plane();
        let mut doc = CalibrationDocument::new();
        original.serialize_into(&mut doc).expect("valid");

        let mut loaded = PlaneCalibration::default();
        loaded.deserialize_from(&doc).expect("present");

        let a = original.model().expect("set");
        let b = loaded.model().expect("set");
        assert_relative_eq!(a.point(), b.point(), epsilon = 1e-12);
        assert_relative_eq!(a.normal(), b.normal(), epsilon = 1e-12);
        assert_eq!(a.height(), b.height());
    }

    #[test]
    fn from_board_pose_faces_the_camera() {
        // Board at z = 400, axes aligned with the camera frame.
        let pose = nalgebra::Matrix4::new(
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 400.0, //
            0.0, 0.0, 0.0, 1.0,
        );
        let calib = PlaneCalibration::from_board_pose(&pose, 297.0, 210.0).expect("non-degenerate");
        assert!(calib.is_valid());
        let model = calib.model().expect("set");
        assert_eq!(model.height(), Some(DEFAULT_PLANE_HEIGHT));
        // Flipped normal points back towards the camera at the origin.
        assert!(model.normal().z < 0.0);
    }
}
