use serde::{Deserialize, Serialize};

use crate::document::{Calibration, CalibrationDocument, CalibrationError, CalibrationLoadError};

/// Document key of the camera configuration node.
pub const CAMERA_KEY: &str = "Camera";

/// Capture backend tag. Capture itself is outside this engine; the tag only
/// tells the embedding application which driver to instantiate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraType {
    #[default]
    OpenCv,
    Processing,
    OpenKinect,
    FlyCapture,
}

/// Which camera an application should open: a device name/description plus
/// the backend tag.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CameraConfiguration {
    name: String,
    camera_type: CameraType,
}

#[derive(Serialize, Deserialize)]
struct CameraNode {
    #[serde(rename = "CameraName")]
    name: String,
    #[serde(rename = "CameraType")]
    camera_type: CameraType,
}

impl CameraConfiguration {
    pub fn new(name: impl Into<String>, camera_type: CameraType) -> Self {
        Self {
            name: name.into(),
            camera_type,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn camera_type(&self) -> CameraType {
        self.camera_type
    }

    pub fn set_camera_type(&mut self, camera_type: CameraType) {
        self.camera_type = camera_type;
    }
}

impl Calibration for CameraConfiguration {
    /// A camera configuration has no invalid states: the type is a closed
    /// enum and any name string is permitted.
    fn is_valid(&self) -> bool {
        true
    }

    fn serialize_into(&self, doc: &mut CalibrationDocument) -> Result<(), CalibrationError> {
        doc.insert_node(
            CAMERA_KEY,
            &CameraNode {
                name: self.name.clone(),
                camera_type: self.camera_type,
            },
        )
    }

    fn deserialize_from(&mut self, doc: &CalibrationDocument) -> Result<(), CalibrationLoadError> {
        let node: CameraNode = doc.node(CAMERA_KEY)?;
        self.name = node.name;
        self.camera_type = node.camera_type;
        Ok(())
    }
}
