use std::path::Path;

use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};

use procam_core::{DeviceError, Intrinsics, ProjectiveDevice};

use crate::document::{Calibration, CalibrationDocument, CalibrationError, CalibrationLoadError};

/// Document key of a single projective device node.
pub const DEVICE_KEY: &str = "ProjectiveDevice";

/// Document key of a multi-device node (an array, indexed by camera id).
pub const DEVICE_LIST_KEY: &str = "ProjectiveDevices";

/// Persistable intrinsics (and optional extrinsics) of one projective
/// device.
///
/// This is the storage form of [`ProjectiveDevice`]: it can hold parameters
/// that would not construct a device (zero focal length from a blank file),
/// so conversion to a live device is fallible.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProjectiveDeviceCalibration {
    intrinsics: Intrinsics,
    extrinsics: Option<Matrix4<f64>>,
}

#[derive(Serialize, Deserialize)]
struct ExtrinsicsNode {
    #[serde(rename = "Rotation")]
    rotation: [[f64; 3]; 3],
    #[serde(rename = "Translation")]
    translation: [f64; 3],
}

#[derive(Serialize, Deserialize)]
struct DeviceNode {
    #[serde(rename = "Width")]
    width: u32,
    #[serde(rename = "Height")]
    height: u32,
    #[serde(rename = "Intrinsics")]
    intrinsics: [[f64; 3]; 3],
    #[serde(rename = "Extrinsics", skip_serializing_if = "Option::is_none")]
    extrinsics: Option<ExtrinsicsNode>,
}

impl Default for ProjectiveDeviceCalibration {
    fn default() -> Self {
        Self {
            intrinsics: Intrinsics {
                fx: 0.0,
                fy: 0.0,
                cx: 0.0,
                cy: 0.0,
                width: 0,
                height: 0,
                handles_distortion: false,
            },
            extrinsics: None,
        }
    }
}

impl ProjectiveDeviceCalibration {
    pub fn new(intrinsics: Intrinsics) -> Self {
        Self {
            intrinsics,
            extrinsics: None,
        }
    }

    pub fn from_device(device: &ProjectiveDevice) -> Self {
        Self {
            intrinsics: *device.intrinsics(),
            extrinsics: device.extrinsics().copied(),
        }
    }

    /// Construct a live device from the stored parameters.
    pub fn to_device(&self) -> Result<ProjectiveDevice, DeviceError> {
        let device = ProjectiveDevice::new(self.intrinsics)?;
        Ok(match self.extrinsics {
            Some(extrinsics) => device.with_extrinsics(extrinsics),
            None => device,
        })
    }

    pub fn intrinsics(&self) -> &Intrinsics {
        &self.intrinsics
    }

    pub fn set_intrinsics(&mut self, intrinsics: Intrinsics) {
        self.intrinsics = intrinsics;
    }

    pub fn extrinsics(&self) -> Option<&Matrix4<f64>> {
        self.extrinsics.as_ref()
    }

    pub fn set_extrinsics(&mut self, extrinsics: Option<Matrix4<f64>>) {
        self.extrinsics = extrinsics;
    }

    fn to_node(&self) -> DeviceNode {
        let k = self.intrinsics.matrix();
        let mut intrinsics = [[0.0; 3]; 3];
        for (i, row) in intrinsics.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = k[(i, j)];
            }
        }
        DeviceNode {
            width: self.intrinsics.width,
            height: self.intrinsics.height,
            intrinsics,
            extrinsics: self.extrinsics.map(|e| {
                let mut rotation = [[0.0; 3]; 3];
                for (i, row) in rotation.iter_mut().enumerate() {
                    for (j, cell) in row.iter_mut().enumerate() {
                        *cell = e[(i, j)];
                    }
                }
                ExtrinsicsNode {
                    rotation,
                    translation: [e[(0, 3)], e[(1, 3)], e[(2, 3)]],
                }
            }),
        }
    }

    fn apply_node(&mut self, node: &DeviceNode) {
        // Files carry pre-rectified images; the distortion flag is not
        // persisted and always loads as false.
        self.intrinsics = Intrinsics {
            fx: node.intrinsics[0][0],
            fy: node.intrinsics[1][1],
            cx: node.intrinsics[0][2],
            cy: node.intrinsics[1][2],
            width: node.width,
            height: node.height,
            handles_distortion: false,
        };
        self.extrinsics = node.extrinsics.as_ref().map(|e| {
            let mut m = Matrix4::identity();
            for (i, row) in e.rotation.iter().enumerate() {
                for (j, cell) in row.iter().enumerate() {
                    m[(i, j)] = *cell;
                }
            }
            m[(0, 3)] = e.translation[0];
            m[(1, 3)] = e.translation[1];
            m[(2, 3)] = e.translation[2];
            m
        });
    }
}

impl Calibration for ProjectiveDeviceCalibration {
    fn is_valid(&self) -> bool {
        self.intrinsics.fx > 0.0
            && self.intrinsics.fy > 0.0
            && self.intrinsics.width > 0
            && self.intrinsics.height > 0
    }

    fn serialize_into(&self, doc: &mut CalibrationDocument) -> Result<(), CalibrationError> {
        if !self.is_valid() {
            return Err(CalibrationError::NotValid { kind: "device" });
        }
        doc.insert_node(DEVICE_KEY, &self.to_node())
    }

    fn deserialize_from(&mut self, doc: &CalibrationDocument) -> Result<(), CalibrationLoadError> {
        let node: DeviceNode = doc.node(DEVICE_KEY)?;
        self.apply_node(&node);
        Ok(())
    }
}

/// Load one camera device from a calibration file.
///
/// Multi-camera files store their devices as an array under
/// `ProjectiveDevices` and `index` selects one of them; single-device files
/// store one node under `ProjectiveDevice` and only index 0 is valid.
pub fn load_camera_device(
    path: impl AsRef<Path>,
    index: usize,
) -> Result<ProjectiveDeviceCalibration, CalibrationLoadError> {
    let doc = CalibrationDocument::load_json(path)?;
    let mut calib = ProjectiveDeviceCalibration::default();
    if doc.has_node(DEVICE_LIST_KEY) {
        let nodes: Vec<DeviceNode> = doc.node(DEVICE_LIST_KEY)?;
        let node = nodes
            .get(index)
            .ok_or(CalibrationLoadError::DeviceIndexOutOfRange {
                index,
                count: nodes.len(),
            })?;
        calib.apply_node(node);
    } else {
        if index != 0 {
            return Err(CalibrationLoadError::DeviceIndexOutOfRange { index, count: 1 });
        }
        calib.deserialize_from(&doc)?;
    }
    Ok(calib)
}
