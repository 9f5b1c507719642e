use nalgebra::{Matrix4, Point3};
use serde::{Deserialize, Serialize};

use crate::document::{Calibration, CalibrationDocument, CalibrationError, CalibrationLoadError};

/// Document key of the homography node.
pub const HOMOGRAPHY_KEY: &str = "Homography";

/// A solved projective transform in the pose-like 4x4 shape used across the
/// engine, with its inverse computed once and cached.
///
/// The calibration is valid only once the inverse exists: a singular matrix
/// never becomes valid and is never persisted.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HomographyCalibration {
    matrix: Matrix4<f64>,
    inverse: Option<Matrix4<f64>>,
}

#[derive(Serialize, Deserialize)]
struct HomographyNode {
    #[serde(rename = "Matrix")]
    matrix: [[f64; 4]; 4],
}

impl Default for HomographyCalibration {
    fn default() -> Self {
        Self {
            matrix: Matrix4::identity(),
            inverse: None,
        }
    }
}

impl HomographyCalibration {
    pub fn from_matrix(matrix: Matrix4<f64>) -> Self {
        let mut out = Self::default();
        out.set_matrix(matrix);
        out
    }

    /// Install a new transform and recompute the cached inverse.
    pub fn set_matrix(&mut self, matrix: Matrix4<f64>) {
        self.matrix = matrix;
        self.inverse = matrix.try_inverse();
    }

    pub fn matrix(&self) -> &Matrix4<f64> {
        &self.matrix
    }

    pub fn inverse(&self) -> Option<&Matrix4<f64>> {
        self.inverse.as_ref()
    }

    /// Apply the transform to a point (homogeneous divide included).
    pub fn apply(&self, point: &Point3<f64>) -> Point3<f64> {
        self.matrix.transform_point(point)
    }

    /// Apply the cached inverse, or `None` while invalid.
    pub fn apply_inverse(&self, point: &Point3<f64>) -> Option<Point3<f64>> {
        self.inverse.map(|inv| inv.transform_point(point))
    }
}

impl Calibration for HomographyCalibration {
    fn is_valid(&self) -> bool {
        self.inverse.is_some()
    }

    fn serialize_into(&self, doc: &mut CalibrationDocument) -> Result<(), CalibrationError> {
        if !self.is_valid() {
            return Err(CalibrationError::NotValid { kind: "homography" });
        }
        let mut rows = [[0.0; 4]; 4];
        for (i, row) in rows.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = self.matrix[(i, j)];
            }
        }
        doc.insert_node(HOMOGRAPHY_KEY, &HomographyNode { matrix: rows })
    }

    fn deserialize_from(&mut self, doc: &CalibrationDocument) -> Result<(), CalibrationLoadError> {
        let node: HomographyNode = doc.node(HOMOGRAPHY_KEY)?;
        let mut matrix = Matrix4::zeros();
        for (i, row) in node.matrix.iter().enumerate() {
            for (j, cell) in row.iter().enumerate() {
                matrix[(i, j)] = *cell;
            }
        }
        self.set_matrix(matrix);
        Ok(())
    }
}
