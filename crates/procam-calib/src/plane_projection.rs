use nalgebra::Point3;

use crate::document::{Calibration, CalibrationDocument, CalibrationError, CalibrationLoadError};
use crate::homography::HomographyCalibration;
use crate::plane::PlaneCalibration;

/// Composite calibration: a touch plane plus the homography that maps the
/// plane into the target (projector/display) space.
///
/// Valid iff both constituents are valid; persisting is all-or-nothing, so a
/// document never ends up with only one of the two nodes from this
/// composite.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PlaneProjectionCalibration {
    plane: PlaneCalibration,
    homography: HomographyCalibration,
}

impl PlaneProjectionCalibration {
    pub fn new(plane: PlaneCalibration, homography: HomographyCalibration) -> Self {
        Self { plane, homography }
    }

    pub fn plane(&self) -> &PlaneCalibration {
        &self.plane
    }

    pub fn plane_mut(&mut self) -> &mut PlaneCalibration {
        &mut self.plane
    }

    pub fn homography(&self) -> &HomographyCalibration {
        &self.homography
    }

    pub fn set_plane(&mut self, plane: PlaneCalibration) {
        self.plane = plane;
    }

    pub fn set_homography(&mut self, homography: HomographyCalibration) {
        self.homography = homography;
    }

    /// Project a camera-space point into the calibrated target space.
    ///
    /// The point is first dropped orthogonally onto the plane, then mapped
    /// through the homography; x and y are divided by the resulting z. The
    /// output z is deliberately *not* that normalized coordinate: it is the
    /// metric plane distance of the original input point, so callers get a
    /// normalized image-plane position alongside a physical height above the
    /// surface.
    ///
    /// # Panics
    ///
    /// Panics when the composite is not valid.
    pub fn project(&self, point: &Point3<f64>) -> Point3<f64> {
        assert!(self.is_valid(), "projecting through an incomplete calibration");
        // Validity implies both the model and its height are set.
        let plane = self.plane.model().unwrap();
        let mapped = self.homography.apply(&plane.project_point(point));
        Point3::new(
            mapped.x / mapped.z,
            mapped.y / mapped.z,
            plane.distance_to(point),
        )
    }

    /// Plane distance of a camera-space point.
    ///
    /// # Panics
    ///
    /// Panics when the plane constituent is not valid.
    pub fn distance_to(&self, point: &Point3<f64>) -> f64 {
        assert!(self.plane.is_valid(), "plane calibration not set");
        self.plane.model().unwrap().distance_to(point)
    }

    /// Whether the point is on the plane's interaction side and within its
    /// height band.
    ///
    /// # Panics
    ///
    /// Panics when the plane constituent is not valid.
    pub fn touches_surface(&self, point: &Point3<f64>) -> bool {
        assert!(self.plane.is_valid(), "plane calibration not set");
        self.plane
            .model()
            .unwrap()
            .has_good_orientation_and_distance(point)
    }
}

impl Calibration for PlaneProjectionCalibration {
    fn is_valid(&self) -> bool {
        self.plane.is_valid() && self.homography.is_valid()
    }

    fn serialize_into(&self, doc: &mut CalibrationDocument) -> Result<(), CalibrationError> {
        if !self.is_valid() {
            return Err(CalibrationError::NotValid {
                kind: "plane+homography",
            });
        }
        // Serialize into a scratch document first so a failure in either
        // constituent leaves the caller's document without a partial
        // composite.
        let mut scratch = CalibrationDocument::new();
        self.plane.serialize_into(&mut scratch)?;
        self.homography.serialize_into(&mut scratch)?;
        doc.merge_from(&scratch);
        Ok(())
    }

    fn deserialize_from(&mut self, doc: &CalibrationDocument) -> Result<(), CalibrationLoadError> {
        let mut plane = self.plane;
        let mut homography = self.homography;
        plane.deserialize_from(doc)?;
        homography.deserialize_from(doc)?;
        self.plane = plane;
        self.homography = homography;
        Ok(())
    }
}
