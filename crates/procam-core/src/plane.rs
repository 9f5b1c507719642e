use nalgebra::{Matrix4, Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Sentinel stored when the plane height has not been set yet. Kept as -1.0
/// for compatibility with persisted calibration files.
pub const HEIGHT_NOT_SET: f64 = -1.0;

const ORIENTATION_EPS: f64 = 1e-4;

/// An oriented plane with an interaction height: a point on the plane, a
/// unit normal, and the distance band above the plane considered "close".
///
/// The height starts unset; every query that consumes it requires it to be
/// set first (see the `# Panics` sections).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaneModel {
    point: Point3<f64>,
    normal: Vector3<f64>,
    height: f64,
}

impl PlaneModel {
    /// Build a plane from a point and a (not necessarily unit) normal.
    ///
    /// Returns `None` for a zero-length normal. The height is left unset.
    pub fn new(point: Point3<f64>, normal: Vector3<f64>) -> Option<Self> {
        let norm = normal.norm();
        if norm < 1e-12 {
            return None;
        }
        Some(Self {
            point,
            normal: normal / norm,
            height: HEIGHT_NOT_SET,
        })
    }

    /// Build a plane through three points; `None` when they are collinear.
    pub fn from_points(a: Point3<f64>, b: Point3<f64>, c: Point3<f64>) -> Option<Self> {
        Self::new(a, (b - a).cross(&(c - a)))
    }

    /// Build the plane of a board pose: the board origin plus the two points
    /// one board-width along x and one board-height along y.
    pub fn from_pose_and_size(pose: &Matrix4<f64>, width: f64, height: f64) -> Option<Self> {
        let origin = crate::transform::position_of(pose);
        let along_x = pose.transform_point(&Point3::new(width, 0.0, 0.0));
        let along_y = pose.transform_point(&Point3::new(width, height, 0.0));
        Self::from_points(origin, along_x, along_y)
    }

    pub fn point(&self) -> Point3<f64> {
        self.point
    }

    /// Unit normal.
    pub fn normal(&self) -> Vector3<f64> {
        self.normal
    }

    pub fn has_height(&self) -> bool {
        self.height != HEIGHT_NOT_SET
    }

    /// The interaction height, or `None` while unset.
    pub fn height(&self) -> Option<f64> {
        self.has_height().then_some(self.height)
    }

    pub fn set_height(&mut self, height: f64) {
        self.height = height;
    }

    pub fn flip_normal(&mut self) {
        self.normal = -self.normal;
    }

    /// Translate the plane point along the normal.
    pub fn move_along_normal(&mut self, value: f64) {
        self.point += self.normal * value;
    }

    /// Absolute distance from the point to the plane.
    ///
    /// # Panics
    ///
    /// Panics when the height has not been set: distance and orientation
    /// queries are only meaningful on a fully configured plane.
    pub fn distance_to(&self, point: &Point3<f64>) -> f64 {
        self.assert_configured();
        self.signed_distance(point).abs()
    }

    /// Whether the point lies on the normal side of the plane (points on
    /// the plane count as the normal side).
    ///
    /// # Panics
    ///
    /// Panics when the height has not been set.
    pub fn orientation(&self, point: &Point3<f64>) -> bool {
        self.assert_configured();
        // Measured from the plane towards the point base, matching the
        // original calibration convention.
        let d = (self.point - point).dot(&self.normal);
        d >= -ORIENTATION_EPS
    }

    /// Within the height band, regardless of side.
    ///
    /// # Panics
    ///
    /// Panics when the height has not been set.
    pub fn has_good_distance(&self, point: &Point3<f64>) -> bool {
        self.distance_to(point) <= self.height
    }

    /// On the normal side and within the height band.
    ///
    /// # Panics
    ///
    /// Panics when the height has not been set.
    pub fn has_good_orientation_and_distance(&self, point: &Point3<f64>) -> bool {
        self.orientation(point) && self.has_good_distance(point)
    }

    /// On the far side of the plane but within the height band.
    ///
    /// # Panics
    ///
    /// Panics when the height has not been set.
    pub fn is_under_plane(&self, point: &Point3<f64>) -> bool {
        !self.orientation(point) && self.has_good_distance(point)
    }

    /// Orthogonal projection of the point onto the plane.
    pub fn project_point(&self, point: &Point3<f64>) -> Point3<f64> {
        point - self.normal * self.signed_distance(point)
    }

    fn signed_distance(&self, point: &Point3<f64>) -> f64 {
        (point - self.point).dot(&self.normal)
    }

    fn assert_configured(&self) {
        assert!(
            self.has_height(),
            "plane height must be set before distance/orientation queries"
        );
    }
}
