use nalgebra::{Matrix3, Matrix4, Point2, Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::solver::{DltSolver, GeometrySolver, PoseAlgorithm, SolverError};

/// Internal camera (or projector) parameters mapping camera-space rays to
/// pixels.
///
/// The principal point is deliberately not validated: uncalibrated or extreme
/// lenses can legitimately place it outside the image bounds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    pub width: u32,
    pub height: u32,
    /// Whether lens distortion is corrected by the upstream device. Actual
    /// undistortion is the collaborator's concern; this is a flag only.
    pub handles_distortion: bool,
}

impl Intrinsics {
    /// The 3x3 intrinsic matrix `[fx 0 cx; 0 fy cy; 0 0 1]`.
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    fn validate(&self) -> Result<(), DeviceError> {
        if self.fx <= 0.0 || self.fy <= 0.0 {
            return Err(DeviceError::InvalidFocalLength {
                fx: self.fx,
                fy: self.fy,
            });
        }
        if self.width == 0 || self.height == 0 {
            return Err(DeviceError::InvalidImageSize {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }
}

/// Errors produced when constructing or reconfiguring a projective device.
#[derive(thiserror::Error, Debug)]
pub enum DeviceError {
    #[error("focal lengths must be positive (fx={fx}, fy={fy})")]
    InvalidFocalLength { fx: f64, fy: f64 },

    #[error("image size must be non-zero (width={width}, height={height})")]
    InvalidImageSize { width: u32, height: u32 },
}

/// A calibrated projective device: a camera or a projector modelled as one.
///
/// Owns the intrinsic parameters plus an optional rigid extrinsic transform
/// to a reference frame, converts between pixel and camera space, and wraps
/// the geometry solver for pose estimation. Inverse focal terms and the 3x3
/// intrinsic matrix are cached and re-derived only by [`set_intrinsics`],
/// never per call.
///
/// [`set_intrinsics`]: ProjectiveDevice::set_intrinsics
#[derive(Clone, Debug)]
pub struct ProjectiveDevice {
    intrinsics: Intrinsics,
    extrinsics: Option<Matrix4<f64>>,
    ifx: f64,
    ify: f64,
    k: Matrix3<f64>,
    solver: DltSolver,
}

impl ProjectiveDevice {
    pub fn new(intrinsics: Intrinsics) -> Result<Self, DeviceError> {
        intrinsics.validate()?;
        Ok(Self {
            ifx: 1.0 / intrinsics.fx,
            ify: 1.0 / intrinsics.fy,
            k: intrinsics.matrix(),
            intrinsics,
            extrinsics: None,
            solver: DltSolver::default(),
        })
    }

    pub fn with_extrinsics(mut self, extrinsics: Matrix4<f64>) -> Self {
        self.extrinsics = Some(extrinsics);
        self
    }

    /// Fix the pose-estimation algorithm for this device. The choice is a
    /// construction-time constant: different algorithms give different,
    /// non-interchangeable results near degenerate configurations.
    pub fn with_algorithm(mut self, algorithm: PoseAlgorithm) -> Self {
        self.solver = DltSolver::new(algorithm);
        self
    }

    pub fn algorithm(&self) -> PoseAlgorithm {
        self.solver.algorithm
    }

    pub fn intrinsics(&self) -> &Intrinsics {
        &self.intrinsics
    }

    pub fn intrinsic_matrix(&self) -> &Matrix3<f64> {
        &self.k
    }

    pub fn width(&self) -> u32 {
        self.intrinsics.width
    }

    pub fn height(&self) -> u32 {
        self.intrinsics.height
    }

    pub fn has_extrinsics(&self) -> bool {
        self.extrinsics.is_some()
    }

    pub fn extrinsics(&self) -> Option<&Matrix4<f64>> {
        self.extrinsics.as_ref()
    }

    pub fn set_extrinsics(&mut self, extrinsics: Matrix4<f64>) {
        self.extrinsics = Some(extrinsics);
    }

    /// Replace the intrinsic parameters, re-deriving every cached term.
    ///
    /// Validation happens before any field is touched, so a failed call
    /// leaves the device unchanged.
    pub fn set_intrinsics(&mut self, intrinsics: Intrinsics) -> Result<(), DeviceError> {
        intrinsics.validate()?;
        self.ifx = 1.0 / intrinsics.fx;
        self.ify = 1.0 / intrinsics.fy;
        self.k = intrinsics.matrix();
        self.intrinsics = intrinsics;
        Ok(())
    }

    /// Inverse-project a pixel with a known depth into camera-space 3D.
    pub fn pixel_to_world(&self, x: f64, y: f64, depth: f64) -> Point3<f64> {
        Point3::new(
            (x - self.intrinsics.cx) * depth * self.ifx,
            (y - self.intrinsics.cy) * depth * self.ify,
            depth,
        )
    }

    /// Inverse-project a pixel to the normalized image plane (z = 1).
    pub fn pixel_to_normalized(&self, x: f64, y: f64) -> Vector3<f64> {
        Vector3::new(
            (x - self.intrinsics.cx) * self.ifx,
            (y - self.intrinsics.cy) * self.ify,
            1.0,
        )
    }

    /// Forward-project a camera-space point to a pixel coordinate, rounded
    /// and clamped to `[0, width-1] x [0, height-1]`.
    ///
    /// The caller must ensure `point.z != 0`; a zero depth divides by zero
    /// and yields a NaN coordinate, which is a precondition violation rather
    /// than a handled case.
    pub fn world_to_pixel(&self, point: &Point3<f64>) -> (f64, f64) {
        let (px, py) = self.world_to_pixel_unclamped(point);
        (
            px.round().clamp(0.0, f64::from(self.intrinsics.width - 1)),
            py.round().clamp(0.0, f64::from(self.intrinsics.height - 1)),
        )
    }

    /// Forward-project without rounding or clamping.
    ///
    /// Same `point.z != 0` precondition as [`world_to_pixel`].
    ///
    /// [`world_to_pixel`]: ProjectiveDevice::world_to_pixel
    pub fn world_to_pixel_unclamped(&self, point: &Point3<f64>) -> (f64, f64) {
        let inv_z = 1.0 / point.z;
        (
            point.x * inv_z * self.intrinsics.fx + self.intrinsics.cx,
            point.y * inv_z * self.intrinsics.fy + self.intrinsics.cy,
        )
    }

    /// Estimate the device-from-object pose from N >= 4 correspondences.
    ///
    /// Delegates to the geometry solver configured at construction; the
    /// result is deterministic for identical inputs. The returned 4x4 embeds
    /// the rotation and translation with last row `[0, 0, 0, 1]`.
    pub fn estimate_pose(
        &self,
        object: &[Point3<f64>],
        image: &[Point2<f64>],
    ) -> Result<Matrix4<f64>, SolverError> {
        self.solver.solve_pose(object, image, &self.k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn device() -> ProjectiveDevice {
        ProjectiveDevice::new(Intrinsics {
            fx: 800.0,
            fy: 780.0,
            cx: 320.0,
            cy: 240.0,
            width: 640,
            height: 480,
            handles_distortion: false,
        })
        .expect("valid intrinsics")
    }

    #[test]
    fn pixel_world_round_trip() {
        let dev = device();
        for (x, y, depth) in [(0.0, 0.0, 500.0), (320.0, 240.0, 100.0), (639.0, 479.0, 42.0)] {
            let world = dev.pixel_to_world(x, y, depth);
            let (px, py) = dev.world_to_pixel(&world);
            assert_relative_eq!(px, x, epsilon = 0.5);
            assert_relative_eq!(py, y, epsilon = 0.5);
        }
    }

    #[test]
    fn reprojection_is_clamped_to_image_bounds() {
        let dev = device();
        let far_left = dev.pixel_to_world(-250.0, 900.0, 300.0);
        let (px, py) = dev.world_to_pixel(&far_left);
        assert_eq!((px, py), (0.0, 479.0));
    }

    #[test]
    fn unclamped_reprojection_keeps_out_of_bounds_values() {
        let dev = device();
        let world = dev.pixel_to_world(-250.0, 900.0, 300.0);
        let (px, py) = dev.world_to_pixel_unclamped(&world);
        assert_relative_eq!(px, -250.0, epsilon = 1e-9);
        assert_relative_eq!(py, 900.0, epsilon = 1e-9);
    }

    #[test]
    fn negative_principal_point_is_accepted() {
        let dev = ProjectiveDevice::new(Intrinsics {
            fx: 500.0,
            fy: 500.0,
            cx: -40.0,
            cy: 700.0,
            width: 640,
            height: 480,
            handles_distortion: false,
        });
        assert!(dev.is_ok());
    }

    #[test]
    fn invalid_focal_length_is_rejected() {
        let result = ProjectiveDevice::new(Intrinsics {
            fx: 0.0,
            fy: 500.0,
            cx: 320.0,
            cy: 240.0,
            width: 640,
            height: 480,
            handles_distortion: false,
        });
        assert!(matches!(result, Err(DeviceError::InvalidFocalLength { .. })));
    }

    #[test]
    fn set_intrinsics_rederives_cached_terms() {
        let mut dev = device();
        let mut next = *dev.intrinsics();
        next.fx = 400.0;
        next.fy = 390.0;
        dev.set_intrinsics(next).expect("valid");

        // Half the focal length doubles the inverse projection offset.
        let world = dev.pixel_to_world(400.0, 240.0, 100.0);
        assert_relative_eq!(world.x, (400.0 - 320.0) * 100.0 / 400.0, epsilon = 1e-12);
        assert_eq!(dev.intrinsic_matrix()[(0, 0)], 400.0);
    }

    #[test]
    fn failed_set_intrinsics_leaves_device_unchanged() {
        let mut dev = device();
        let before = *dev.intrinsics();
        let mut bad = before;
        bad.width = 0;
        assert!(dev.set_intrinsics(bad).is_err());
        assert_eq!(*dev.intrinsics(), before);
    }

    #[test]
    fn pose_algorithm_is_selectable_at_construction() {
        let dev = device().with_algorithm(PoseAlgorithm::PlanarDlt);
        assert_eq!(dev.algorithm(), PoseAlgorithm::PlanarDlt);
        assert_eq!(device().algorithm(), PoseAlgorithm::PlanarDltRefined);

        // The unrefined path still solves a clean planar configuration.
        let object = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(100.0, 0.0, 0.0),
            Point3::new(100.0, 60.0, 0.0),
            Point3::new(0.0, 60.0, 0.0),
        ];
        let image: Vec<_> = object
            .iter()
            .map(|p| {
                let world = Point3::new(p.x + 20.0, p.y - 10.0, p.z + 450.0);
                let (px, py) = dev.world_to_pixel_unclamped(&world);
                Point2::new(px, py)
            })
            .collect();
        let pose = dev.estimate_pose(&object, &image).expect("solvable");
        assert_relative_eq!(pose[(0, 3)], 20.0, epsilon = 1e-3);
        assert_relative_eq!(pose[(1, 3)], -10.0, epsilon = 1e-3);
        assert_relative_eq!(pose[(2, 3)], 450.0, epsilon = 1e-3);
    }

    #[test]
    fn estimate_pose_rejects_short_input() {
        let dev = device();
        let object = [Point3::new(0.0, 0.0, 0.0); 3];
        let image = [Point2::new(0.0, 0.0); 3];
        assert!(matches!(
            dev.estimate_pose(&object, &image),
            Err(SolverError::TooFewPoints { .. })
        ));
    }
}
