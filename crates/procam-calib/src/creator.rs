use nalgebra::{Matrix4, Point2, Point3};

use procam_core::{DltSolver, GeometrySolver, SolverError};

use crate::homography::HomographyCalibration;

/// Whether the correspondences are 2D<->2D or involve a 3D side.
///
/// The dimensionality decides how the solved 3x3 homography is embedded into
/// the pose-like 4x4 shape used across the engine: the planar case keeps z
/// as a passthrough axis, the 3D case keeps the full projective block in the
/// top-left corner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HomographyDim {
    TwoD,
    ThreeD,
}

#[derive(thiserror::Error, Debug)]
pub enum HomographyCreatorError {
    /// `homography()` was called before any batch completed.
    #[error("no homography computed yet")]
    NotComputed,

    #[error(transparent)]
    Solver(#[from] SolverError),
}

/// One-shot homography calibration sessions: accumulates exactly N point
/// pairs, solves, and re-arms for the next batch.
///
/// The last solved result stays queryable through [`homography`] until the
/// next batch overwrites it.
///
/// [`homography`]: HomographyCreator::homography
#[derive(Debug)]
pub struct HomographyCreator<S: GeometrySolver = DltSolver> {
    dim: HomographyDim,
    nb_points: usize,
    src: Vec<Point2<f64>>,
    dst: Vec<Point2<f64>>,
    result: Option<HomographyCalibration>,
    solver: S,
}

impl HomographyCreator<DltSolver> {
    pub fn new(dim: HomographyDim, nb_points: usize) -> Self {
        Self::with_solver(dim, nb_points, DltSolver::default())
    }
}

impl<S: GeometrySolver> HomographyCreator<S> {
    pub fn with_solver(dim: HomographyDim, nb_points: usize, solver: S) -> Self {
        Self {
            dim,
            nb_points,
            src: Vec::with_capacity(nb_points),
            dst: Vec::with_capacity(nb_points),
            result: None,
            solver,
        }
    }

    pub fn nb_points(&self) -> usize {
        self.nb_points
    }

    pub fn is_computed(&self) -> bool {
        self.result.is_some()
    }

    /// Append one correspondence; returns `Ok(true)` iff this call completed
    /// a batch and solved a new homography.
    ///
    /// On completion the fill index resets so the next call starts a fresh
    /// batch, whether or not the solve succeeded.
    pub fn add_point(
        &mut self,
        src: Point3<f64>,
        dst: Point3<f64>,
    ) -> Result<bool, HomographyCreatorError> {
        self.src.push(src.xy());
        self.dst.push(dst.xy());
        if self.src.len() < self.nb_points {
            return Ok(false);
        }
        let solved = self.solver.solve_homography(&self.src, &self.dst);
        self.src.clear();
        self.dst.clear();
        let h = solved?;

        let matrix = match self.dim {
            HomographyDim::TwoD => Matrix4::new(
                h[(0, 0)], h[(0, 1)], 0.0, h[(0, 2)], //
                h[(1, 0)], h[(1, 1)], 0.0, h[(1, 2)], //
                0.0, 0.0, 1.0, 0.0, //
                0.0, 0.0, 0.0, 1.0,
            ),
            HomographyDim::ThreeD => Matrix4::new(
                h[(0, 0)], h[(0, 1)], h[(0, 2)], 0.0, //
                h[(1, 0)], h[(1, 1)], h[(1, 2)], 0.0, //
                h[(2, 0)], h[(2, 1)], h[(2, 2)], 0.0, //
                0.0, 0.0, 0.0, 1.0,
            ),
        };
        self.result = Some(HomographyCalibration::from_matrix(matrix));
        Ok(true)
    }

    /// Drop any partial batch and the last result.
    pub fn reset(&mut self) {
        self.src.clear();
        self.dst.clear();
        self.result = None;
    }

    /// The last solved calibration; requires a prior completed batch.
    pub fn homography(&self) -> Result<&HomographyCalibration, HomographyCreatorError> {
        self.result.as_ref().ok_or(HomographyCreatorError::NotComputed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square() -> [Point3<f64>; 4] {
        [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ]
    }

    fn scaled_square() -> [Point3<f64>; 4] {
        [
            Point3::new(10.0, 5.0, 0.0),
            Point3::new(30.0, 5.0, 0.0),
            Point3::new(30.0, 45.0, 0.0),
            Point3::new(10.0, 45.0, 0.0),
        ]
    }

    #[test]
    fn homography_before_any_batch_is_an_error() {
        let creator = HomographyCreator::new(HomographyDim::TwoD, 4);
        assert!(matches!(
            creator.homography(),
            Err(HomographyCreatorError::NotComputed)
        ));
    }

    #[test]
    fn batch_completes_exactly_at_nb_points() {
        let mut creator = HomographyCreator::new(HomographyDim::TwoD, 4);
        let src = square();
        let dst = scaled_square();
        for i in 0..3 {
            assert!(!creator.add_point(src[i], dst[i]).expect("accumulating"));
            assert!(!creator.is_computed());
        }
        assert!(creator.add_point(src[3], dst[3]).expect("solved"));
        assert!(creator.is_computed());
    }

    #[test]
    fn solved_homography_maps_source_onto_destination() {
        let mut creator = HomographyCreator::new(HomographyDim::TwoD, 4);
        let src = square();
        let dst = scaled_square();
        for i in 0..4 {
            creator.add_point(src[i], dst[i]).expect("ok");
        }
        let calib = creator.homography().expect("computed");
        for i in 0..4 {
            let mapped = calib.apply(&src[i]);
            assert_relative_eq!(mapped.x, dst[i].x, epsilon = 1e-9);
            assert_relative_eq!(mapped.y, dst[i].y, epsilon = 1e-9);
        }
    }

    #[test]
    fn creator_rearms_after_each_batch() {
        let mut creator = HomographyCreator::new(HomographyDim::TwoD, 4);
        let src = square();
        let dst = scaled_square();
        for i in 0..4 {
            creator.add_point(src[i], dst[i]).expect("ok");
        }
        let first = *creator.homography().expect("computed").matrix();

        // Second batch with a different mapping overwrites the result.
        let shifted: Vec<_> = dst
            .iter()
            .map(|p| Point3::new(p.x + 100.0, p.y, 0.0))
            .collect();
        for i in 0..3 {
            assert!(!creator.add_point(src[i], shifted[i]).expect("accumulating"));
        }
        assert!(creator.add_point(src[3], shifted[3]).expect("solved"));
        let second = *creator.homography().expect("computed").matrix();
        assert!(first != second);
        assert_relative_eq!(second[(0, 3)] - first[(0, 3)], 100.0, epsilon = 1e-6);
    }

    #[test]
    fn three_d_mode_keeps_full_projective_block() {
        // A projective (non-affine) mapping: tilt the far edge of the square.
        let mut creator = HomographyCreator::new(HomographyDim::ThreeD, 4);
        let src = square();
        let dst = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.8, 0.9, 0.0),
            Point3::new(0.2, 0.9, 0.0),
        ];
        for i in 0..4 {
            creator.add_point(src[i], dst[i]).expect("ok");
        }
        let m = creator.homography().expect("computed").matrix();
        // Projective terms land in the third row, last column stays [0,0,0,1].
        assert!(m[(2, 0)].abs() > 1e-9 || m[(2, 1)].abs() > 1e-9);
        assert_eq!(m[(3, 3)], 1.0);
        assert_eq!((m[(0, 3)], m[(1, 3)], m[(2, 3)]), (0.0, 0.0, 0.0));
    }
}
