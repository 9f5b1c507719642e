use nalgebra::{DMatrix, DVector, Matrix3, Matrix4, Point2, Point3, SMatrix, SVector, Vector3};

use crate::transform::pose_from_parts;

/// Errors produced by the geometry solver.
#[derive(thiserror::Error, Debug)]
pub enum SolverError {
    #[error("too few correspondences (needed {needed}, got {got})")]
    TooFewPoints { needed: usize, got: usize },

    #[error("correspondence length mismatch (object={object}, image={image})")]
    LengthMismatch { object: usize, image: usize },

    #[error("degenerate point configuration")]
    Degenerate,

    #[error("object points are not coplanar")]
    NonCoplanar,
}

/// Pose estimation algorithm, fixed per solver instance.
///
/// Different algorithms yield different, non-interchangeable results for
/// near-degenerate inputs, so the choice is a configuration constant rather
/// than a per-call argument.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PoseAlgorithm {
    /// Homography decomposition against the object plane.
    PlanarDlt,
    /// `PlanarDlt` followed by fixed-iteration Gauss-Newton refinement of
    /// the reprojection error.
    #[default]
    PlanarDltRefined,
}

/// Solves the perspective pose problem and planar homographies from point
/// correspondences. Implementations must be pure: identical numeric inputs
/// produce identical outputs.
pub trait GeometrySolver {
    /// Recover a camera-from-object pose from N >= 4 coplanar 3D points and
    /// their pixel observations, given the 3x3 intrinsic matrix.
    fn solve_pose(
        &self,
        object: &[Point3<f64>],
        image: &[Point2<f64>],
        intrinsics: &Matrix3<f64>,
    ) -> Result<Matrix4<f64>, SolverError>;

    /// Estimate H such that `dst ~ H * src` from N >= 4 planar
    /// correspondences. The result is normalized so that `h33 = 1`.
    fn solve_homography(
        &self,
        src: &[Point2<f64>],
        dst: &[Point2<f64>],
    ) -> Result<Matrix3<f64>, SolverError>;
}

/// Default solver: Hartley-normalized DLT for homographies and planar
/// homography decomposition for pose.
#[derive(Clone, Copy, Debug, Default)]
pub struct DltSolver {
    pub algorithm: PoseAlgorithm,
}

const REFINE_ITERATIONS: usize = 10;

impl DltSolver {
    pub fn new(algorithm: PoseAlgorithm) -> Self {
        Self { algorithm }
    }
}

impl GeometrySolver for DltSolver {
    fn solve_pose(
        &self,
        object: &[Point3<f64>],
        image: &[Point2<f64>],
        intrinsics: &Matrix3<f64>,
    ) -> Result<Matrix4<f64>, SolverError> {
        if object.len() != image.len() {
            return Err(SolverError::LengthMismatch {
                object: object.len(),
                image: image.len(),
            });
        }
        if object.len() < 4 {
            return Err(SolverError::TooFewPoints {
                needed: 4,
                got: object.len(),
            });
        }

        let (centroid, frame) = plane_frame(object)?;

        // Object points in plane coordinates, observations in normalized
        // image coordinates (intrinsics removed).
        let fx = intrinsics[(0, 0)];
        let fy = intrinsics[(1, 1)];
        let cx = intrinsics[(0, 2)];
        let cy = intrinsics[(1, 2)];

        let plane_pts: Vec<Point2<f64>> = object
            .iter()
            .map(|p| {
                let d = p - centroid;
                Point2::new(frame.column(0).dot(&d), frame.column(1).dot(&d))
            })
            .collect();
        let norm_pts: Vec<Point2<f64>> = image
            .iter()
            .map(|p| Point2::new((p.x - cx) / fx, (p.y - cy) / fy))
            .collect();

        let h = self.solve_homography(&plane_pts, &norm_pts)?;
        let (rotation, translation) = decompose_planar_homography(&h)?;

        // Fold the plane frame back in: p_cam = R * E^T * (p - c) + t.
        let r_world = rotation * frame.transpose();
        let t_world = translation - r_world * centroid.coords;

        let mut pose = pose_from_parts(&r_world, &t_world);
        if self.algorithm == PoseAlgorithm::PlanarDltRefined {
            pose = refine_pose(&pose, object, &norm_pts);
        }
        Ok(pose)
    }

    fn solve_homography(
        &self,
        src: &[Point2<f64>],
        dst: &[Point2<f64>],
    ) -> Result<Matrix3<f64>, SolverError> {
        if src.len() != dst.len() {
            return Err(SolverError::LengthMismatch {
                object: src.len(),
                image: dst.len(),
            });
        }
        if src.len() < 4 {
            return Err(SolverError::TooFewPoints {
                needed: 4,
                got: src.len(),
            });
        }

        if src.len() == 4 {
            return homography_from_4pt(src, dst);
        }

        let (s, ts) = normalize_points(src);
        let (d, td) = normalize_points(dst);

        // Build A (2N x 9) and solve Ah = 0: h is the right singular vector
        // with the smallest singular value.
        let n = src.len();
        let mut a = DMatrix::<f64>::zeros(2 * n, 9);
        for k in 0..n {
            let x = s[k].x;
            let y = s[k].y;
            let u = d[k].x;
            let v = d[k].y;

            a[(2 * k, 0)] = -x;
            a[(2 * k, 1)] = -y;
            a[(2 * k, 2)] = -1.0;
            a[(2 * k, 6)] = u * x;
            a[(2 * k, 7)] = u * y;
            a[(2 * k, 8)] = u;

            a[(2 * k + 1, 3)] = -x;
            a[(2 * k + 1, 4)] = -y;
            a[(2 * k + 1, 5)] = -1.0;
            a[(2 * k + 1, 6)] = v * x;
            a[(2 * k + 1, 7)] = v * y;
            a[(2 * k + 1, 8)] = v;
        }

        let svd = a.svd(true, true);
        let vt = svd.v_t.ok_or(SolverError::Degenerate)?;
        let last = vt.nrows().checked_sub(1).ok_or(SolverError::Degenerate)?;
        let h = vt.row(last);

        let hn =
            Matrix3::<f64>::from_row_slice(&[h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]]);

        let h_den = denormalize_homography(&hn, &ts, &td).ok_or(SolverError::Degenerate)?;
        normalize_homography(&h_den).ok_or(SolverError::Degenerate)
    }
}

/// Compute H such that `dst ~ H * src` from exactly 4 correspondences,
/// with `h33 = 1` fixed so the system is linear.
fn homography_from_4pt(src: &[Point2<f64>], dst: &[Point2<f64>]) -> Result<Matrix3<f64>, SolverError> {
    let (src_n, t_src) = normalize_points(src);
    let (dst_n, t_dst) = normalize_points(dst);

    // For each correspondence (x,y)->(u,v):
    // h11 x + h12 y + h13 - u h31 x - u h32 y = u
    // h21 x + h22 y + h23 - v h31 x - v h32 y = v
    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();

    for k in 0..4 {
        let x = src_n[k].x;
        let y = src_n[k].y;
        let u = dst_n[k].x;
        let v = dst_n[k].y;

        let r0 = 2 * k;
        a[(r0, 0)] = x;
        a[(r0, 1)] = y;
        a[(r0, 2)] = 1.0;
        a[(r0, 6)] = -u * x;
        a[(r0, 7)] = -u * y;
        b[r0] = u;

        let r1 = 2 * k + 1;
        a[(r1, 3)] = x;
        a[(r1, 4)] = y;
        a[(r1, 5)] = 1.0;
        a[(r1, 6)] = -v * x;
        a[(r1, 7)] = -v * y;
        b[r1] = v;
    }

    let x = a.lu().solve(&b).ok_or(SolverError::Degenerate)?;

    let hn = Matrix3::<f64>::new(
        x[0], x[1], x[2], //
        x[3], x[4], x[5], //
        x[6], x[7], 1.0,
    );

    let h_den = denormalize_homography(&hn, &t_src, &t_dst).ok_or(SolverError::Degenerate)?;
    normalize_homography(&h_den).ok_or(SolverError::Degenerate)
}

fn hartley_normalization(cx: f64, cy: f64, mean_dist: f64) -> Matrix3<f64> {
    let s = if mean_dist > 1e-12 {
        (2.0_f64).sqrt() / mean_dist
    } else {
        1.0
    };
    Matrix3::<f64>::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0)
}

/// Hartley normalization: translate to centroid, scale so the mean distance
/// from it is sqrt(2).
fn normalize_points(pts: &[Point2<f64>]) -> (Vec<Point2<f64>>, Matrix3<f64>) {
    let n = pts.len() as f64;
    let mut cx = 0.0;
    let mut cy = 0.0;
    for p in pts {
        cx += p.x;
        cy += p.y;
    }
    cx /= n;
    cy /= n;

    let mut mean_dist = 0.0;
    for p in pts {
        let dx = p.x - cx;
        let dy = p.y - cy;
        mean_dist += (dx * dx + dy * dy).sqrt();
    }
    mean_dist /= n;

    let t = hartley_normalization(cx, cy, mean_dist);

    let out = pts
        .iter()
        .map(|p| {
            let v = t * Vector3::new(p.x, p.y, 1.0);
            Point2::new(v[0], v[1])
        })
        .collect();
    (out, t)
}

fn normalize_homography(h: &Matrix3<f64>) -> Option<Matrix3<f64>> {
    let s = h[(2, 2)];
    if s.abs() < 1e-12 {
        return None;
    }
    Some(h / s)
}

fn denormalize_homography(
    hn: &Matrix3<f64>,
    t_src: &Matrix3<f64>,
    t_dst: &Matrix3<f64>,
) -> Option<Matrix3<f64>> {
    let t_dst_inv = t_dst.try_inverse()?;
    Some(t_dst_inv * hn * t_src)
}

/// Fit an orthonormal frame to a coplanar point set: columns are two in-plane
/// axes and the plane normal, centroid returned separately.
fn plane_frame(points: &[Point3<f64>]) -> Result<(Point3<f64>, Matrix3<f64>), SolverError> {
    let n = points.len() as f64;
    let centroid = Point3::from(
        points
            .iter()
            .fold(Vector3::zeros(), |acc, p| acc + p.coords)
            / n,
    );

    let mut cov = Matrix3::<f64>::zeros();
    for p in points {
        let d = p - centroid;
        cov += d * d.transpose();
    }

    let svd = cov.svd(true, false);
    let u = svd.u.ok_or(SolverError::Degenerate)?;
    let s = svd.singular_values;

    // Collinear sets have no unique plane.
    if s[1] < 1e-9 * s[0].max(1.0) {
        return Err(SolverError::Degenerate);
    }

    let mut frame = u;
    if frame.determinant() < 0.0 {
        let flipped = -frame.column(2).into_owned();
        frame.set_column(2, &flipped);
    }

    // The smallest-variance direction is the normal; residuals off the plane
    // mean the planar model does not apply.
    let spread = s[0].sqrt();
    let normal = frame.column(2).into_owned();
    for p in points {
        if (p - centroid).dot(&normal).abs() > 1e-6 * spread.max(1.0) {
            return Err(SolverError::NonCoplanar);
        }
    }

    Ok((centroid, frame))
}

/// Decompose a plane-to-normalized-image homography into rotation and
/// translation, orthonormalizing the rotation by SVD.
fn decompose_planar_homography(
    h: &Matrix3<f64>,
) -> Result<(Matrix3<f64>, Vector3<f64>), SolverError> {
    let h1 = h.column(0).into_owned();
    let h2 = h.column(1).into_owned();
    let h3 = h.column(2).into_owned();

    let n1 = h1.norm();
    let n2 = h2.norm();
    if n1 < 1e-12 || n2 < 1e-12 {
        return Err(SolverError::Degenerate);
    }
    let lambda = 2.0 / (n1 + n2);

    let mut r1 = h1 * lambda;
    let mut r2 = h2 * lambda;
    let mut t = h3 * lambda;

    // Keep the plane in front of the camera (positive depth).
    if t.z < 0.0 {
        r1 = -r1;
        r2 = -r2;
        t = -t;
    }
    let r3 = r1.cross(&r2);

    let approx = Matrix3::from_columns(&[r1, r2, r3]);
    let svd = approx.svd(true, true);
    let u = svd.u.ok_or(SolverError::Degenerate)?;
    let vt = svd.v_t.ok_or(SolverError::Degenerate)?;
    let det = (u * vt).determinant();
    let rotation = u * Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, det)) * vt;

    Ok((rotation, t))
}

fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(
        0.0, -v.z, v.y, //
        v.z, 0.0, -v.x, //
        -v.y, v.x, 0.0,
    )
}

fn rodrigues(w: &Vector3<f64>) -> Matrix3<f64> {
    let theta = w.norm();
    if theta < 1e-12 {
        return Matrix3::identity() + skew(w);
    }
    let k = skew(&(w / theta));
    Matrix3::identity() + k * theta.sin() + k * k * (1.0 - theta.cos())
}

fn reprojection_residuals(
    pose: &Matrix4<f64>,
    object: &[Point3<f64>],
    norm_pts: &[Point2<f64>],
) -> DVector<f64> {
    let r = pose.fixed_view::<3, 3>(0, 0).into_owned();
    let t = pose.fixed_view::<3, 1>(0, 3).into_owned();

    let mut res = DVector::zeros(2 * object.len());
    for (i, (p, obs)) in object.iter().zip(norm_pts).enumerate() {
        let q = r * p.coords + t;
        res[2 * i] = q.x / q.z - obs.x;
        res[2 * i + 1] = q.y / q.z - obs.y;
    }
    res
}

/// Fixed-iteration Gauss-Newton over axis-angle + translation with a
/// central-difference Jacobian. Falls back to the input pose on any
/// numerical failure so the linear estimate is never made worse than lost.
fn refine_pose(
    initial: &Matrix4<f64>,
    object: &[Point3<f64>],
    norm_pts: &[Point2<f64>],
) -> Matrix4<f64> {
    const STEP: f64 = 1e-6;

    let mut pose = *initial;
    for _ in 0..REFINE_ITERATIONS {
        let res = reprojection_residuals(&pose, object, norm_pts);
        let rows = res.len();

        let mut jac = DMatrix::<f64>::zeros(rows, 6);
        for j in 0..6 {
            let plus = reprojection_residuals(&perturb(&pose, j, STEP), object, norm_pts);
            let minus = reprojection_residuals(&perturb(&pose, j, -STEP), object, norm_pts);
            for i in 0..rows {
                jac[(i, j)] = (plus[i] - minus[i]) / (2.0 * STEP);
            }
        }

        let jt = jac.transpose();
        let normal = &jt * &jac;
        let rhs = -(&jt * &res);
        let Some(delta) = normal.lu().solve(&rhs) else {
            break;
        };

        pose = apply_delta(&pose, &delta);
        if delta.norm() < 1e-12 {
            break;
        }
    }
    pose
}

fn perturb(pose: &Matrix4<f64>, param: usize, eps: f64) -> Matrix4<f64> {
    let mut delta = DVector::zeros(6);
    delta[param] = eps;
    apply_delta(pose, &delta)
}

fn apply_delta(pose: &Matrix4<f64>, delta: &DVector<f64>) -> Matrix4<f64> {
    let w = Vector3::new(delta[0], delta[1], delta[2]);
    let dt = Vector3::new(delta[3], delta[4], delta[5]);

    let r = pose.fixed_view::<3, 3>(0, 0).into_owned();
    let t = pose.fixed_view::<3, 1>(0, 3).into_owned();
    pose_from_parts(&(rodrigues(&w) * r), &(t + dt))
}
