use nalgebra::{Matrix3, Matrix4, Point3, Vector3};

/// Embed a rotation and a translation into a 4x4 pose matrix.
///
/// The last row is always `[0, 0, 0, 1]`.
pub fn pose_from_parts(rotation: &Matrix3<f64>, translation: &Vector3<f64>) -> Matrix4<f64> {
    let mut pose = Matrix4::identity();
    pose.fixed_view_mut::<3, 3>(0, 0).copy_from(rotation);
    pose.fixed_view_mut::<3, 1>(0, 3).copy_from(translation);
    pose
}

/// Extract the 3x3 rotation block of a pose.
pub fn rotation_of(pose: &Matrix4<f64>) -> Matrix3<f64> {
    pose.fixed_view::<3, 3>(0, 0).into_owned()
}

/// Extract the translation column of a pose as a point.
pub fn position_of(pose: &Matrix4<f64>) -> Point3<f64> {
    Point3::new(pose[(0, 3)], pose[(1, 3)], pose[(2, 3)])
}

/// Overwrite the translation column of a pose, leaving rotation untouched.
pub fn set_position(pose: &mut Matrix4<f64>, position: &Point3<f64>) {
    pose[(0, 3)] = position.x;
    pose[(1, 3)] = position.y;
    pose[(2, 3)] = position.z;
}
