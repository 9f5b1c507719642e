use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use approx::assert_relative_eq;
use nalgebra::{Matrix4, Point2, Point3, Vector3};

use procam_core::{position_of, Intrinsics, OneEuroParams, ProjectiveDevice};
use procam_track::{CameraId, Correspondence, Detection, Frame, MarkerBoard, MarkerDetector};

const BOARD_W: f64 = 100.0;
const BOARD_H: f64 = 80.0;

/// A detector whose next result is set from the outside.
#[derive(Clone)]
struct SharedDetector(Arc<Mutex<Option<Detection>>>);

impl MarkerDetector for SharedDetector {
    fn detect(&mut self, _frame: &Frame<'_>) -> Option<Detection> {
        self.0.lock().expect("test lock").clone()
    }
}

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

/// Synthesize the detection a perfect detector would report for the board
/// translated (without rotation) by `translation` in the camera frame.
fn detection_at(device: &ProjectiveDevice, translation: Vector3<f64>) -> Detection {
    let corners = [
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(BOARD_W, 0.0, 0.0),
        Point3::new(BOARD_W, BOARD_H, 0.0),
        Point3::new(0.0, BOARD_H, 0.0),
    ];
    let correspondences = corners
        .iter()
        .map(|corner| {
            let world = Point3::from(corner.coords + translation);
            let (px, py) = device.world_to_pixel_unclamped(&world);
            Correspondence {
                object: *corner,
                image: Point2::new(px, py),
            }
        })
        .collect();
    Detection::new(correspondences, 1)
}

fn frame(width: u32, height: u32) -> Frame<'static> {
    Frame {
        width,
        height,
        pixels: &[],
    }
}

fn tracked_board() -> (MarkerBoard, CameraId, Arc<Mutex<Option<Detection>>>) {
    let board = MarkerBoard::new("poster.png", BOARD_W, BOARD_H).expect("known extension");
    let camera = CameraId(0);
    let handle = Arc::new(Mutex::new(None));
    board.register_camera(camera, Box::new(SharedDetector(handle.clone())));
    (board, camera, handle)
}

#[test]
fn normal_mode_applies_every_accepted_detection() {
    let dev = device();
    let (board, camera, handle) = tracked_board();
    let now = Instant::now();

    *handle.lock().expect("test lock") = Some(detection_at(&dev, Vector3::new(0.0, 0.0, 500.0)));
    board.update_position(camera, &dev, &frame(640, 480), now);
    let first = position_of(&board.pose(camera));
    assert_relative_eq!(first.z, 500.0, epsilon = 1e-3);

    *handle.lock().expect("test lock") = Some(detection_at(&dev, Vector3::new(5.0, -2.0, 520.0)));
    board.update_position(camera, &dev, &frame(640, 480), now + Duration::from_millis(33));
    let second = position_of(&board.pose(camera));
    assert_relative_eq!(second.x, 5.0, epsilon = 1e-3);
    assert_relative_eq!(second.y, -2.0, epsilon = 1e-3);
    assert_relative_eq!(second.z, 520.0, epsilon = 1e-3);
}

#[test]
fn near_field_candidate_leaves_pose_untouched() {
    let dev = device();
    let (board, camera, handle) = tracked_board();

    // Depth 5 projects the far corners way outside a real sensor; the
    // oversized frame keeps the bounds check out of this test's way.
    *handle.lock().expect("test lock") = Some(detection_at(&dev, Vector3::new(0.0, 0.0, 5.0)));
    board.update_position(camera, &dev, &frame(40_000, 40_000), Instant::now());
    assert_eq!(board.pose(camera), Matrix4::identity());
}

#[test]
fn jump_beyond_threshold_is_rejected() {
    let dev = device();
    let (board, camera, handle) = tracked_board();

    // 2000 units from the last stable position (the origin) exceeds the
    // 1500-unit jump threshold even though the depth itself is plausible.
    *handle.lock().expect("test lock") = Some(detection_at(&dev, Vector3::new(0.0, 0.0, 2_000.0)));
    board.update_position(camera, &dev, &frame(640, 480), Instant::now());
    assert_eq!(board.pose(camera), Matrix4::identity());
}

#[test]
fn out_of_bounds_corners_abandon_the_update() {
    let dev = device();
    let (board, camera, handle) = tracked_board();

    // Push the board far enough sideways that a corner leaves the image.
    *handle.lock().expect("test lock") = Some(detection_at(&dev, Vector3::new(400.0, 0.0, 500.0)));
    board.update_position(camera, &dev, &frame(640, 480), Instant::now());
    assert_eq!(board.pose(camera), Matrix4::identity());
}

#[test]
fn block_update_freezes_the_pose_until_expiry() {
    let dev = device();
    let (board, camera, handle) = tracked_board();
    let start = Instant::now();

    *handle.lock().expect("test lock") = Some(detection_at(&dev, Vector3::new(0.0, 0.0, 500.0)));
    board.block_update(camera, Duration::from_millis(500), start);

    board.update_position(camera, &dev, &frame(640, 480), start + Duration::from_millis(100));
    assert_eq!(board.pose(camera), Matrix4::identity());
    board.update_position(camera, &dev, &frame(640, 480), start + Duration::from_millis(300));
    assert_eq!(board.pose(camera), Matrix4::identity());

    board.update_position(camera, &dev, &frame(640, 480), start + Duration::from_millis(600));
    let position = position_of(&board.pose(camera));
    assert_relative_eq!(position.z, 500.0, epsilon = 1e-3);
}

#[test]
fn drawing_mode_requires_minimum_motion() {
    let dev = device();
    let (board, camera, handle) = tracked_board();
    let start = Instant::now();
    board.set_drawing_mode(camera, true, 2.0);

    // First detection is 500 units from the origin: applied, and the slot
    // arms its force-update cooldown.
    *handle.lock().expect("test lock") = Some(detection_at(&dev, Vector3::new(0.0, 0.0, 500.0)));
    board.update_position(camera, &dev, &frame(640, 480), start);
    assert_relative_eq!(position_of(&board.pose(camera)).z, 500.0, epsilon = 1e-3);

    // After the cooldown, a 1-unit move is below the threshold: ignored.
    *handle.lock().expect("test lock") = Some(detection_at(&dev, Vector3::new(1.0, 0.0, 500.0)));
    board.update_position(camera, &dev, &frame(640, 480), start + Duration::from_secs(2));
    assert_relative_eq!(position_of(&board.pose(camera)).x, 0.0, epsilon = 1e-3);

    // A 10-unit move passes the threshold and is applied.
    *handle.lock().expect("test lock") = Some(detection_at(&dev, Vector3::new(10.0, 0.0, 500.0)));
    board.update_position(camera, &dev, &frame(640, 480), start + Duration::from_secs(3));
    assert_relative_eq!(position_of(&board.pose(camera)).x, 10.0, epsilon = 1e-3);
}

#[test]
fn drawing_mode_cooldown_forces_small_motions_through() {
    let dev = device();
    let (board, camera, handle) = tracked_board();
    let start = Instant::now();
    board.set_drawing_mode(camera, true, 2.0);

    *handle.lock().expect("test lock") = Some(detection_at(&dev, Vector3::new(0.0, 0.0, 500.0)));
    board.update_position(camera, &dev, &frame(640, 480), start);

    // Inside the cooldown window the slot is in ForceUpdate: even a
    // sub-threshold motion is applied.
    *handle.lock().expect("test lock") = Some(detection_at(&dev, Vector3::new(1.0, 0.0, 500.0)));
    board.update_position(camera, &dev, &frame(640, 480), start + Duration::from_millis(500));
    assert_relative_eq!(position_of(&board.pose(camera)).x, 1.0, epsilon = 1e-3);
}

#[test]
fn missing_detection_keeps_the_previous_pose() {
    let dev = device();
    let (board, camera, handle) = tracked_board();
    let now = Instant::now();

    *handle.lock().expect("test lock") = Some(detection_at(&dev, Vector3::new(0.0, 0.0, 500.0)));
    board.update_position(camera, &dev, &frame(640, 480), now);
    let settled = board.pose(camera);

    *handle.lock().expect("test lock") = None;
    board.update_position(camera, &dev, &frame(640, 480), now + Duration::from_millis(33));
    assert_eq!(board.pose(camera), settled);
}

#[test]
fn filtered_slot_smooths_between_candidates() {
    let dev = device();
    let (board, camera, handle) = tracked_board();
    let now = Instant::now();
    board
        .set_filtering(camera, OneEuroParams::default())
        .expect("valid params");

    // The first sample passes through the bank unchanged.
    *handle.lock().expect("test lock") = Some(detection_at(&dev, Vector3::new(0.0, 0.0, 500.0)));
    board.update_position(camera, &dev, &frame(640, 480), now);
    assert_relative_eq!(position_of(&board.pose(camera)).z, 500.0, epsilon = 1e-3);

    // A sudden move is low-passed: the committed pose lands strictly
    // between the old and the new position.
    *handle.lock().expect("test lock") = Some(detection_at(&dev, Vector3::new(50.0, 0.0, 500.0)));
    board.update_position(camera, &dev, &frame(640, 480), now + Duration::from_millis(33));
    let x = position_of(&board.pose(camera)).x;
    assert!(x > 1.0 && x < 49.0, "unexpected filtered x {x}");

    board.remove_filtering(camera);
    board.update_position(camera, &dev, &frame(640, 480), now + Duration::from_millis(66));
    assert_relative_eq!(position_of(&board.pose(camera)).x, 50.0, epsilon = 1e-3);
}
