use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};

use log::{debug, warn};
use nalgebra::{Matrix4, Point3};

use procam_core::{position_of, OneEuroParams, ProjectiveDevice};

use crate::detector::{DetectorKind, Frame, MarkerDetector};
use crate::filter_bank::PoseFilterBank;
use crate::tuning::TrackingTuning;

/// Identifies one physical camera across the tracker's APIs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CameraId(pub u32);

/// Per-slot update gating.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GatingMode {
    #[default]
    Normal,
    /// Updates are suppressed until the expiry instant.
    BlockUpdate,
    /// Candidates are applied unconditionally (bypassing drawing-mode
    /// gating) until the expiry instant.
    ForceUpdate,
}

#[derive(thiserror::Error, Debug)]
pub enum TrackError {
    #[error("cannot infer a detector kind from board id `{id}` (expected .cfg, .png or .jpg)")]
    UnknownDetectorKind { id: String },

    #[error(transparent)]
    Filter(#[from] procam_core::FilterError),
}

/// The mutable per-(board, camera) tracking state.
struct TrackingSlot {
    detector: Box<dyn MarkerDetector>,
    pose: Matrix4<f64>,
    filters: Option<PoseFilterBank>,
    last_position: Point3<f64>,
    mode: GatingMode,
    expiry: Option<Instant>,
    drawing_mode: bool,
    min_motion: f64,
}

impl TrackingSlot {
    fn new(detector: Box<dyn MarkerDetector>, min_motion: f64) -> Self {
        Self {
            detector,
            pose: Matrix4::identity(),
            filters: None,
            last_position: Point3::origin(),
            mode: GatingMode::Normal,
            expiry: None,
            drawing_mode: false,
            min_motion,
        }
    }

    fn apply(&mut self, candidate: &Matrix4<f64>) {
        self.pose = match &mut self.filters {
            Some(bank) => bank.apply(candidate),
            None => *candidate,
        };
    }

    /// Whether the current mode's expiry window is still running.
    fn gate_active(&self, now: Instant) -> bool {
        self.expiry.is_some_and(|e| now < e)
    }
}

/// A tracked planar board: an identifier (the detector's board description
/// file), physical dimensions, and one tracking slot per registered camera.
///
/// All methods taking a [`CameraId`] require the camera to have been
/// registered through [`register_camera`] first; asking about an unknown
/// camera is a caller bug and panics.
///
/// [`register_camera`]: MarkerBoard::register_camera
pub struct MarkerBoard {
    id: String,
    width: f64,
    height: f64,
    kind: DetectorKind,
    tuning: TrackingTuning,
    slots: RwLock<HashMap<CameraId, Mutex<TrackingSlot>>>,
}

impl MarkerBoard {
    /// Build a board, inferring the detector kind from the id's extension.
    pub fn new(id: impl Into<String>, width: f64, height: f64) -> Result<Self, TrackError> {
        let id = id.into();
        let kind = DetectorKind::from_board_id(&id)
            .ok_or_else(|| TrackError::UnknownDetectorKind { id: id.clone() })?;
        Ok(Self::with_kind(id, width, height, kind))
    }

    pub fn with_kind(id: impl Into<String>, width: f64, height: f64, kind: DetectorKind) -> Self {
        Self {
            id: id.into(),
            width,
            height,
            kind,
            tuning: TrackingTuning::for_kind(kind),
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Override the kind-default tunables.
    pub fn with_tuning(mut self, tuning: TrackingTuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn kind(&self) -> DetectorKind {
        self.kind
    }

    pub fn tuning(&self) -> &TrackingTuning {
        &self.tuning
    }

    /// Create the tracking slot for a camera, owning the detector instance
    /// that serves this (board, camera) pair. Replaces any previous slot for
    /// the same camera.
    pub fn register_camera(&self, camera: CameraId, detector: Box<dyn MarkerDetector>) {
        let slot = TrackingSlot::new(detector, self.tuning.min_motion);
        self.slots
            .write()
            .expect("slot map lock poisoned")
            .insert(camera, Mutex::new(slot));
    }

    pub fn is_registered(&self, camera: CameraId) -> bool {
        self.slots
            .read()
            .expect("slot map lock poisoned")
            .contains_key(&camera)
    }

    fn with_slot<R>(&self, camera: CameraId, f: impl FnOnce(&mut TrackingSlot) -> R) -> R {
        let slots = self.slots.read().expect("slot map lock poisoned");
        let slot = slots.get(&camera).unwrap_or_else(|| {
            panic!(
                "board `{}` is not registered with camera {:?}",
                self.id, camera
            )
        });
        let mut slot = slot.lock().expect("slot lock poisoned");
        f(&mut slot)
    }

    /// Run one tracking step for a camera's frame.
    ///
    /// Per-frame failures (no detection, out-of-bounds corners, solver
    /// failure, implausible candidates) are logged and leave the pose
    /// untouched; `now` must come from one monotonic clock shared with
    /// [`force_update`] / [`block_update`].
    ///
    /// # Panics
    ///
    /// Panics if the camera was never registered with this board.
    ///
    /// [`force_update`]: MarkerBoard::force_update
    /// [`block_update`]: MarkerBoard::block_update
    pub fn update_position(
        &self,
        camera: CameraId,
        device: &ProjectiveDevice,
        frame: &Frame<'_>,
        now: Instant,
    ) {
        self.with_slot(camera, |slot| {
            if slot.mode == GatingMode::BlockUpdate && slot.gate_active(now) {
                return;
            }

            let Some(detection) = slot.detector.detect(frame) else {
                debug!("board `{}`: no detection this frame", self.id);
                return;
            };
            if self.kind == DetectorKind::Fiducial
                && detection.markers_detected < self.tuning.min_fiducial_markers
            {
                debug!(
                    "board `{}`: only {} markers detected (need {})",
                    self.id, detection.markers_detected, self.tuning.min_fiducial_markers
                );
                return;
            }

            let (w, h) = (f64::from(frame.width), f64::from(frame.height));
            if detection
                .correspondences
                .iter()
                .any(|c| c.image.x < 0.0 || c.image.x >= w || c.image.y < 0.0 || c.image.y >= h)
            {
                debug!("board `{}`: detection outside image bounds", self.id);
                return;
            }

            let (object, image): (Vec<_>, Vec<_>) = detection
                .correspondences
                .iter()
                .map(|c| (c.object, c.image))
                .unzip();
            let candidate = match device.estimate_pose(&object, &image) {
                Ok(pose) => pose,
                Err(err) => {
                    warn!("board `{}`: pose estimation failed: {err}", self.id);
                    return;
                }
            };

            let position = position_of(&candidate);
            if position.z < self.tuning.min_depth || position.z > self.tuning.max_depth {
                debug!(
                    "board `{}`: candidate depth {} outside [{}, {}]",
                    self.id, position.z, self.tuning.min_depth, self.tuning.max_depth
                );
                return;
            }
            let distance = (position - slot.last_position).norm();
            if distance > self.tuning.max_jump {
                debug!(
                    "board `{}`: candidate jumped {distance} (max {})",
                    self.id, self.tuning.max_jump
                );
                return;
            }

            if slot.mode == GatingMode::ForceUpdate && slot.gate_active(now) {
                slot.apply(&candidate);
                return;
            }
            if slot.mode != GatingMode::Normal {
                slot.mode = GatingMode::Normal;
            }

            if slot.drawing_mode {
                if distance > slot.min_motion {
                    slot.apply(&candidate);
                    slot.last_position = position;
                    slot.mode = GatingMode::ForceUpdate;
                    slot.expiry = Some(now + self.tuning.cooldown);
                }
            } else {
                slot.apply(&candidate);
            }
        });
    }

    /// Apply detections unconditionally for `duration` starting at `now`.
    ///
    /// # Panics
    ///
    /// Panics if the camera was never registered with this board.
    pub fn force_update(&self, camera: CameraId, duration: Duration, now: Instant) {
        self.with_slot(camera, |slot| {
            slot.mode = GatingMode::ForceUpdate;
            slot.expiry = Some(now + duration);
        });
    }

    /// Freeze the pose for `duration` starting at `now`.
    ///
    /// # Panics
    ///
    /// Panics if the camera was never registered with this board.
    pub fn block_update(&self, camera: CameraId, duration: Duration, now: Instant) {
        self.with_slot(camera, |slot| {
            slot.mode = GatingMode::BlockUpdate;
            slot.expiry = Some(now + duration);
        });
    }

    /// False only while updates are blocked.
    ///
    /// # Panics
    ///
    /// Panics if the camera was never registered with this board.
    pub fn is_moving(&self, camera: CameraId) -> bool {
        self.with_slot(camera, |slot| slot.mode != GatingMode::BlockUpdate)
    }

    /// # Panics
    ///
    /// Panics if the camera was never registered with this board.
    pub fn gating_mode(&self, camera: CameraId) -> GatingMode {
        self.with_slot(camera, |slot| slot.mode)
    }

    /// The current (filtered) board pose in the camera frame.
    ///
    /// # Panics
    ///
    /// Panics if the camera was never registered with this board.
    pub fn pose(&self, camera: CameraId) -> Matrix4<f64> {
        self.with_slot(camera, |slot| slot.pose)
    }

    /// Overwrite the pose directly, bypassing detection and filtering.
    ///
    /// # Panics
    ///
    /// Panics if the camera was never registered with this board.
    pub fn set_fake_location(&self, camera: CameraId, pose: &Matrix4<f64>) {
        self.with_slot(camera, |slot| slot.pose = *pose);
    }

    /// This board's pose expressed in `other`'s frame, both seen by the same
    /// camera.
    ///
    /// # Panics
    ///
    /// Panics if the camera was never registered with both boards.
    pub fn pose_relative_to(&self, camera: CameraId, other: &MarkerBoard) -> Matrix4<f64> {
        other.pose(camera) * self.pose(camera)
    }

    /// Attach a fresh 12-filter bank to the slot.
    ///
    /// # Panics
    ///
    /// Panics if the camera was never registered with this board.
    pub fn set_filtering(&self, camera: CameraId, params: OneEuroParams) -> Result<(), TrackError> {
        let bank = PoseFilterBank::new(params)?;
        self.with_slot(camera, |slot| slot.filters = Some(bank));
        Ok(())
    }

    /// # Panics
    ///
    /// Panics if the camera was never registered with this board.
    pub fn remove_filtering(&self, camera: CameraId) {
        self.with_slot(camera, |slot| slot.filters = None);
    }

    /// Toggle drawing mode: when enabled, candidates only apply once they
    /// move farther than `min_motion` from the last stable position, and
    /// each apply arms a force-update cooldown.
    ///
    /// # Panics
    ///
    /// Panics if the camera was never registered with this board.
    pub fn set_drawing_mode(&self, camera: CameraId, enabled: bool, min_motion: f64) {
        self.with_slot(camera, |slot| {
            slot.drawing_mode = enabled;
            slot.min_motion = min_motion;
        });
    }
}
