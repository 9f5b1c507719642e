use std::time::Duration;

use serde::{Deserialize, Serialize};

use procam_core::OneEuroParams;

use crate::detector::DetectorKind;

/// Per-tracker-kind tunables for the update-gating pipeline.
///
/// Distances share the unit of the board dimensions (millimetres in
/// practice). The jump threshold compares against the last *stable*
/// position irrespective of elapsed time, so genuinely fast motion can be
/// rejected; known limitation, kept for behavioral compatibility.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackingTuning {
    /// Candidates closer than this are implausible and rejected.
    pub min_depth: f64,
    /// Candidates farther than this are rejected.
    pub max_depth: f64,
    /// Maximum plausible positional jump from the last stable position.
    pub max_jump: f64,
    /// Force-update window armed after a drawing-mode apply.
    pub cooldown: Duration,
    /// Default drawing-mode minimum-motion threshold.
    pub min_motion: f64,
    /// Fiducial detections with fewer markers than this are discarded.
    pub min_fiducial_markers: usize,
    /// Parameters used when a pose filter bank is attached.
    pub filter: OneEuroParams,
}

impl Default for TrackingTuning {
    fn default() -> Self {
        Self {
            min_depth: 10.0,
            max_depth: 10_000.0,
            max_jump: 1_500.0,
            cooldown: Duration::from_millis(1_000),
            min_motion: 2.0,
            min_fiducial_markers: 2,
            filter: OneEuroParams::default(),
        }
    }
}

impl TrackingTuning {
    /// Defaults for a detector kind. Feature tracking carries the full
    /// far-field and jump rejection; fiducial tracking only rejects the
    /// near field.
    pub fn for_kind(kind: DetectorKind) -> Self {
        match kind {
            DetectorKind::Feature => Self::default(),
            DetectorKind::Fiducial => Self {
                max_depth: f64::INFINITY,
                max_jump: f64::INFINITY,
                ..Self::default()
            },
        }
    }
}
