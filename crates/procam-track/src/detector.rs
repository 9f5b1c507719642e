use nalgebra::{Point2, Point3};

/// A borrowed grayscale frame handed to a detector.
///
/// Pixel access is the detector's business; the tracker itself only uses the
/// dimensions for its image-bounds sanity check.
#[derive(Clone, Copy, Debug)]
pub struct Frame<'a> {
    pub width: u32,
    pub height: u32,
    pub pixels: &'a [u8],
}

/// One board-point/image-point pair reported by a detector.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Correspondence {
    /// Point in the board frame (z = 0 on the board plane).
    pub object: Point3<f64>,
    /// Observed pixel position.
    pub image: Point2<f64>,
}

/// The outcome of one detection pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Detection {
    pub correspondences: Vec<Correspondence>,
    /// How many individual markers contributed. Fiducial trackers report
    /// their per-image marker count here; feature trackers report 1.
    pub markers_detected: usize,
}

impl Detection {
    pub fn new(correspondences: Vec<Correspondence>, markers_detected: usize) -> Self {
        Self {
            correspondences,
            markers_detected,
        }
    }
}

/// Finds a board in a frame.
///
/// One detector instance serves one (board, camera) slot; implementations
/// may keep per-stream state between frames. Returning `None` means the
/// board was not found this frame, which is an ordinary per-frame outcome,
/// not an error.
pub trait MarkerDetector: Send {
    fn detect(&mut self, frame: &Frame<'_>) -> Option<Detection>;
}

/// The two supported detection strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectorKind {
    /// Multi-marker fiducial tracking (board described by a `.cfg` file).
    Fiducial,
    /// Template feature matching against a board image (`.png` / `.jpg`).
    Feature,
}

impl DetectorKind {
    /// Infer the strategy from a board identifier's extension, or `None`
    /// when the extension matches neither convention.
    pub fn from_board_id(id: &str) -> Option<Self> {
        if id.ends_with(".cfg") {
            Some(Self::Fiducial)
        } else if id.ends_with(".png") || id.ends_with(".jpg") {
            Some(Self::Feature)
        } else {
            None
        }
    }
}
