use std::sync::{Arc, Mutex};

use crate::board::MarkerBoard;

/// The boards one camera currently tracks.
///
/// Registration and iteration are mutex-guarded so setup code can add
/// boards while a frame loop walks the list from another thread; frame
/// loops take a snapshot instead of holding the lock across updates.
#[derive(Default)]
pub struct CameraBoards {
    boards: Mutex<Vec<Arc<MarkerBoard>>>,
}

impl CameraBoards {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, board: Arc<MarkerBoard>) {
        self.boards
            .lock()
            .expect("board list lock poisoned")
            .push(board);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.boards
            .lock()
            .expect("board list lock poisoned")
            .iter()
            .any(|b| b.id() == id)
    }

    pub fn len(&self) -> usize {
        self.boards.lock().expect("board list lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A clone of the current board list, safe to iterate without holding
    /// the lock.
    pub fn snapshot(&self) -> Vec<Arc<MarkerBoard>> {
        self.boards.lock().expect("board list lock poisoned").clone()
    }
}
