use log::warn;
use nalgebra::Matrix4;

use procam_core::{FilterError, OneEuroFilter, OneEuroParams};

/// The 12 smoothed pose cells: the 9 rotation cells, then the translation
/// column. The bottom row of a pose is constant and never filtered.
const CELLS: [(usize, usize); 12] = [
    (0, 0),
    (0, 1),
    (0, 2),
    (1, 0),
    (1, 1),
    (1, 2),
    (2, 0),
    (2, 1),
    (2, 2),
    (0, 3),
    (1, 3),
    (2, 3),
];

/// Twelve independent one-euro filters, one per pose cell.
///
/// Cell-to-filter assignment is fixed for the lifetime of the bank, so each
/// filter only ever sees one signal.
#[derive(Clone, Debug)]
pub struct PoseFilterBank {
    filters: [OneEuroFilter; 12],
}

impl PoseFilterBank {
    pub fn new(params: OneEuroParams) -> Result<Self, FilterError> {
        let filter = OneEuroFilter::with_params(params)?;
        Ok(Self {
            filters: std::array::from_fn(|_| filter.clone()),
        })
    }

    /// Feed a candidate pose through the bank and return the smoothed pose.
    ///
    /// A filter failure on a cell (non-finite sample) commits the raw
    /// candidate value for that cell instead of losing the frame.
    pub fn apply(&mut self, candidate: &Matrix4<f64>) -> Matrix4<f64> {
        let mut out = *candidate;
        for (filter, &(i, j)) in self.filters.iter_mut().zip(CELLS.iter()) {
            out[(i, j)] = match filter.filter(candidate[(i, j)]) {
                Ok(value) => value,
                Err(err) => {
                    warn!("pose filter cell ({i},{j}): {err}; committing raw value");
                    candidate[(i, j)]
                }
            };
        }
        out
    }

    /// Drop all signal history, keeping the parameters.
    pub fn reset(&mut self) {
        for filter in &mut self.filters {
            filter.reset();
        }
    }
}
