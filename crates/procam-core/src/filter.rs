use serde::{Deserialize, Serialize};

/// Errors produced by the one-euro filter.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
pub enum FilterError {
    #[error("filter parameter {name} must be positive (got {value})")]
    InvalidParameter { name: &'static str, value: f64 },

    #[error("non-finite sample fed to filter (got {value})")]
    NonFiniteSample { value: f64 },
}

/// Tunable parameters of a one-euro filter.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OneEuroParams {
    /// Nominal sampling frequency in Hz.
    pub frequency: f64,
    /// Cutoff frequency at rest; lower removes more jitter.
    pub min_cutoff: f64,
    /// Speed coefficient; higher reduces lag during fast motion.
    pub beta: f64,
    /// Cutoff for the derivative estimate.
    pub derivative_cutoff: f64,
}

impl Default for OneEuroParams {
    fn default() -> Self {
        Self {
            frequency: 30.0,
            min_cutoff: 1.0,
            beta: 0.0,
            derivative_cutoff: 1.0,
        }
    }
}

/// An adaptive low-pass filter for one scalar channel: heavy smoothing at
/// rest, light smoothing during fast motion.
///
/// Each filter instance carries state for exactly one signal; a pose matrix
/// is smoothed by a bank of independent instances, one per cell.
#[derive(Clone, Debug)]
pub struct OneEuroFilter {
    params: OneEuroParams,
    last_raw: Option<f64>,
    x: LowPass,
    dx: LowPass,
}

impl OneEuroFilter {
    /// Build a filter with the given sampling frequency and the default
    /// cutoffs.
    pub fn new(frequency: f64) -> Result<Self, FilterError> {
        Self::with_params(OneEuroParams {
            frequency,
            ..OneEuroParams::default()
        })
    }

    pub fn with_params(params: OneEuroParams) -> Result<Self, FilterError> {
        check_positive("frequency", params.frequency)?;
        check_positive("min_cutoff", params.min_cutoff)?;
        check_positive("derivative_cutoff", params.derivative_cutoff)?;
        Ok(Self {
            params,
            last_raw: None,
            x: LowPass::new(),
            dx: LowPass::new(),
        })
    }

    pub fn params(&self) -> &OneEuroParams {
        &self.params
    }

    pub fn set_frequency(&mut self, frequency: f64) -> Result<(), FilterError> {
        check_positive("frequency", frequency)?;
        self.params.frequency = frequency;
        Ok(())
    }

    pub fn set_min_cutoff(&mut self, min_cutoff: f64) -> Result<(), FilterError> {
        check_positive("min_cutoff", min_cutoff)?;
        self.params.min_cutoff = min_cutoff;
        Ok(())
    }

    pub fn set_beta(&mut self, beta: f64) {
        self.params.beta = beta;
    }

    /// Feed one sample and return the filtered value.
    ///
    /// A non-finite sample (or a non-finite internal state, if the signal
    /// previously diverged) is reported instead of being propagated, so the
    /// caller can fall back to the raw value.
    pub fn filter(&mut self, value: f64) -> Result<f64, FilterError> {
        if !value.is_finite() {
            return Err(FilterError::NonFiniteSample { value });
        }

        let freq = self.params.frequency;
        let derivative = match self.last_raw {
            Some(prev) => (value - prev) * freq,
            None => 0.0,
        };
        self.last_raw = Some(value);

        let edx = self.dx.apply(derivative, alpha(freq, self.params.derivative_cutoff));
        let cutoff = self.params.min_cutoff + self.params.beta * edx.abs();
        let out = self.x.apply(value, alpha(freq, cutoff));

        if !out.is_finite() {
            return Err(FilterError::NonFiniteSample { value: out });
        }
        Ok(out)
    }

    /// Drop all signal history, keeping the parameters.
    pub fn reset(&mut self) {
        self.last_raw = None;
        self.x = LowPass::new();
        self.dx = LowPass::new();
    }
}

fn check_positive(name: &'static str, value: f64) -> Result<(), FilterError> {
    if !(value.is_finite() && value > 0.0) {
        return Err(FilterError::InvalidParameter { name, value });
    }
    Ok(())
}

fn alpha(freq: f64, cutoff: f64) -> f64 {
    let tau = 1.0 / (2.0 * std::f64::consts::PI * cutoff);
    let te = 1.0 / freq;
    1.0 / (1.0 + tau / te)
}

#[derive(Clone, Debug)]
struct LowPass {
    state: Option<f64>,
}

impl LowPass {
    fn new() -> Self {
        Self { state: None }
    }

    fn apply(&mut self, value: f64, alpha: f64) -> f64 {
        let out = match self.state {
            Some(prev) => alpha * value + (1.0 - alpha) * prev,
            None => value,
        };
        self.state = Some(out);
        out
    }
}
