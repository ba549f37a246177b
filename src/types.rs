use ndarray::{Array1, Array2, Array3};
use serde::{Deserialize, Serialize};

/// Real-valued matrix used for design, constraint and system matrices
pub type Matrix = Array2<f64>;

/// Real-valued vector (observations, weights, parameters)
pub type Vector = Array1<f64>;

/// Interferogram stack (interferogram x line x column)
pub type IgramStack = Array3<f32>;

/// Value written into parameter and uncertainty outputs for pixels that were not inverted
pub const NO_DATA: f64 = f64::NAN;

/// Default relative singular-value cutoff of the least-squares solver
pub const DEFAULT_RCOND: f64 = 1.0e-8;

/// Default weight of the polynomial constraint rows
pub const DEFAULT_GAMMA: f64 = 1.0e-4;

/// How jackknife samples with non-finite parameters enter the final statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DegenerateSamples {
    /// Drop non-finite samples before computing mean and deviation
    Exclude,
    /// Keep every sample; a single NaN sample turns the pixel result into NaN
    Propagate,
}

impl Default for DegenerateSamples {
    fn default() -> Self {
        DegenerateSamples::Exclude
    }
}

/// Immutable per-run inversion settings shared read-only by every worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InversionConfig {
    /// Weight of the constraint rows (gamma)
    pub gamma: f64,
    /// Minimum number of valid interferograms for a pixel to be inverted
    pub min_valid: usize,
    /// Number of workers per scan line
    pub workers: usize,
    /// Relative singular-value cutoff of the least-squares solver
    pub rcond: f64,
    /// Treatment of degenerate jackknife samples
    pub degenerate_samples: DegenerateSamples,
}

impl Default for InversionConfig {
    fn default() -> Self {
        Self {
            gamma: DEFAULT_GAMMA,
            min_valid: 1,
            workers: 1,
            rcond: DEFAULT_RCOND,
            degenerate_samples: DegenerateSamples::Exclude,
        }
    }
}

impl InversionConfig {
    /// Check the settings before any pixel is processed
    pub fn validate(&self) -> NsbasResult<()> {
        if !self.gamma.is_finite() || self.gamma <= 0.0 {
            return Err(NsbasError::Config(format!(
                "Constraint weight gamma must be positive and finite, got {}",
                self.gamma
            )));
        }
        if self.min_valid == 0 {
            return Err(NsbasError::Config(
                "Minimum number of valid interferograms must be at least 1".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(NsbasError::Config(
                "Number of workers must be at least 1".to_string(),
            ));
        }
        if !self.rcond.is_finite() || self.rcond < 0.0 {
            return Err(NsbasError::Config(format!(
                "Solver cutoff rcond must be non-negative, got {}",
                self.rcond
            )));
        }
        Ok(())
    }
}

/// Error types for NSBAS inversion
#[derive(Debug, thiserror::Error)]
pub enum NsbasError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("XML parsing error: {0}")]
    XmlParsing(String),

    #[error("Linear algebra error: {0}")]
    Linalg(String),

    #[error("Worker for line {line}, chunk {chunk} failed: {message}")]
    Worker {
        line: usize,
        chunk: usize,
        message: String,
    },
}

/// Result type for NSBAS operations
pub type NsbasResult<T> = Result<T, NsbasError>;
