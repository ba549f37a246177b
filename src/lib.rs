//! nsbas-xval: jackknife uncertainties for NSBAS InSAR time-series inversion
//!
//! For every pixel with enough valid interferograms the library solves the
//! NSBAS system (interferogram rows plus weighted polynomial constraint rows)
//! once per observed epoch, leaving that epoch's interferograms out, and
//! reports the mean and standard deviation of the constraint parameters.
//! Pixels of each scan line are spread over a pool of workers.

pub mod types;
pub mod io;
pub mod core;

#[cfg(feature = "python")]
mod python;

// Re-export main types and functions for easier access
pub use types::{
    NsbasError, NsbasResult, InversionConfig, DegenerateSamples, Matrix, Vector, IgramStack, NO_DATA,
};

pub use crate::io::{Epochs, EpochWeights, ProcessingParams, InMemoryStack, InversionProducts, LineSink, LineSource};
pub use crate::core::{NetworkDesign, NsbasInverter, XvalPipeline, NetworkInputs, WeightSource, RunSummary};
