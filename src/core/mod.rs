//! Core NSBAS inversion and jackknife modules

pub mod linalg;
pub mod timefn;
pub mod design;
pub mod reduction;
pub mod solver;
pub mod jackknife;
pub mod dispatch;
pub mod pipeline;

// Re-export main types
pub use timefn::{TimeFunction, TimeBasis, time_basis, parse_model, default_constraint};
pub use design::{NetworkDesign, DesignParams};
pub use reduction::{EpochRow, ReducedProblem, SkipReason, constraint_rows, reduce_pixel, valid_observations};
pub use solver::ConstrainedSolver;
pub use jackknife::{JackknifeEstimator, JackknifeSummary, summarize};
pub use dispatch::{NsbasInverter, PixelInverter, PixelOutcome, LineBuffers, LineState, RunSummary, partition};
pub use pipeline::{XvalPipeline, NetworkInputs, WeightSource};
