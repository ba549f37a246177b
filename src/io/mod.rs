//! I/O modules for epochs, weights, processing parameters and line-oriented stacks

pub mod epochs;
pub mod weights;
pub mod params;
pub mod stack;

pub use epochs::Epochs;
pub use weights::EpochWeights;
pub use params::ProcessingParams;
pub use stack::{LineSource, LineSink, InMemoryStack, InversionProducts, ProductMetadata};
