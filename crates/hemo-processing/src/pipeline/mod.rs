//! Pipeline module.
//!
//! [`Pipeline`] ties the tier resolver, normalizer, feature transformer,
//! scorer, cache and fetcher together behind the read contract.

mod builder;
mod loader;
pub mod progress;

pub use builder::{Pipeline, PipelineBuilder};
pub use progress::{ClosureProgressReporter, PipelineStage, ProgressReporter, ProgressUpdate};
