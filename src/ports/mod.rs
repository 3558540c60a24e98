//! Ports layer: Trait definitions for external operations.
//!
//! Following Hexagonal Architecture, these traits define the boundaries
//! between the statistic engine and its collaborators (noise source,
//! downstream classifier).

mod classifier;
mod privacy;

pub use classifier::{Classifier, LabeledData, ModelError};
pub use privacy::{check_parameters, DifferentialPrivacy, DpError, Mechanism};
