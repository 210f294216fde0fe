//! Shared types for the DOR oracle.
//!
//! This crate defines the data model that flows through the pipeline:
//! rate sources, observations, the aggregated reference rate, push outcomes
//! and the cycle records handed to persistence. Configuration types live in
//! [`configs`] so every crate can consume them without depending on the loader.

pub mod configs;
pub mod cycle;
pub mod observation;
pub mod rate;
pub mod source;
pub mod validation;

pub use configs::*;
pub use cycle::*;
pub use observation::*;
pub use rate::*;
pub use source::*;
pub use validation::*;
