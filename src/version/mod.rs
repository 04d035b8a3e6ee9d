//! Version handling: the value-level model, shape inference and the shared
//! types the checkers exchange with the orchestrator.
//!
//! # Modules
//!
//! - [`model`]: parsing, normalization and "latest of N" selection
//! - [`pattern`]: reference-version shape inference
//! - [`types`]: `CheckOptions`, `CheckOutcome`, `ResolutionResult`
//! - [`error`]: checker and store error types

pub mod error;
pub mod model;
pub mod pattern;
pub mod types;
