//! Pipeline admission gate over the config policy engine.
//!
//! The gate is called synchronously by the pipeline-control system before
//! admitting a run: it snapshots the organization's active bundle, evaluates
//! it against the config document and trigger metadata, resolves the
//! decision, records it, and reports whether to admit.

#![warn(missing_docs, clippy::pedantic)]

mod gate;

pub use gate::{GateError, GateOutcome, GateResult, PipelineGate};
