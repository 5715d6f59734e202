//! Decision resolution engine for config policies.
//!
//! The engine layers decision semantics on top of an external declarative
//! rule evaluator: enablement gating, enforcement precedence, violation
//! fan-out, and severity aggregation. Rule bodies are opaque here; the
//! evaluator behind [`RuleEvaluator`] interprets them.

#![warn(missing_docs, clippy::pedantic)]

mod contracts;
mod decision;
mod error;
mod evaluator;
mod registry;
mod resolver;

pub use contracts::{
    BundleEvaluation, Enablement, EvaluatorInput, PolicyDefinition, PolicyEvaluation,
    RawEnforcement, RuleEvaluation,
};
pub use decision::{
    Decision, EnforcementStatus, EvaluationFailure, FailureCause, Severity, Violation,
};
pub use error::{PolicyError, PolicyResult};
pub use evaluator::{BundleEvaluator, EvaluatorConfig, RuleEvaluator};
pub use registry::{Bundle, BundleRegistry, InMemoryRegistry};
pub use resolver::resolve;
