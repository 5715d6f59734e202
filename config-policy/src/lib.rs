//! Config policy decision engine SDK facade.
//!
//! Depend on this crate via `cargo add config-policy`. It bundles the
//! workspace crates behind feature flags so embedders can pull in only the
//! components they gate pipelines with.

#![warn(missing_docs, clippy::pedantic)]

/// Re-export shared primitives for convenience.
pub use policy_primitives as primitives;

/// Evaluator adapter, decision resolver, and bundle registry (enabled by
/// the `engine` feature).
#[cfg(feature = "engine")]
pub use policy_engine as engine;

/// Append-only decision audit log (enabled by the `audit` feature).
#[cfg(feature = "audit")]
pub use policy_audit as audit;

/// Pipeline admission gate (enabled by the `gate` feature).
#[cfg(feature = "gate")]
pub use policy_gate as gate;
