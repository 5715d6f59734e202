//! Core shared types for the config policy decision engine.

#![warn(missing_docs, clippy::pedantic)]

mod document;
mod error;
mod ids;
mod metadata;
mod name;

/// Pipeline configuration document model exposed to policy evaluation.
pub use document::{ConfigDocument, DockerSection, Job, Workflow};
/// Error type and result alias shared across the workspace.
pub use error::{Error, Result};
/// Organization, project, and bundle version identifiers.
pub use ids::{BundleVersion, OrgId, ProjectId};
/// Per-evaluation trigger context.
pub use metadata::EvaluationMetadata;
/// Validated policy name.
pub use name::PolicyName;
