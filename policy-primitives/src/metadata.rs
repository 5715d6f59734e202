//! Per-evaluation trigger context.

use serde::{Deserialize, Serialize};

use crate::ids::ProjectId;

/// Read-only context describing the pipeline trigger under evaluation.
///
/// Exposed to policy evaluation as a namespace distinct from the config
/// document, so rules can branch on trigger context without conflating it
/// with config content.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetadata {
    project_id: ProjectId,
    branch: String,
    build_number: u64,
}

impl EvaluationMetadata {
    /// Creates metadata for a single evaluation.
    #[must_use]
    pub fn new(project_id: ProjectId, branch: impl Into<String>, build_number: u64) -> Self {
        Self {
            project_id,
            branch: branch.into(),
            build_number,
        }
    }

    /// Returns the project identifier.
    #[must_use]
    pub fn project_id(&self) -> ProjectId {
        self.project_id
    }

    /// Returns the branch that triggered the pipeline.
    #[must_use]
    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Returns the build number of the triggering run.
    #[must_use]
    pub fn build_number(&self) -> u64 {
        self.build_number
    }
}
