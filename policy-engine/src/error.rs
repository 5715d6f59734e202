//! Error definitions for the policy engine.

use policy_primitives::PolicyName;
use thiserror::Error;

use crate::decision::FailureCause;

/// Result alias for policy engine operations.
pub type PolicyResult<T> = Result<T, PolicyError>;

/// Errors surfaced by the policy engine.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// A policy name failed the length or charset constraint.
    #[error(transparent)]
    InvalidName(#[from] policy_primitives::Error),

    /// Two policies in the same bundle share a name.
    #[error("duplicate policy name `{policy_name}` in bundle")]
    DuplicateName {
        /// The colliding policy name.
        policy_name: PolicyName,
    },

    /// A policy source violated the structural contract.
    #[error("invalid policy source: {reason}")]
    InvalidSource {
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// The underlying evaluator failed or timed out on a policy.
    #[error("policy `{policy_name}` evaluation failed: {cause}")]
    Evaluation {
        /// The policy whose evaluation failed.
        policy_name: PolicyName,
        /// The offending rule, when attributable.
        rule_name: Option<String>,
        /// Why the evaluation failed.
        cause: FailureCause,
    },

    /// An enabled rule produced an output shape outside the accepted set.
    #[error(
        "rule `{rule_name}` in policy `{policy_name}` produced an unsupported output shape: {detail}"
    )]
    MalformedOutput {
        /// The policy containing the offending rule.
        policy_name: PolicyName,
        /// The rule whose output failed shape validation.
        rule_name: String,
        /// What was wrong with the output.
        detail: String,
    },

    /// Evaluator configuration was invalid.
    #[error("invalid evaluator configuration: {0}")]
    InvalidConfig(&'static str),
}

impl PolicyError {
    /// Convenience helper for structural-contract rejections.
    #[must_use]
    pub fn invalid_source(reason: impl Into<String>) -> Self {
        Self::InvalidSource {
            reason: reason.into(),
        }
    }
}
