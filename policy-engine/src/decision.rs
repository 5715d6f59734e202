//! Decision types emitted by the resolver.

use std::fmt::{self, Display, Formatter};
use std::time::SystemTime;

use policy_primitives::{BundleVersion, EvaluationMetadata, PolicyName};
use serde::{Deserialize, Serialize};

use crate::contracts::RawEnforcement;

/// Overall outcome of evaluating a bundle against a config document.
///
/// Severity is strictly ordered: `Pass < SoftFail < HardFail`, independent
/// of violation count.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// No enforced violations; the pipeline is admitted silently.
    Pass,
    /// Enforced violations exist but the pipeline is still admitted.
    SoftFail,
    /// The pipeline must be blocked.
    HardFail,
}

/// Enforcement level attributed to a rule's violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementStatus {
    /// The rule is not declared in either enforcement collection; its
    /// violations are recorded but do not gate the pipeline.
    Unset,
    /// Violations admit the pipeline but are surfaced as warnings.
    SoftFail,
    /// Violations block the pipeline.
    HardFail,
}

impl EnforcementStatus {
    /// Resolves raw enforcement declarations, with hard winning over soft
    /// when a rule name is declared in both collections.
    #[must_use]
    pub fn from_raw(raw: RawEnforcement) -> Self {
        if raw.hard_fail() {
            Self::HardFail
        } else if raw.soft_fail() {
            Self::SoftFail
        } else {
            Self::Unset
        }
    }

    /// Returns the severity this enforcement level contributes to the
    /// overall outcome.
    #[must_use]
    pub fn severity(self) -> Severity {
        match self {
            Self::Unset => Severity::Pass,
            Self::SoftFail => Severity::SoftFail,
            Self::HardFail => Severity::HardFail,
        }
    }
}

/// One instance of non-compliance with an attributable reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    rule_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rule_id: Option<String>,
    reason: String,
    enforcement: EnforcementStatus,
}

impl Violation {
    /// Creates a violation attributed to the supplied rule.
    #[must_use]
    pub fn new(
        rule_name: impl Into<String>,
        rule_id: Option<String>,
        reason: impl Into<String>,
        enforcement: EnforcementStatus,
    ) -> Self {
        Self {
            rule_name: rule_name.into(),
            rule_id,
            reason: reason.into(),
            enforcement,
        }
    }

    /// Returns the name of the rule that produced the violation.
    #[must_use]
    pub fn rule_name(&self) -> &str {
        &self.rule_name
    }

    /// Returns the fan-out key, when the rule produced keyed output.
    #[must_use]
    pub fn rule_id(&self) -> Option<&str> {
        self.rule_id.as_deref()
    }

    /// Returns the human-readable reason.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Returns the enforcement level attributed to the violation.
    #[must_use]
    pub fn enforcement(&self) -> EnforcementStatus {
        self.enforcement
    }
}

/// Why an evaluation failed before a content-based decision could be made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureCause {
    /// The evaluator exceeded its time budget.
    Timeout,
    /// The evaluator itself reported an error.
    Evaluator {
        /// Human-readable reason from the evaluator runtime.
        reason: String,
    },
}

impl FailureCause {
    /// Convenience helper for evaluator-reported failures.
    #[must_use]
    pub fn evaluator(reason: impl Into<String>) -> Self {
        Self::Evaluator {
            reason: reason.into(),
        }
    }
}

impl Display for FailureCause {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => f.write_str("timed out"),
            Self::Evaluator { reason } => write!(f, "evaluator error: {reason}"),
        }
    }
}

/// Evaluation failure attached to a fail-closed decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationFailure {
    policy_name: PolicyName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rule_name: Option<String>,
    cause: FailureCause,
}

impl EvaluationFailure {
    /// Creates a failure record attributed to the supplied policy.
    #[must_use]
    pub fn new(policy_name: PolicyName, rule_name: Option<String>, cause: FailureCause) -> Self {
        Self {
            policy_name,
            rule_name,
            cause,
        }
    }

    /// Returns the policy whose evaluation failed.
    #[must_use]
    pub fn policy_name(&self) -> &PolicyName {
        &self.policy_name
    }

    /// Returns the offending rule, when attributable.
    #[must_use]
    pub fn rule_name(&self) -> Option<&str> {
        self.rule_name.as_deref()
    }

    /// Returns the failure cause.
    #[must_use]
    pub fn cause(&self) -> &FailureCause {
        &self.cause
    }
}

/// The resolved, immutable outcome of one bundle evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    bundle_version: BundleVersion,
    outcome: Severity,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    violations: Vec<Violation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    failure: Option<EvaluationFailure>,
    metadata: EvaluationMetadata,
    timestamp: SystemTime,
}

impl Decision {
    /// Creates a decision resolved from rule content.
    #[must_use]
    pub fn new(
        bundle_version: BundleVersion,
        outcome: Severity,
        violations: Vec<Violation>,
        metadata: EvaluationMetadata,
    ) -> Self {
        Self {
            bundle_version,
            outcome,
            violations,
            failure: None,
            metadata,
            timestamp: SystemTime::now(),
        }
    }

    /// Creates a fail-closed decision for an evaluation that could not
    /// complete. The outcome is always [`Severity::HardFail`]; an
    /// undecidable evaluation never admits a pipeline.
    #[must_use]
    pub fn fail_closed(
        bundle_version: BundleVersion,
        failure: EvaluationFailure,
        metadata: EvaluationMetadata,
    ) -> Self {
        Self {
            bundle_version,
            outcome: Severity::HardFail,
            violations: Vec::new(),
            failure: Some(failure),
            metadata,
            timestamp: SystemTime::now(),
        }
    }

    /// Returns the bundle version the evaluation ran against.
    #[must_use]
    pub fn bundle_version(&self) -> BundleVersion {
        self.bundle_version
    }

    /// Returns the overall outcome.
    #[must_use]
    pub fn outcome(&self) -> Severity {
        self.outcome
    }

    /// Returns all recorded violations.
    #[must_use]
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Returns the attached evaluation failure, if the decision failed
    /// closed.
    #[must_use]
    pub fn failure(&self) -> Option<&EvaluationFailure> {
        self.failure.as_ref()
    }

    /// Returns the trigger metadata the evaluation ran with.
    #[must_use]
    pub fn metadata(&self) -> &EvaluationMetadata {
        &self.metadata
    }

    /// Returns the time the decision was resolved.
    #[must_use]
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    /// Returns true when the gate may admit the pipeline.
    #[must_use]
    pub fn is_admissible(&self) -> bool {
        self.outcome != Severity::HardFail
    }

    /// Returns the soft-enforced violations to surface to the user.
    #[must_use]
    pub fn warnings(&self) -> Vec<&Violation> {
        self.violations
            .iter()
            .filter(|violation| violation.enforcement() == EnforcementStatus::SoftFail)
            .collect()
    }
}
