//! Pure decision resolution over raw evaluator output.
//!
//! Resolution is a pure function of (bundle evaluation, metadata): no hidden
//! state, fully reproducible for audit replay given the same inputs and the
//! same evaluator version.

use std::collections::HashSet;

use policy_primitives::EvaluationMetadata;
use serde_json::Value;
use tracing::{debug, warn};

use crate::contracts::{BundleEvaluation, Enablement, RuleEvaluation};
use crate::decision::{Decision, EnforcementStatus, Severity, Violation};
use crate::error::{PolicyError, PolicyResult};

/// Resolves raw per-rule evaluator output into a final decision.
///
/// Rules without an enablement declaration, or whose guard did not hold,
/// are discarded outputs and all; this lets helper rules with non-compliant
/// output shapes coexist in a bundle. An enabled rule with an unsupported
/// output shape downgrades to a single synthetic hard violation while the
/// rest of the bundle resolves normally. Aggregation is order-independent:
/// the outcome is the maximum severity over all violations.
///
/// # Errors
///
/// Returns [`PolicyError::DuplicateName`] when two policies in the
/// evaluation share a name. The registry already guarantees uniqueness;
/// this re-check fails fast instead of silently resolving one arbitrarily.
pub fn resolve(
    evaluation: &BundleEvaluation,
    metadata: &EvaluationMetadata,
) -> PolicyResult<Decision> {
    let mut seen = HashSet::new();
    for policy in evaluation.policies() {
        if !seen.insert(policy.policy_name().clone()) {
            return Err(PolicyError::DuplicateName {
                policy_name: policy.policy_name().clone(),
            });
        }
    }

    let mut violations = Vec::new();
    for policy in evaluation.policies() {
        for rule in policy.rules() {
            match rule.enablement() {
                Enablement::Undeclared => {
                    debug!(
                        policy = %policy.policy_name(),
                        rule = rule.rule_name(),
                        "rule has no enable_rule declaration; skipped"
                    );
                    continue;
                }
                Enablement::Declared {
                    guard_satisfied: false,
                } => {
                    debug!(
                        policy = %policy.policy_name(),
                        rule = rule.rule_name(),
                        "enable_rule guard not satisfied; skipped"
                    );
                    continue;
                }
                Enablement::Declared {
                    guard_satisfied: true,
                } => {}
            }

            extract_violations(policy.policy_name(), rule, &mut violations);
        }
    }

    let outcome = violations
        .iter()
        .map(|violation| violation.enforcement().severity())
        .max()
        .unwrap_or(Severity::Pass);

    Ok(Decision::new(
        evaluation.version(),
        outcome,
        violations,
        metadata.clone(),
    ))
}

fn extract_violations(
    policy_name: &policy_primitives::PolicyName,
    rule: &RuleEvaluation,
    violations: &mut Vec<Violation>,
) {
    let enforcement = EnforcementStatus::from_raw(rule.enforcement());

    match classify_output(rule.output()) {
        Ok(entries) => {
            for (rule_id, reason) in entries {
                violations.push(Violation::new(
                    rule.rule_name(),
                    rule_id,
                    reason,
                    enforcement,
                ));
            }
        }
        Err(detail) => {
            // The malformed rule downgrades to one synthetic hard violation
            // carrying the error text; sibling rules resolve normally.
            let error = PolicyError::MalformedOutput {
                policy_name: policy_name.clone(),
                rule_name: rule.rule_name().to_owned(),
                detail,
            };
            warn!(%error, "malformed rule output");
            violations.push(Violation::new(
                rule.rule_name(),
                None,
                error.to_string(),
                EnforcementStatus::HardFail,
            ));
        }
    }
}

/// Classifies a raw output value into fan-out entries of (rule id, reason).
///
/// Accepted shapes: absent, string, array of strings (keyed by index), and
/// string-to-string map (keyed by map key).
fn classify_output(output: Option<&Value>) -> Result<Vec<(Option<String>, String)>, String> {
    match output {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(reason)) => Ok(vec![(None, reason.clone())]),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(index, item)| match item {
                Value::String(reason) => Ok((Some(index.to_string()), reason.clone())),
                other => Err(format!("array entry {index} is not a string: {other}")),
            })
            .collect(),
        Some(Value::Object(entries)) => entries
            .iter()
            .map(|(key, value)| match value {
                Value::String(reason) => Ok((Some(key.clone()), reason.clone())),
                other => Err(format!("map entry `{key}` is not a string: {other}")),
            })
            .collect(),
        Some(other) => Err(format!("expected string, string array, or string map, got {other}")),
    }
}
