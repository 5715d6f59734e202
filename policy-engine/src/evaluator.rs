//! Adapter over the external declarative rule evaluator.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use policy_primitives::{ConfigDocument, EvaluationMetadata};
use tokio::time::timeout;
use tracing::debug;

use crate::contracts::{BundleEvaluation, EvaluatorInput, PolicyDefinition, PolicyEvaluation, RuleEvaluation};
use crate::decision::FailureCause;
use crate::error::{PolicyError, PolicyResult};
use crate::registry::Bundle;

/// Trait implemented by declarative rule evaluation backends.
///
/// The backend interprets rule bodies against the marshaled input and
/// reports, per rule, the raw output plus the enablement and enforcement
/// declarations. It never persists or mutates policy definitions.
#[async_trait]
pub trait RuleEvaluator: Send + Sync {
    /// Evaluates every rule of one policy against the supplied input.
    async fn evaluate(
        &self,
        policy: &PolicyDefinition,
        input: &EvaluatorInput,
    ) -> PolicyResult<Vec<RuleEvaluation>>;
}

/// Configuration for bundle evaluation.
#[derive(Debug, Clone, Copy)]
pub struct EvaluatorConfig {
    timeout: Duration,
}

impl EvaluatorConfig {
    /// Creates a configuration with the default per-policy time budget.
    #[must_use]
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(10),
        }
    }

    /// Overrides the per-policy time budget.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the per-policy time budget.
    #[must_use]
    pub const fn timeout(self) -> Duration {
        self.timeout
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidConfig`] when the time budget is zero.
    pub fn validate(self) -> PolicyResult<()> {
        if self.timeout.is_zero() {
            return Err(PolicyError::InvalidConfig(
                "evaluation timeout must be greater than zero",
            ));
        }
        Ok(())
    }
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs a bundle through the external evaluator, one policy at a time.
///
/// The adapter owns the marshaling of document and metadata into the
/// evaluator's input shape and the bounding of each invocation by the
/// configured time budget. It has no side effects beyond invoking the
/// evaluator.
pub struct BundleEvaluator {
    evaluator: Arc<dyn RuleEvaluator>,
    config: EvaluatorConfig,
}

impl BundleEvaluator {
    /// Creates an adapter over the supplied evaluator backend.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidConfig`] when the configuration fails
    /// validation.
    pub fn new(evaluator: Arc<dyn RuleEvaluator>, config: EvaluatorConfig) -> PolicyResult<Self> {
        config.validate()?;
        Ok(Self { evaluator, config })
    }

    /// Evaluates every policy in the bundle against the document and
    /// metadata.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Evaluation`] identifying the offending policy
    /// when the backend errors or exceeds the time budget. A failed policy
    /// is never skipped silently.
    pub async fn evaluate_bundle(
        &self,
        bundle: &Bundle,
        document: &ConfigDocument,
        metadata: &EvaluationMetadata,
    ) -> PolicyResult<BundleEvaluation> {
        let input = EvaluatorInput::marshal(document, metadata);
        let mut policies = Vec::with_capacity(bundle.policies().len());

        for policy in bundle.policies() {
            let rules = match timeout(
                self.config.timeout(),
                self.evaluator.evaluate(policy, &input),
            )
            .await
            {
                Ok(Ok(rules)) => rules,
                Ok(Err(err)) => return Err(attribute(policy, err)),
                Err(_) => {
                    return Err(PolicyError::Evaluation {
                        policy_name: policy.name().clone(),
                        rule_name: None,
                        cause: FailureCause::Timeout,
                    });
                }
            };

            debug!(
                policy = %policy.name(),
                rules = rules.len(),
                "policy evaluated"
            );
            policies.push(PolicyEvaluation::new(policy.name().clone(), rules));
        }

        Ok(BundleEvaluation::new(bundle.version(), policies))
    }
}

fn attribute(policy: &PolicyDefinition, err: PolicyError) -> PolicyError {
    match err {
        // Already attributed by the backend, e.g. to a specific rule.
        PolicyError::Evaluation { .. } => err,
        other => PolicyError::Evaluation {
            policy_name: policy.name().clone(),
            rule_name: None,
            cause: FailureCause::evaluator(other.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use policy_primitives::ProjectId;
    use serde_json::json;

    struct StaticEvaluator;

    #[async_trait]
    impl RuleEvaluator for StaticEvaluator {
        async fn evaluate(
            &self,
            _policy: &PolicyDefinition,
            input: &EvaluatorInput,
        ) -> PolicyResult<Vec<RuleEvaluation>> {
            assert!(input.data().get("meta").is_some());
            Ok(vec![
                RuleEvaluation::new("contains_workflows")
                    .with_output(json!("config must contain at least one workflow"))
                    .enabled()
                    .hard_fail(),
            ])
        }
    }

    struct HangingEvaluator;

    #[async_trait]
    impl RuleEvaluator for HangingEvaluator {
        async fn evaluate(
            &self,
            _policy: &PolicyDefinition,
            _input: &EvaluatorInput,
        ) -> PolicyResult<Vec<RuleEvaluation>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Vec::new())
        }
    }

    fn bundle() -> Bundle {
        let definition = PolicyDefinition::parse(
            "package org\npolicy_name = \"workflow_policy\"\n",
        )
        .expect("parse");
        Bundle::new(policy_primitives::BundleVersion::initial(), vec![definition])
    }

    fn metadata() -> EvaluationMetadata {
        EvaluationMetadata::new(ProjectId::random(), "main", 11)
    }

    #[tokio::test]
    async fn evaluates_each_policy_once() {
        let adapter =
            BundleEvaluator::new(Arc::new(StaticEvaluator), EvaluatorConfig::new()).unwrap();
        let evaluation = adapter
            .evaluate_bundle(&bundle(), &ConfigDocument::default(), &metadata())
            .await
            .unwrap();

        assert_eq!(evaluation.policies().len(), 1);
        assert_eq!(
            evaluation.policies()[0].rules()[0].rule_name(),
            "contains_workflows"
        );
    }

    #[tokio::test]
    async fn timeout_surfaces_as_evaluation_error() {
        let config = EvaluatorConfig::new().with_timeout(Duration::from_millis(20));
        let adapter = BundleEvaluator::new(Arc::new(HangingEvaluator), config).unwrap();
        let err = adapter
            .evaluate_bundle(&bundle(), &ConfigDocument::default(), &metadata())
            .await
            .expect_err("must time out");

        assert!(matches!(
            err,
            PolicyError::Evaluation {
                cause: FailureCause::Timeout,
                ..
            }
        ));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config = EvaluatorConfig::new().with_timeout(Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(PolicyError::InvalidConfig(_))
        ));
    }
}
