//! Gate orchestration: snapshot, evaluate, resolve, record.

use std::sync::Arc;

use policy_audit::{AuditError, DecisionLog, DecisionRecord};
use policy_engine::{
    Bundle, BundleEvaluator, BundleRegistry, Decision, EvaluationFailure, PolicyDefinition,
    PolicyError, Severity, resolve,
};
use policy_primitives::{BundleVersion, ConfigDocument, EvaluationMetadata, OrgId};
use thiserror::Error;
use tracing::{info, warn};

/// Errors surfaced by the pipeline gate.
#[derive(Debug, Error)]
pub enum GateError {
    /// Registration or resolution failed.
    #[error(transparent)]
    Policy(#[from] PolicyError),
    /// The decision could not be recorded.
    #[error(transparent)]
    Audit(#[from] AuditError),
}

/// Result alias for gate operations.
pub type GateResult<T> = Result<T, GateError>;

/// The gate's verdict on a pipeline run, carrying the full decision so the
/// caller can surface per-rule reasons.
#[derive(Debug, Clone)]
pub enum GateOutcome {
    /// No enforced violations; admit silently.
    Admitted {
        /// The recorded decision.
        decision: Decision,
    },
    /// Soft violations only; admit but surface the warnings.
    AdmittedWithWarnings {
        /// The recorded decision.
        decision: Decision,
    },
    /// Hard violations or an undecidable evaluation; block admission.
    Blocked {
        /// The recorded decision.
        decision: Decision,
    },
}

impl GateOutcome {
    fn from_decision(decision: Decision) -> Self {
        match decision.outcome() {
            Severity::Pass => Self::Admitted { decision },
            Severity::SoftFail => Self::AdmittedWithWarnings { decision },
            Severity::HardFail => Self::Blocked { decision },
        }
    }

    /// Returns the decision behind the verdict.
    #[must_use]
    pub fn decision(&self) -> &Decision {
        match self {
            Self::Admitted { decision }
            | Self::AdmittedWithWarnings { decision }
            | Self::Blocked { decision } => decision,
        }
    }

    /// Returns true when the pipeline may run.
    #[must_use]
    pub fn is_admitted(&self) -> bool {
        !matches!(self, Self::Blocked { .. })
    }
}

/// Synchronous admission gate for pipeline-trigger events.
///
/// Evaluations are independent of one another: each takes its own bundle
/// snapshot and shares no mutable state, so runs for different
/// organizations and pipelines proceed fully in parallel.
pub struct PipelineGate {
    registry: Arc<dyn BundleRegistry>,
    evaluator: BundleEvaluator,
    log: Arc<dyn DecisionLog>,
}

impl PipelineGate {
    /// Creates a gate over the supplied registry, evaluator adapter, and
    /// decision log.
    #[must_use]
    pub fn new(
        registry: Arc<dyn BundleRegistry>,
        evaluator: BundleEvaluator,
        log: Arc<dyn DecisionLog>,
    ) -> Self {
        Self {
            registry,
            evaluator,
            log,
        }
    }

    /// Parses policy sources and publishes them as the organization's new
    /// bundle.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidSource`], [`PolicyError::InvalidName`],
    /// or [`PolicyError::DuplicateName`] without touching the active bundle;
    /// registration failures never reach evaluation.
    pub async fn publish_policies(
        &self,
        org: OrgId,
        sources: &[String],
    ) -> GateResult<BundleVersion> {
        let mut policies = Vec::with_capacity(sources.len());
        for source in sources {
            policies.push(PolicyDefinition::parse(source.clone())?);
        }
        Ok(self.registry.publish(org, policies).await?)
    }

    /// Gates one pipeline run: evaluates the organization's active bundle
    /// against the config document and metadata, records the decision, and
    /// returns the verdict.
    ///
    /// An evaluator failure or timeout fails closed: the recorded decision
    /// is a hard fail with the failure attached, never a silent pass. The
    /// decision record is written exactly once, after resolution completes;
    /// an evaluation abandoned earlier writes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Audit`] when the decision cannot be recorded,
    /// or [`GateError::Policy`] for resolution failures such as duplicate
    /// policy names.
    pub async fn check(
        &self,
        org: OrgId,
        document: &ConfigDocument,
        metadata: &EvaluationMetadata,
    ) -> GateResult<GateOutcome> {
        let bundle = self.registry.active_bundle(org).await?;
        let decision = self.decide(&bundle, document, metadata).await?;

        self.log
            .record(&DecisionRecord::new(org, decision.clone()))
            .await?;

        info!(
            org = %org,
            project = %metadata.project_id(),
            build = metadata.build_number(),
            bundle_version = %decision.bundle_version(),
            outcome = ?decision.outcome(),
            violations = decision.violations().len(),
            "pipeline gate decision recorded"
        );

        for warning in decision.warnings() {
            warn!(
                rule = warning.rule_name(),
                rule_id = warning.rule_id().unwrap_or_default(),
                reason = warning.reason(),
                "policy warning"
            );
        }

        Ok(GateOutcome::from_decision(decision))
    }

    async fn decide(
        &self,
        bundle: &Bundle,
        document: &ConfigDocument,
        metadata: &EvaluationMetadata,
    ) -> GateResult<Decision> {
        if bundle.is_empty() {
            return Ok(Decision::new(
                bundle.version(),
                Severity::Pass,
                Vec::new(),
                metadata.clone(),
            ));
        }

        match self
            .evaluator
            .evaluate_bundle(bundle, document, metadata)
            .await
        {
            Ok(evaluation) => Ok(resolve(&evaluation, metadata)?),
            Err(PolicyError::Evaluation {
                policy_name,
                rule_name,
                cause,
            }) => {
                warn!(
                    policy = %policy_name,
                    cause = %cause,
                    "policy evaluation failed; failing closed"
                );
                Ok(Decision::fail_closed(
                    bundle.version(),
                    EvaluationFailure::new(policy_name, rule_name, cause),
                    metadata.clone(),
                ))
            }
            Err(other) => Err(other.into()),
        }
    }
}
