use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use policy_audit::{DecisionLog, DecisionQuery, MemoryDecisionLog};
use policy_engine::{
    BundleEvaluator, EvaluatorConfig, EvaluatorInput, FailureCause, InMemoryRegistry,
    PolicyDefinition, PolicyResult, RuleEvaluation, RuleEvaluator, Severity,
};
use policy_primitives::{
    BundleVersion, ConfigDocument, DockerSection, EvaluationMetadata, Job, OrgId, ProjectId,
    Workflow,
};
use policy_gate::{GateOutcome, PipelineGate};
use serde_json::Value;

/// Evaluator stub that derives declarations from the policy source text and
/// computes rule output from the marshaled input, the way a declarative
/// runtime would.
struct StubEvaluator {
    calls: AtomicUsize,
}

impl StubEvaluator {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    fn declarations(source: &str, rule: &str) -> RuleEvaluation {
        let mut evaluation = RuleEvaluation::new(rule);
        if source.contains(&format!("enable_rule[\"{rule}\"]")) {
            evaluation = evaluation.enabled();
        }
        if source.contains(&format!("hard_fail[\"{rule}\"]")) {
            evaluation = evaluation.hard_fail();
        }
        if source.contains(&format!("soft_fail[\"{rule}\"]")) {
            evaluation = evaluation.soft_fail();
        }
        evaluation
    }

    fn guard_satisfied(source: &str, input: &EvaluatorInput) -> bool {
        let Some(rest) = source.split("data.meta.project_id == \"").nth(1) else {
            return true;
        };
        let Some(required) = rest.split('"').next() else {
            return true;
        };
        input.data()["meta"]["project_id"] == Value::from(required)
    }

    fn docker_images(input: &EvaluatorInput) -> Vec<String> {
        let Some(jobs) = input.input()["jobs"].as_array() else {
            return Vec::new();
        };
        jobs.iter()
            .filter_map(|job| job["docker"].as_array())
            .flatten()
            .filter_map(|section| section["image"].as_str())
            .map(str::to_owned)
            .collect()
    }
}

#[async_trait]
impl RuleEvaluator for StubEvaluator {
    async fn evaluate(
        &self,
        policy: &PolicyDefinition,
        input: &EvaluatorInput,
    ) -> PolicyResult<Vec<RuleEvaluation>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let source = policy.source();

        match policy.name().as_str() {
            "workflow_policy" => {
                let mut evaluation = Self::declarations(source, "contains_workflows");
                let empty = input.input()["workflows"]
                    .as_array()
                    .is_none_or(Vec::is_empty);
                if empty {
                    evaluation = evaluation
                        .with_output("config must contain at least one workflow".into());
                }
                if !Self::guard_satisfied(source, input) {
                    evaluation = evaluation.guarded(false);
                }
                Ok(vec![evaluation])
            }
            "docker_image_policy" => {
                let mut evaluation = Self::declarations(source, "use_official_docker_image");
                let offenders: serde_json::Map<String, Value> = Self::docker_images(input)
                    .into_iter()
                    .filter(|image| !image.starts_with("cimg/"))
                    .map(|image| {
                        let reason = format!("{image} is not an approved Docker image");
                        (image, Value::from(reason))
                    })
                    .collect();
                if !offenders.is_empty() {
                    evaluation = evaluation.with_output(Value::Object(offenders));
                }
                Ok(vec![evaluation])
            }
            other => panic!("unexpected policy `{other}`"),
        }
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

const WORKFLOW_POLICY: &str = r#"
package org

policy_name = "workflow_policy"

contains_workflows = "config must contain at least one workflow" {
    count(input.workflows) == 0
}

enable_rule["contains_workflows"]
hard_fail["contains_workflows"]
"#;

const DOCKER_POLICY_HARD: &str = r#"
package org

policy_name = "docker_image_policy"

use_official_docker_image[image] = reason {
    image := input.jobs[_].docker[_].image
    not startswith(image, "cimg/")
    reason := sprintf("%s is not an approved Docker image", [image])
}

enable_rule["use_official_docker_image"]
hard_fail["use_official_docker_image"]
"#;

const DOCKER_POLICY_SOFT: &str = r#"
package org

policy_name = "docker_image_policy"

use_official_docker_image[image] = reason {
    image := input.jobs[_].docker[_].image
    not startswith(image, "cimg/")
    reason := sprintf("%s is not an approved Docker image", [image])
}

enable_rule["use_official_docker_image"]
soft_fail["use_official_docker_image"]
"#;

fn gate_with(evaluator: Arc<dyn RuleEvaluator>, config: EvaluatorConfig) -> (PipelineGate, Arc<MemoryDecisionLog>) {
    let registry = Arc::new(InMemoryRegistry::new());
    let log = Arc::new(MemoryDecisionLog::new());
    let gate = PipelineGate::new(
        registry,
        BundleEvaluator::new(evaluator, config).expect("valid config"),
        Arc::clone(&log) as Arc<dyn DecisionLog>,
    );
    (gate, log)
}

fn document(images: &[&str]) -> ConfigDocument {
    let jobs = images
        .iter()
        .enumerate()
        .map(|(index, image)| {
            Job::new(format!("job-{index}"), vec![DockerSection::new(*image)])
        })
        .collect();
    let workflows = vec![Workflow::new("build", vec!["job-0".into()])];
    ConfigDocument::new(workflows, jobs)
}

fn metadata(project: ProjectId, build: u64) -> EvaluationMetadata {
    EvaluationMetadata::new(project, "main", build)
}

#[tokio::test]
async fn blocks_unofficial_docker_images() {
    let evaluator = Arc::new(StubEvaluator::new());
    let (gate, log) = gate_with(Arc::clone(&evaluator) as Arc<dyn RuleEvaluator>, EvaluatorConfig::new());
    let org = OrgId::random();
    let project = ProjectId::random();

    gate.publish_policies(
        org,
        &[WORKFLOW_POLICY.to_owned(), DOCKER_POLICY_HARD.to_owned()],
    )
    .await
    .unwrap();

    let outcome = gate
        .check(
            org,
            &document(&["cimg/base:2023.01", "myorg/custom:latest"]),
            &metadata(project, 1),
        )
        .await
        .unwrap();

    let GateOutcome::Blocked { decision } = outcome else {
        panic!("expected blocked outcome");
    };
    assert_eq!(decision.outcome(), Severity::HardFail);
    assert_eq!(decision.violations().len(), 1);
    let violation = &decision.violations()[0];
    assert_eq!(violation.rule_name(), "use_official_docker_image");
    assert_eq!(violation.rule_id(), Some("myorg/custom:latest"));
    assert_eq!(
        violation.reason(),
        "myorg/custom:latest is not an approved Docker image"
    );

    // One evaluator call per policy in the bundle.
    assert_eq!(evaluator.calls.load(Ordering::SeqCst), 2);

    let recorded = log
        .find(DecisionQuery::any().org(org).project(project).build(1))
        .await
        .unwrap();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].decision().outcome(), Severity::HardFail);
}

#[tokio::test]
async fn soft_enforcement_admits_with_warnings() {
    let evaluator = Arc::new(StubEvaluator::new());
    let (gate, log) = gate_with(evaluator, EvaluatorConfig::new());
    let org = OrgId::random();
    let project = ProjectId::random();

    gate.publish_policies(
        org,
        &[WORKFLOW_POLICY.to_owned(), DOCKER_POLICY_SOFT.to_owned()],
    )
    .await
    .unwrap();

    let outcome = gate
        .check(
            org,
            &document(&["myorg/custom:latest"]),
            &metadata(project, 2),
        )
        .await
        .unwrap();

    assert!(outcome.is_admitted());
    let GateOutcome::AdmittedWithWarnings { decision } = outcome else {
        panic!("expected warnings outcome");
    };
    assert_eq!(decision.outcome(), Severity::SoftFail);
    assert_eq!(decision.warnings().len(), 1);

    let recorded = log.find(DecisionQuery::any().org(org)).await.unwrap();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].decision().outcome(), Severity::SoftFail);
}

#[tokio::test]
async fn empty_workflows_fail_the_workflow_policy() {
    let evaluator = Arc::new(StubEvaluator::new());
    let (gate, _log) = gate_with(evaluator, EvaluatorConfig::new());
    let org = OrgId::random();

    gate.publish_policies(org, &[WORKFLOW_POLICY.to_owned()])
        .await
        .unwrap();

    let empty = ConfigDocument::new(Vec::new(), Vec::new());
    let outcome = gate
        .check(org, &empty, &metadata(ProjectId::random(), 3))
        .await
        .unwrap();

    let GateOutcome::Blocked { decision } = outcome else {
        panic!("expected blocked outcome");
    };
    assert_eq!(
        decision.violations()[0].reason(),
        "config must contain at least one workflow"
    );
}

#[tokio::test]
async fn unconfigured_org_admits_and_still_records() {
    let evaluator = Arc::new(StubEvaluator::new());
    let (gate, log) = gate_with(evaluator, EvaluatorConfig::new());
    let org = OrgId::random();

    let outcome = gate
        .check(
            org,
            &document(&["cimg/base:2023.01"]),
            &metadata(ProjectId::random(), 4),
        )
        .await
        .unwrap();

    let GateOutcome::Admitted { decision } = outcome else {
        panic!("expected admitted outcome");
    };
    assert_eq!(decision.outcome(), Severity::Pass);
    assert_eq!(decision.bundle_version(), BundleVersion::unpublished());

    let recorded = log.find(DecisionQuery::any().org(org)).await.unwrap();
    assert_eq!(recorded.len(), 1);
}

#[tokio::test]
async fn project_guard_scopes_the_rule() {
    let evaluator = Arc::new(StubEvaluator::new());
    let (gate, _log) = gate_with(evaluator, EvaluatorConfig::new());
    let org = OrgId::random();
    let pinned = ProjectId::random();

    let guarded_policy = format!(
        "package org\n\npolicy_name = \"workflow_policy\"\n\n\
         contains_workflows = \"config must contain at least one workflow\"\n\n\
         enable_rule[\"contains_workflows\"] {{ data.meta.project_id == \"{pinned}\" }}\n\
         hard_fail[\"contains_workflows\"]\n"
    );
    gate.publish_policies(org, &[guarded_policy]).await.unwrap();

    let empty = ConfigDocument::new(Vec::new(), Vec::new());

    // A different project does not satisfy the guard; the rule is excluded
    // even though its body would fire.
    let other = gate
        .check(org, &empty, &metadata(ProjectId::random(), 5))
        .await
        .unwrap();
    assert!(matches!(other, GateOutcome::Admitted { .. }));

    let scoped = gate.check(org, &empty, &metadata(pinned, 6)).await.unwrap();
    assert!(matches!(scoped, GateOutcome::Blocked { .. }));
}

#[tokio::test]
async fn evaluator_timeout_fails_closed() {
    let config = EvaluatorConfig::new().with_timeout(Duration::from_millis(20));
    let (gate, log) = gate_with(Arc::new(HangingEvaluator), config);
    let org = OrgId::random();

    gate.publish_policies(org, &[WORKFLOW_POLICY.to_owned()])
        .await
        .unwrap();

    let outcome = gate
        .check(
            org,
            &document(&["cimg/base:2023.01"]),
            &metadata(ProjectId::random(), 7),
        )
        .await
        .unwrap();

    let GateOutcome::Blocked { decision } = outcome else {
        panic!("expected fail-closed block");
    };
    assert_eq!(decision.outcome(), Severity::HardFail);
    let failure = decision.failure().expect("failure attached");
    assert_eq!(failure.policy_name().as_str(), "workflow_policy");
    assert!(matches!(failure.cause(), FailureCause::Timeout));

    let recorded = log.find(DecisionQuery::any().org(org)).await.unwrap();
    assert_eq!(recorded.len(), 1);
    assert!(recorded[0].decision().failure().is_some());
}

#[tokio::test]
async fn duplicate_publish_is_rejected_before_evaluation() {
    let evaluator = Arc::new(StubEvaluator::new());
    let (gate, _log) = gate_with(Arc::clone(&evaluator) as Arc<dyn RuleEvaluator>, EvaluatorConfig::new());
    let org = OrgId::random();

    let err = gate
        .publish_policies(
            org,
            &[WORKFLOW_POLICY.to_owned(), WORKFLOW_POLICY.to_owned()],
        )
        .await
        .expect_err("duplicate names");
    assert!(err.to_string().contains("duplicate policy name"));
    assert_eq!(evaluator.calls.load(Ordering::SeqCst), 0);
}
