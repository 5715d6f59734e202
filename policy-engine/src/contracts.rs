//! Raw evaluation contracts between the evaluator adapter and the resolver.

use policy_primitives::{BundleVersion, ConfigDocument, EvaluationMetadata, PolicyName};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{PolicyError, PolicyResult};

/// A single declarative policy source accepted into a bundle.
///
/// The structural contract is validated at construction: exactly one
/// `package` declaration and exactly one `policy_name` singleton whose value
/// is a valid [`PolicyName`]. Rule bodies are opaque to the engine; only the
/// evaluator interprets them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDefinition {
    name: PolicyName,
    package: String,
    source: String,
}

impl PolicyDefinition {
    /// Parses a declarative policy source, enforcing the structural
    /// contract.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidSource`] when the source does not
    /// declare exactly one package and exactly one `policy_name`, or
    /// [`PolicyError::InvalidName`] when the declared name fails
    /// validation.
    pub fn parse(source: impl Into<String>) -> PolicyResult<Self> {
        let source = source.into();
        let mut packages = Vec::new();
        let mut names = Vec::new();

        for line in source.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(rest) = line.strip_prefix("package ") {
                let package = rest.split_whitespace().next().unwrap_or_default();
                if package.is_empty() {
                    return Err(PolicyError::invalid_source("empty package declaration"));
                }
                packages.push(package.to_owned());
            } else if let Some(rest) = line.strip_prefix("policy_name") {
                let rest = rest.trim_start();
                let Some(value) = rest.strip_prefix(":=").or_else(|| rest.strip_prefix('=')) else {
                    continue;
                };
                names.push(parse_quoted(value.trim())?);
            }
        }

        if packages.len() != 1 {
            return Err(PolicyError::invalid_source(format!(
                "expected exactly one package declaration, found {}",
                packages.len()
            )));
        }
        if names.len() != 1 {
            return Err(PolicyError::invalid_source(format!(
                "expected exactly one policy_name declaration, found {}",
                names.len()
            )));
        }

        let name = PolicyName::new(names.remove(0))?;
        Ok(Self {
            name,
            package: packages.remove(0),
            source,
        })
    }

    /// Returns the declared policy name.
    #[must_use]
    pub fn name(&self) -> &PolicyName {
        &self.name
    }

    /// Returns the declared package namespace.
    #[must_use]
    pub fn package(&self) -> &str {
        &self.package
    }

    /// Returns the full source text as submitted.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }
}

fn parse_quoted(value: &str) -> PolicyResult<String> {
    let inner = value
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .ok_or_else(|| PolicyError::invalid_source("policy_name value must be a quoted string"))?;
    Ok(inner.to_owned())
}

/// Whether a rule name appears in the `enable_rule` collection and, when it
/// does, whether the declaration's guard held for the current metadata.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Enablement {
    /// The rule has no enablement declaration and is inert.
    Undeclared,
    /// The rule is declared in `enable_rule`.
    Declared {
        /// Whether the declaration's guard predicate held.
        guard_satisfied: bool,
    },
}

/// Raw membership of a rule name in the enforcement collections.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEnforcement {
    hard_fail: bool,
    soft_fail: bool,
}

impl RawEnforcement {
    /// Creates a declaration from the two membership flags.
    #[must_use]
    pub const fn new(hard_fail: bool, soft_fail: bool) -> Self {
        Self {
            hard_fail,
            soft_fail,
        }
    }

    /// Membership of the rule name in `hard_fail`.
    #[must_use]
    pub const fn hard_fail(self) -> bool {
        self.hard_fail
    }

    /// Membership of the rule name in `soft_fail`.
    #[must_use]
    pub const fn soft_fail(self) -> bool {
        self.soft_fail
    }
}

/// Raw per-rule result produced by the evaluator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuleEvaluation {
    rule_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    output: Option<Value>,
    enablement: Enablement,
    #[serde(default)]
    enforcement: RawEnforcement,
}

impl RuleEvaluation {
    /// Creates a raw result for a rule that produced no output and carries
    /// no declarations.
    #[must_use]
    pub fn new(rule_name: impl Into<String>) -> Self {
        Self {
            rule_name: rule_name.into(),
            output: None,
            enablement: Enablement::Undeclared,
            enforcement: RawEnforcement::default(),
        }
    }

    /// Attaches the rule's raw evaluation output.
    #[must_use]
    pub fn with_output(mut self, output: Value) -> Self {
        self.output = Some(output);
        self
    }

    /// Marks the rule as declared in `enable_rule` with a satisfied guard.
    #[must_use]
    pub fn enabled(self) -> Self {
        self.guarded(true)
    }

    /// Marks the rule as declared in `enable_rule` with the supplied guard
    /// result.
    #[must_use]
    pub fn guarded(mut self, guard_satisfied: bool) -> Self {
        self.enablement = Enablement::Declared { guard_satisfied };
        self
    }

    /// Declares the rule name in the `hard_fail` collection.
    #[must_use]
    pub fn hard_fail(mut self) -> Self {
        self.enforcement = RawEnforcement::new(true, self.enforcement.soft_fail());
        self
    }

    /// Declares the rule name in the `soft_fail` collection.
    #[must_use]
    pub fn soft_fail(mut self) -> Self {
        self.enforcement = RawEnforcement::new(self.enforcement.hard_fail(), true);
        self
    }

    /// Returns the rule name.
    #[must_use]
    pub fn rule_name(&self) -> &str {
        &self.rule_name
    }

    /// Returns the raw evaluation output, absent when the rule did not
    /// fire.
    #[must_use]
    pub fn output(&self) -> Option<&Value> {
        self.output.as_ref()
    }

    /// Returns the enablement declaration state.
    #[must_use]
    pub fn enablement(&self) -> Enablement {
        self.enablement
    }

    /// Returns the raw enforcement declarations.
    #[must_use]
    pub fn enforcement(&self) -> RawEnforcement {
        self.enforcement
    }
}

/// Raw evaluation results for one policy in a bundle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolicyEvaluation {
    policy_name: PolicyName,
    rules: Vec<RuleEvaluation>,
}

impl PolicyEvaluation {
    /// Creates the evaluation result for one policy.
    #[must_use]
    pub fn new(policy_name: PolicyName, rules: Vec<RuleEvaluation>) -> Self {
        Self { policy_name, rules }
    }

    /// Returns the evaluated policy's name.
    #[must_use]
    pub fn policy_name(&self) -> &PolicyName {
        &self.policy_name
    }

    /// Returns the raw per-rule results.
    #[must_use]
    pub fn rules(&self) -> &[RuleEvaluation] {
        &self.rules
    }
}

/// Raw evaluation results for a whole bundle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BundleEvaluation {
    version: BundleVersion,
    policies: Vec<PolicyEvaluation>,
}

impl BundleEvaluation {
    /// Creates the evaluation result for a bundle snapshot.
    #[must_use]
    pub fn new(version: BundleVersion, policies: Vec<PolicyEvaluation>) -> Self {
        Self { version, policies }
    }

    /// Returns the version of the bundle that was evaluated.
    #[must_use]
    pub fn version(&self) -> BundleVersion {
        self.version
    }

    /// Returns the per-policy results.
    #[must_use]
    pub fn policies(&self) -> &[PolicyEvaluation] {
        &self.policies
    }
}

/// Marshaled input handed to the evaluator: the config document under
/// `input` and trigger metadata under `data.meta`, kept in separate
/// namespaces.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorInput {
    input: Value,
    data: Value,
}

impl EvaluatorInput {
    /// Marshals a document and metadata into the evaluator's input shape.
    ///
    /// The document subtree is serialized unmodified, so policies see the
    /// `workflows` / `jobs` / `docker.image` paths exactly as configured.
    ///
    /// # Panics
    ///
    /// Panics only if metadata serialization fails, which cannot happen for
    /// these types.
    #[must_use]
    pub fn marshal(document: &ConfigDocument, metadata: &EvaluationMetadata) -> Self {
        let meta = serde_json::to_value(metadata).expect("metadata serializes");
        Self {
            input: document.to_value(),
            data: json!({ "meta": meta }),
        }
    }

    /// Returns the config document subtree.
    #[must_use]
    pub fn input(&self) -> &Value {
        &self.input
    }

    /// Returns the `data` namespace carrying `meta`.
    #[must_use]
    pub fn data(&self) -> &Value {
        &self.data
    }
}
