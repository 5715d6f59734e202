//! Versioned policy bundle registry.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use policy_primitives::{BundleVersion, OrgId};
use tracing::info;

use crate::contracts::PolicyDefinition;
use crate::error::{PolicyError, PolicyResult};

/// Immutable snapshot of the policies active for an organization.
///
/// An evaluation holds the snapshot it started with; a publish racing with
/// in-flight evaluations does not affect them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bundle {
    version: BundleVersion,
    policies: Vec<PolicyDefinition>,
}

impl Bundle {
    /// Creates a bundle snapshot at the supplied version.
    #[must_use]
    pub fn new(version: BundleVersion, policies: Vec<PolicyDefinition>) -> Self {
        Self { version, policies }
    }

    /// The implicit bundle of an organization that never published
    /// policies. Evaluating it resolves to a pass.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            version: BundleVersion::unpublished(),
            policies: Vec::new(),
        }
    }

    /// Returns the bundle version.
    #[must_use]
    pub fn version(&self) -> BundleVersion {
        self.version
    }

    /// Returns the policies in publish order.
    #[must_use]
    pub fn policies(&self) -> &[PolicyDefinition] {
        &self.policies
    }

    /// Returns true when the bundle holds no policies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

/// Trait implemented by bundle registry backends.
#[async_trait]
pub trait BundleRegistry: Send + Sync {
    /// Atomically replaces the organization's active bundle with the
    /// supplied policy set, returning the new version.
    async fn publish(
        &self,
        org: OrgId,
        policies: Vec<PolicyDefinition>,
    ) -> PolicyResult<BundleVersion>;

    /// Returns the organization's active bundle snapshot. Organizations
    /// with no published policies get the empty bundle, not an error.
    async fn active_bundle(&self, org: OrgId) -> PolicyResult<Arc<Bundle>>;
}

/// In-memory registry keeping one versioned bundle per organization.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    bundles: RwLock<HashMap<OrgId, Arc<Bundle>>>,
}

impl InMemoryRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BundleRegistry for InMemoryRegistry {
    async fn publish(
        &self,
        org: OrgId,
        policies: Vec<PolicyDefinition>,
    ) -> PolicyResult<BundleVersion> {
        let mut seen = HashSet::new();
        for policy in &policies {
            if !seen.insert(policy.name().clone()) {
                return Err(PolicyError::DuplicateName {
                    policy_name: policy.name().clone(),
                });
            }
        }

        let mut guard = self.bundles.write().expect("bundle store poisoned");
        let version = guard
            .get(&org)
            .map_or(BundleVersion::initial(), |bundle| bundle.version().next());
        guard.insert(org, Arc::new(Bundle::new(version, policies)));

        info!(org = %org, version = %version, "policy bundle published");
        Ok(version)
    }

    async fn active_bundle(&self, org: OrgId) -> PolicyResult<Arc<Bundle>> {
        let guard = self.bundles.read().expect("bundle store poisoned");
        Ok(guard
            .get(&org)
            .cloned()
            .unwrap_or_else(|| Arc::new(Bundle::empty())))
    }
}
