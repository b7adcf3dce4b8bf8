//! Versioned policy registry over a [`PolicyStore`]

use crate::error::PolicyError;
use crate::evaluator::PolicyEvaluator;
use semver::Version;
use tracing::info;
use warrant_domain::traits::{PolicyQuery, PolicyStore};
use warrant_domain::{Policy, PolicyId, PolicyStatus, Timestamp, ValidationCode, ValidationError};

/// Owns the lifecycle of stored policies
///
/// Each `(id, version)` pair is registered once. Status only moves forward:
/// draft to active, draft or active to archived.
#[derive(Debug, Clone, Default)]
pub struct PolicyRegistry {
    evaluator: PolicyEvaluator,
}

impl PolicyRegistry {
    /// Create a registry that validates patterns with `evaluator`'s limits
    pub fn new(evaluator: PolicyEvaluator) -> Self {
        Self { evaluator }
    }

    /// Evaluator used for validation
    pub fn evaluator(&self) -> &PolicyEvaluator {
        &self.evaluator
    }

    /// Check a policy without storing it
    pub fn validate(&self, policy: &Policy) -> Result<(), ValidationError> {
        policy.validate()?;
        self.evaluator.check_patterns(policy)
    }

    /// Store a new policy version
    ///
    /// New versions must be drafts; [`activate`](Self::activate) is the only
    /// way to make a version enforceable.
    pub fn register<S: PolicyStore>(&self, store: &mut S, policy: Policy) -> Result<Policy, PolicyError> {
        if policy.status != PolicyStatus::Draft {
            return Err(ValidationError::invalid_value(
                "status",
                PolicyStatus::Draft.as_str(),
                policy.status.as_str(),
            )
            .into());
        }
        self.validate(&policy)?;

        let existing = store
            .get_policy(&policy.id, &policy.version)
            .map_err(PolicyError::store)?;
        if existing.is_some() {
            return Err(ValidationError::duplicate(
                "version",
                format!("{}@{}", policy.id, policy.version),
            )
            .into());
        }

        store.upsert_policy(&policy).map_err(PolicyError::store)?;
        info!(policy = %policy.id, version = %policy.version, status = policy.status.as_str(), "Registered policy");
        Ok(policy)
    }

    /// Make a draft version enforceable
    ///
    /// Any other active version of the same policy is archived in the same
    /// transaction, so at most one version of a policy is ever active.
    pub fn activate<S: PolicyStore>(
        &self,
        store: &mut S,
        id: &PolicyId,
        version: &Version,
    ) -> Result<Policy, PolicyError> {
        store
            .transaction(|s| {
                let policy = self.set_status(s, id, version, PolicyStatus::Active)?;

                let active = s
                    .query_policies(&PolicyQuery {
                        id: Some(id.clone()),
                        status: Some(PolicyStatus::Active),
                    })
                    .map_err(PolicyError::store)?;
                for mut superseded in active.into_iter().filter(|p| p.version != *version) {
                    superseded.status = PolicyStatus::Archived;
                    s.upsert_policy(&superseded).map_err(PolicyError::store)?;
                    info!(
                        policy = %id,
                        version = %superseded.version,
                        superseded_by = %version,
                        "Archived superseded policy version"
                    );
                }
                Ok::<_, PolicyError>(policy)
            })
            .map_err(PolicyError::store)?
    }

    /// Retire a version
    pub fn archive<S: PolicyStore>(
        &self,
        store: &mut S,
        id: &PolicyId,
        version: &Version,
    ) -> Result<Policy, PolicyError> {
        self.set_status(store, id, version, PolicyStatus::Archived)
    }

    /// One stored version
    pub fn get<S: PolicyStore>(
        &self,
        store: &S,
        id: &PolicyId,
        version: &Version,
    ) -> Result<Option<Policy>, PolicyError> {
        store.get_policy(id, version).map_err(PolicyError::store)
    }

    /// Highest stored version of `id`, whatever its status
    pub fn latest<S: PolicyStore>(&self, store: &S, id: &PolicyId) -> Result<Option<Policy>, PolicyError> {
        let versions = store
            .query_policies(&PolicyQuery {
                id: Some(id.clone()),
                status: None,
            })
            .map_err(PolicyError::store)?;
        Ok(versions.into_iter().max_by(|a, b| a.version.cmp(&b.version)))
    }

    /// Stored policies, optionally restricted to one status
    pub fn list<S: PolicyStore>(
        &self,
        store: &S,
        status: Option<PolicyStatus>,
    ) -> Result<Vec<Policy>, PolicyError> {
        store
            .query_policies(&PolicyQuery { id: None, status })
            .map_err(PolicyError::store)
    }

    /// Active policies whose window contains `now`, one version per id
    ///
    /// Should a store hold several active versions of one policy, only the
    /// highest effective one is returned.
    pub fn effective_policies<S: PolicyStore>(
        &self,
        store: &S,
        now: Timestamp,
    ) -> Result<Vec<Policy>, PolicyError> {
        let active = self.list(store, Some(PolicyStatus::Active))?;

        let mut newest: Vec<Policy> = Vec::new();
        for policy in active.into_iter().filter(|p| p.is_effective_at(now)) {
            match newest.iter_mut().find(|p| p.id == policy.id) {
                Some(current) if current.version < policy.version => *current = policy,
                Some(_) => {}
                None => newest.push(policy),
            }
        }
        Ok(newest)
    }

    fn set_status<S: PolicyStore>(
        &self,
        store: &mut S,
        id: &PolicyId,
        version: &Version,
        next: PolicyStatus,
    ) -> Result<Policy, PolicyError> {
        let mut policy = store
            .get_policy(id, version)
            .map_err(PolicyError::store)?
            .ok_or_else(|| ValidationError::not_found("policy", format!("{}@{}", id, version)))?;

        if !policy.status.can_become(next) {
            return Err(ValidationError::new(
                "status",
                ValidationCode::InvalidTransition,
                format!(
                    "Invalid policy transition from {} to {}",
                    policy.status.as_str(),
                    next.as_str()
                ),
                allowed_from(policy.status),
                next.as_str(),
            )
            .into());
        }

        policy.status = next;
        store.upsert_policy(&policy).map_err(PolicyError::store)?;
        info!(policy = %id, version = %version, status = next.as_str(), "Policy status changed");
        Ok(policy)
    }
}

fn allowed_from(status: PolicyStatus) -> String {
    let allowed: Vec<&str> = [PolicyStatus::Draft, PolicyStatus::Active, PolicyStatus::Archived]
        .into_iter()
        .filter(|next| status.can_become(*next))
        .map(|next| next.as_str())
        .collect();
    if allowed.is_empty() {
        "none (terminal)".to_string()
    } else {
        allowed.join("|")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warrant_domain::traits::PolicyStore;
    use warrant_domain::{ConditionOperator, PolicyEffect, PolicyRule, RuleCondition};
    use warrant_store::MemoryStore;

    fn refunds(version: Version) -> Policy {
        Policy::new("refunds", "Refunds").with_version(version).with_rule(
            PolicyRule::new("deny-large", "Large refunds", PolicyEffect::Deny)
                .with_condition(RuleCondition::new("resource.amount", ConditionOperator::GreaterThan, 1000)),
        )
    }

    #[test]
    fn test_register_and_get() {
        let registry = PolicyRegistry::default();
        let mut store = MemoryStore::new();

        registry.register(&mut store, refunds(Version::new(1, 0, 0))).unwrap();
        let fetched = registry
            .get(&store, &PolicyId::new("refunds"), &Version::new(1, 0, 0))
            .unwrap()
            .unwrap();
        assert_eq!(fetched.status, PolicyStatus::Draft);
    }

    #[test]
    fn test_duplicate_version_rejected() {
        let registry = PolicyRegistry::default();
        let mut store = MemoryStore::new();
        registry.register(&mut store, refunds(Version::new(1, 0, 0))).unwrap();

        match registry.register(&mut store, refunds(Version::new(1, 0, 0))) {
            Err(PolicyError::Validation(e)) => {
                assert_eq!(e.code, ValidationCode::Duplicate);
                assert_eq!(e.actual, "refunds@1.0.0");
            }
            other => panic!("expected duplicate error, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_policy_rejected() {
        let registry = PolicyRegistry::default();
        let mut store = MemoryStore::new();
        let policy = Policy::new("p", "P").with_rule(
            PolicyRule::new("r", "R", PolicyEffect::Deny)
                .with_condition(RuleCondition::new("subject.email", ConditionOperator::Matches, "(")),
        );
        assert!(matches!(
            registry.register(&mut store, policy),
            Err(PolicyError::Validation(_))
        ));
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn test_lifecycle() {
        let registry = PolicyRegistry::default();
        let mut store = MemoryStore::new();
        let id = PolicyId::new("refunds");
        let v1 = Version::new(1, 0, 0);
        registry.register(&mut store, refunds(v1.clone())).unwrap();

        let active = registry.activate(&mut store, &id, &v1).unwrap();
        assert_eq!(active.status, PolicyStatus::Active);

        let archived = registry.archive(&mut store, &id, &v1).unwrap();
        assert_eq!(archived.status, PolicyStatus::Archived);

        match registry.activate(&mut store, &id, &v1) {
            Err(PolicyError::Validation(e)) => {
                assert_eq!(e.code, ValidationCode::InvalidTransition);
                assert_eq!(e.expected, "none (terminal)");
            }
            other => panic!("expected invalid transition, got {:?}", other),
        }
    }

    #[test]
    fn test_register_requires_draft() {
        let registry = PolicyRegistry::default();
        let mut store = MemoryStore::new();
        let policy = refunds(Version::new(1, 0, 0)).with_status(PolicyStatus::Active);

        match registry.register(&mut store, policy) {
            Err(PolicyError::Validation(e)) => {
                assert_eq!(e.code, ValidationCode::InvalidValue);
                assert_eq!(e.field, "status");
                assert_eq!(e.actual, "active");
            }
            other => panic!("expected invalid status, got {:?}", other),
        }
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn test_activation_archives_previous_version() {
        let registry = PolicyRegistry::default();
        let mut store = MemoryStore::new();
        let id = PolicyId::new("refunds");
        let v1 = Version::new(1, 0, 0);
        let v2 = Version::new(2, 0, 0);
        registry.register(&mut store, refunds(v1.clone())).unwrap();
        registry.register(&mut store, refunds(v2.clone())).unwrap();

        registry.activate(&mut store, &id, &v1).unwrap();
        registry.activate(&mut store, &id, &v2).unwrap();

        let stored_v1 = registry.get(&store, &id, &v1).unwrap().unwrap();
        assert_eq!(stored_v1.status, PolicyStatus::Archived);

        let effective = registry.effective_policies(&store, Timestamp::now()).unwrap();
        assert_eq!(effective.len(), 1);
        assert_eq!(effective[0].version, v2);
    }

    #[test]
    fn test_failed_activation_archives_nothing() {
        let registry = PolicyRegistry::default();
        let mut store = MemoryStore::new();
        let id = PolicyId::new("refunds");
        let v1 = Version::new(1, 0, 0);
        registry.register(&mut store, refunds(v1.clone())).unwrap();
        registry.activate(&mut store, &id, &v1).unwrap();

        assert!(registry.activate(&mut store, &id, &Version::new(9, 0, 0)).is_err());
        let stored_v1 = registry.get(&store, &id, &v1).unwrap().unwrap();
        assert_eq!(stored_v1.status, PolicyStatus::Active);
    }

    #[test]
    fn test_only_newest_active_version_is_effective() {
        let registry = PolicyRegistry::default();
        let mut store = MemoryStore::new();

        // Written straight to the store, bypassing activation
        let deny = refunds(Version::new(1, 0, 0)).with_status(PolicyStatus::Active);
        let allow = Policy::new("refunds", "Refunds")
            .with_version(Version::new(2, 0, 0))
            .with_status(PolicyStatus::Active)
            .with_rule(PolicyRule::new("allow-all", "Everything", PolicyEffect::Allow));
        store.upsert_policy(&allow).unwrap();
        store.upsert_policy(&deny).unwrap();

        let effective = registry.effective_policies(&store, Timestamp::now()).unwrap();
        assert_eq!(effective.len(), 1);
        assert_eq!(effective[0].version, Version::new(2, 0, 0));

        let context = warrant_domain::EvaluationContext::new("refund.issue").with_resource("amount", 5000);
        let result = registry.evaluator().evaluate_policies(
            &effective,
            &context,
            &crate::EvaluationOptions::default(),
        );
        assert!(result.is_allowed());
    }

    #[test]
    fn test_activate_unknown_version() {
        let registry = PolicyRegistry::default();
        let mut store = MemoryStore::new();
        match registry.activate(&mut store, &PolicyId::new("nope"), &Version::new(1, 0, 0)) {
            Err(PolicyError::Validation(e)) => assert_eq!(e.code, ValidationCode::NotFound),
            other => panic!("expected not found, got {:?}", other),
        }
    }

    #[test]
    fn test_latest_uses_semver_order() {
        let registry = PolicyRegistry::default();
        let mut store = MemoryStore::new();
        for minor in [2, 10, 9] {
            registry.register(&mut store, refunds(Version::new(1, minor, 0))).unwrap();
        }
        let latest = registry.latest(&store, &PolicyId::new("refunds")).unwrap().unwrap();
        assert_eq!(latest.version, Version::new(1, 10, 0));
    }

    #[test]
    fn test_effective_policies() {
        let registry = PolicyRegistry::default();
        let mut store = MemoryStore::new();
        let id = PolicyId::new("refunds");

        let mut windowed = refunds(Version::new(1, 0, 0));
        windowed.effective_from = Some(Timestamp::from_millis(100));
        windowed.effective_to = Some(Timestamp::from_millis(200));
        registry.register(&mut store, windowed).unwrap();
        registry.activate(&mut store, &id, &Version::new(1, 0, 0)).unwrap();
        registry.register(&mut store, refunds(Version::new(2, 0, 0))).unwrap();

        assert_eq!(registry.effective_policies(&store, Timestamp::from_millis(150)).unwrap().len(), 1);
        assert!(registry.effective_policies(&store, Timestamp::from_millis(200)).unwrap().is_empty());
        assert_eq!(registry.list(&store, None).unwrap().len(), 2);
        assert_eq!(registry.list(&store, Some(PolicyStatus::Draft)).unwrap().len(), 1);
    }
}
