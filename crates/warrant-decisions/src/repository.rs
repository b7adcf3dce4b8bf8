//! Decision repository: persistence, lifecycle and audit in one place

use crate::config::AutoApprovalConfig;
use crate::error::{RepositoryError, Result};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};
use warrant_domain::traits::{DecisionQuery, DecisionStore, PolicyStore, ProvenanceStore};
use warrant_domain::{
    Decision, DecisionId, DecisionOutcome, DecisionStatus, EvaluationContext, NewDecision,
    NewProvenanceEntry, PolicyEffect, PolicyRef, ProvenanceEntry, SourceType, Timestamp,
};
use warrant_ledger::{ChainVerification, ProvenanceLedger};
use warrant_policy::{AggregateEvaluationResult, EvaluationOptions, PolicyRegistry};

/// Source id recorded when no actor is named
pub const SYSTEM_ACTOR: &str = "system";

/// Statuses a decision can serve as a precedent from
const COMPLETED: [DecisionStatus; 3] = [
    DecisionStatus::Executed,
    DecisionStatus::Failed,
    DecisionStatus::RolledBack,
];

/// Ledger reference naming a decision
pub fn decision_ref(id: DecisionId) -> String {
    format!("decision:{}", id)
}

/// Classify an actor id by its prefix (`agent:`, `system`, `external:`)
///
/// Anything else is taken to be a person.
pub fn source_type_for(actor: &str) -> SourceType {
    if actor.starts_with("agent:") {
        SourceType::Agent
    } else if actor == SYSTEM_ACTOR || actor.starts_with("system:") {
        SourceType::System
    } else if actor.starts_with("external:") {
        SourceType::External
    } else {
        SourceType::Human
    }
}

/// Why a decision may or may not skip human review
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoApprovalAdvice {
    /// Whether the decision may be approved without a human
    pub eligible: bool,
    /// Short explanation
    pub reason: String,
    /// Completed same-type decisions considered
    pub precedents: usize,
    /// Of those, how many were favorable
    pub favorable: usize,
}

/// A decision with every ledger entry that references it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionTrace {
    /// Current state
    pub decision: Decision,
    /// Ledger entries naming the decision, in ledger order
    pub entries: Vec<ProvenanceEntry>,
}

/// Creates, moves and queries decisions
///
/// Every status change and its ledger entry are written in one store
/// transaction: either both land or neither does.
pub struct DecisionRepository<S> {
    store: S,
    ledger: ProvenanceLedger,
    config: AutoApprovalConfig,
}

impl<S> DecisionRepository<S> {
    /// Create a repository with the default auto-approval thresholds
    pub fn new(store: S) -> Self {
        Self {
            store,
            ledger: ProvenanceLedger::new(),
            config: AutoApprovalConfig::default(),
        }
    }

    /// Create a repository with custom auto-approval thresholds
    pub fn with_config(store: S, config: AutoApprovalConfig) -> Result<Self> {
        config.validate().map_err(RepositoryError::Config)?;
        Ok(Self {
            store,
            ledger: ProvenanceLedger::new(),
            config,
        })
    }

    /// Use a differently configured ledger
    pub fn with_ledger(mut self, ledger: ProvenanceLedger) -> Self {
        self.ledger = ledger;
        self
    }

    /// Auto-approval thresholds
    pub fn config(&self) -> &AutoApprovalConfig {
        &self.config
    }

    /// Ledger used for audit entries
    pub fn ledger(&self) -> &ProvenanceLedger {
        &self.ledger
    }

    /// Underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Underlying store, mutably
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Give the store back
    pub fn into_inner(self) -> S {
        self.store
    }
}

impl<S> DecisionRepository<S>
where
    S: DecisionStore + ProvenanceStore,
{
    /// Propose a new decision and record it in the ledger
    ///
    /// Risk defaults to medium. The returned decision carries the id of its
    /// ledger entry.
    pub fn create(&mut self, input: NewDecision) -> Result<Decision> {
        let now = Timestamp::now();
        let proposed = Decision::propose(input, now)?;
        let ledger = &self.ledger;

        let decision = self
            .store
            .transaction(|store| {
                let entry = NewProvenanceEntry::new(
                    source_type_for(&proposed.proposed_by),
                    proposed.proposed_by.clone(),
                    DecisionStatus::Proposed.ledger_action(),
                )
                .with_output(decision_ref(proposed.id))
                .with_metadata("type", proposed.decision_type.clone())
                .with_metadata("title", proposed.title.clone())
                .with_metadata("riskLevel", proposed.risk_level.as_str());
                let recorded = ledger.record_at(store, entry, now)?;

                let mut decision = proposed;
                decision.provenance_id = Some(recorded.id);
                store
                    .insert_decision(&decision)
                    .map_err(RepositoryError::store)?;
                Ok::<_, RepositoryError>(decision)
            })
            .map_err(RepositoryError::store)??;

        info!(
            decision = %decision.id,
            kind = %decision.decision_type,
            risk = decision.risk_level.as_str(),
            proposed_by = %decision.proposed_by,
            "Decision proposed"
        );
        Ok(decision)
    }

    /// Move a decision to `next`
    pub fn transition(
        &mut self,
        id: DecisionId,
        next: DecisionStatus,
        actor: Option<&str>,
    ) -> Result<Decision> {
        self.change(id, next, actor, Vec::new(), |d| d)
    }

    /// Approve a proposed decision
    pub fn approve(&mut self, id: DecisionId, actor: &str) -> Result<Decision> {
        self.transition(id, DecisionStatus::Approved, Some(actor))
    }

    /// Reject a proposed decision, optionally saying why
    pub fn reject(&mut self, id: DecisionId, actor: &str, rationale: Option<&str>) -> Result<Decision> {
        let details = rationale
            .map(|r| vec![("rationale", Value::from(r))])
            .unwrap_or_default();
        self.change(id, DecisionStatus::Rejected, Some(actor), details, move |d| match rationale {
            Some(r) => d.with_rejection_rationale(r),
            None => d,
        })
    }

    /// Mark an approved decision executed with its outcome
    pub fn record_execution(
        &mut self,
        id: DecisionId,
        actor: &str,
        outcome: DecisionOutcome,
    ) -> Result<Decision> {
        self.change(
            id,
            DecisionStatus::Executed,
            Some(actor),
            vec![("outcome", Value::from(outcome.as_str()))],
            move |d| d.with_outcome(outcome),
        )
    }

    /// Mark an approved decision failed
    pub fn record_failure(&mut self, id: DecisionId, actor: &str, reason: Option<&str>) -> Result<Decision> {
        let details = reason
            .map(|r| vec![("reason", Value::from(r))])
            .unwrap_or_default();
        self.change(id, DecisionStatus::Failed, Some(actor), details, |d| d)
    }

    /// Revert an executed decision
    pub fn roll_back(&mut self, id: DecisionId, actor: &str, reason: Option<&str>) -> Result<Decision> {
        let details = reason
            .map(|r| vec![("reason", Value::from(r))])
            .unwrap_or_default();
        self.change(id, DecisionStatus::RolledBack, Some(actor), details, |d| d)
    }

    /// One decision, if it exists
    pub fn get(&self, id: DecisionId) -> Result<Option<Decision>> {
        self.store.get_decision(id).map_err(RepositoryError::store)
    }

    /// One decision, or [`RepositoryError::NotFound`]
    pub fn require(&self, id: DecisionId) -> Result<Decision> {
        self.get(id)?.ok_or(RepositoryError::NotFound(id))
    }

    /// Decisions matching an arbitrary filter, oldest first
    pub fn find(&self, query: &DecisionQuery) -> Result<Vec<Decision>> {
        self.store.query_decisions(query).map_err(RepositoryError::store)
    }

    /// Decisions in `status`, oldest first
    pub fn find_by_status(&self, status: DecisionStatus) -> Result<Vec<Decision>> {
        self.find(&DecisionQuery {
            statuses: vec![status],
            ..Default::default()
        })
    }

    /// Decisions proposed by `proposer`, oldest first
    pub fn find_by_proposer(&self, proposer: &str) -> Result<Vec<Decision>> {
        self.find(&DecisionQuery {
            proposed_by: Some(proposer.to_string()),
            ..Default::default()
        })
    }

    /// Decisions awaiting approval
    pub fn find_pending(&self) -> Result<Vec<Decision>> {
        self.find_by_status(DecisionStatus::Proposed)
    }

    /// Number of decisions in each status, in lifecycle order
    pub fn count_by_status(&self) -> Result<Vec<(DecisionStatus, usize)>> {
        DecisionStatus::ALL
            .into_iter()
            .map(|status| {
                let count = self
                    .store
                    .count_decisions(&DecisionQuery {
                        statuses: vec![status],
                        ..Default::default()
                    })
                    .map_err(RepositoryError::store)?;
                Ok((status, count))
            })
            .collect()
    }

    /// Whether `decision` may be approved without a human
    pub fn can_auto_approve(&self, decision: &Decision) -> Result<bool> {
        Ok(self.assess_auto_approval(decision)?.eligible)
    }

    /// Auto-approval verdict with its reasoning
    ///
    /// High and critical risk always need a human. Otherwise the newest
    /// completed decisions of the same type (the decision itself excluded)
    /// must number at least `min_precedents` and all be executed with a
    /// favorable outcome. Reads only.
    pub fn assess_auto_approval(&self, decision: &Decision) -> Result<AutoApprovalAdvice> {
        if decision.requires_approval() {
            return Ok(self.advise(
                decision,
                false,
                format!("{} risk always requires human approval", decision.risk_level.as_str()),
                0,
                0,
            ));
        }

        let window = self.config.precedent_window;
        let mut precedents = self.find(&DecisionQuery {
            statuses: COMPLETED.to_vec(),
            decision_type: Some(decision.decision_type.clone()),
            proposed_by: None,
            limit: Some(window + 1),
        })?;
        precedents.retain(|p| p.id != decision.id);
        if precedents.len() > window {
            precedents.drain(..precedents.len() - window);
        }

        let total = precedents.len();
        let favorable = precedents.iter().filter(|p| self.is_favorable(p)).count();
        let advice = if total < self.config.min_precedents {
            self.advise(
                decision,
                false,
                format!(
                    "{} completed '{}' precedent(s), {} required",
                    total, decision.decision_type, self.config.min_precedents
                ),
                total,
                favorable,
            )
        } else if favorable < total {
            self.advise(
                decision,
                false,
                format!("{} of {} precedents were not favorable", total - favorable, total),
                total,
                favorable,
            )
        } else {
            self.advise(
                decision,
                true,
                format!("{} favorable precedents", total),
                total,
                favorable,
            )
        };
        Ok(advice)
    }

    /// The decision and its ledger history
    pub fn trace(&self, id: DecisionId) -> Result<DecisionTrace> {
        let decision = self.require(id)?;
        let entries = self.ledger.entries_for(&self.store, &decision_ref(id))?;
        Ok(DecisionTrace { decision, entries })
    }

    /// Check the integrity of the whole ledger
    pub fn verify_ledger(&self) -> Result<ChainVerification> {
        Ok(self.ledger.verify(&self.store)?)
    }

    fn is_favorable(&self, precedent: &Decision) -> bool {
        // An execution recorded without an outcome counts as a success
        precedent.status == DecisionStatus::Executed
            && self
                .config
                .is_favorable(precedent.outcome.unwrap_or(DecisionOutcome::Success))
    }

    fn advise(
        &self,
        decision: &Decision,
        eligible: bool,
        reason: String,
        precedents: usize,
        favorable: usize,
    ) -> AutoApprovalAdvice {
        debug!(decision = %decision.id, eligible, precedents, favorable, %reason, "Auto-approval assessed");
        AutoApprovalAdvice {
            eligible,
            reason,
            precedents,
            favorable,
        }
    }

    fn change<F>(
        &mut self,
        id: DecisionId,
        next: DecisionStatus,
        actor: Option<&str>,
        details: Vec<(&'static str, Value)>,
        finish: F,
    ) -> Result<Decision>
    where
        F: FnOnce(Decision) -> Decision,
    {
        let now = Timestamp::now();
        let ledger = &self.ledger;

        let (from, updated) = self
            .store
            .transaction(|store| {
                let current = store
                    .get_decision(id)
                    .map_err(RepositoryError::store)?
                    .ok_or(RepositoryError::NotFound(id))?;
                let updated = finish(current.transition_at(next, actor, now)?);
                store
                    .update_decision(&updated, current.status)
                    .map_err(RepositoryError::store)?;

                let mut entry = NewProvenanceEntry::new(
                    actor.map_or(SourceType::System, source_type_for),
                    actor.unwrap_or(SYSTEM_ACTOR),
                    next.ledger_action(),
                )
                .with_input(decision_ref(id))
                .with_output(decision_ref(id))
                .with_metadata("from", current.status.as_str())
                .with_metadata("to", next.as_str());
                for (key, value) in details {
                    entry = entry.with_metadata(key, value);
                }
                ledger.record_at(store, entry, now)?;
                Ok::<_, RepositoryError>((current.status, updated))
            })
            .map_err(RepositoryError::store)??;

        info!(
            decision = %id,
            from = from.as_str(),
            to = next.as_str(),
            actor = actor.unwrap_or(SYSTEM_ACTOR),
            "Decision transitioned"
        );
        Ok(updated)
    }
}

impl<S> DecisionRepository<S>
where
    S: DecisionStore + ProvenanceStore + PolicyStore,
{
    /// Evaluate the effective policies against `context` and attach the
    /// per-policy outcome to the decision
    ///
    /// Matched allow rules become satisfied requirements and matched deny
    /// rules violated ones. The status does not change; an `evaluate` entry
    /// is recorded.
    pub fn evaluate_and_attach(
        &mut self,
        id: DecisionId,
        registry: &PolicyRegistry,
        context: &EvaluationContext,
    ) -> Result<AggregateEvaluationResult> {
        let now = Timestamp::now();
        let policies = registry.effective_policies(&self.store, now)?;
        let result = registry
            .evaluator()
            .evaluate_policies(&policies, context, &EvaluationOptions::default().at(now));
        let refs = policy_refs(&result);
        let ledger = &self.ledger;

        self.store
            .transaction(|store| {
                let current = store
                    .get_decision(id)
                    .map_err(RepositoryError::store)?
                    .ok_or(RepositoryError::NotFound(id))?;
                let mut updated = current.clone().with_policy_refs(refs);
                updated.updated_at = now;
                store
                    .update_decision(&updated, current.status)
                    .map_err(RepositoryError::store)?;

                let entry = NewProvenanceEntry::new(SourceType::System, SYSTEM_ACTOR, "evaluate")
                    .with_input(decision_ref(id))
                    .with_output(decision_ref(id))
                    .with_metadata("action", context.action.clone())
                    .with_metadata("finalDecision", result.final_decision.as_str())
                    .with_metadata(
                        "decidingPolicy",
                        result.deciding_policy.as_ref().map(|p| p.as_str().to_string()),
                    )
                    .with_metadata("policiesEvaluated", result.policy_results.len());
                ledger.record_at(store, entry, now)?;
                Ok::<_, RepositoryError>(())
            })
            .map_err(RepositoryError::store)??;

        info!(
            decision = %id,
            final_decision = result.final_decision.as_str(),
            policies = result.policy_results.len(),
            "Policies attached"
        );
        Ok(result)
    }
}

/// One [`PolicyRef`] per evaluated policy
pub fn policy_refs(result: &AggregateEvaluationResult) -> Vec<PolicyRef> {
    result
        .policy_results
        .iter()
        .map(|p| {
            let matched_with = |effect: PolicyEffect| -> Vec<String> {
                p.matched_rules()
                    .filter(|r| r.effect == effect)
                    .map(|r| r.rule_id.clone())
                    .collect()
            };
            PolicyRef {
                policy_id: p.policy_id.clone(),
                version: p.policy_version.clone(),
                applicable: p.contributes(),
                satisfied_requirements: matched_with(PolicyEffect::Allow),
                violated_requirements: matched_with(PolicyEffect::Deny),
            }
        })
        .collect()
}
