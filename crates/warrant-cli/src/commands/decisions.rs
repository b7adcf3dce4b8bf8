//! Decisions command implementation.

use crate::cli::{DecisionAction, DecisionsArgs};
use crate::error::{CliError, Result};
use crate::output::Formatter;
use warrant_decisions::DecisionRepository;
use warrant_domain::traits::{DecisionQuery, DecisionStore, ProvenanceStore};
use warrant_domain::{DecisionId, NewDecision};

/// Execute a decisions subcommand.
pub fn execute_decisions<S>(
    args: DecisionsArgs,
    repo: &mut DecisionRepository<S>,
    formatter: &Formatter,
) -> Result<()>
where
    S: DecisionStore + ProvenanceStore,
{
    match args.action {
        DecisionAction::List {
            status,
            proposer,
            decision_type,
            limit,
        } => {
            let query = DecisionQuery {
                statuses: status.map(|s| vec![s.into()]).unwrap_or_default(),
                decision_type,
                proposed_by: proposer,
                limit,
            };
            let decisions = repo.find(&query)?;
            println!("{}", formatter.format_decisions(&decisions)?);
        }
        DecisionAction::Show { id } => {
            let trace = repo.trace(parse_id(&id)?)?;
            let advice = repo.assess_auto_approval(&trace.decision)?;
            println!("{}", formatter.format_decision_detail(&trace, &advice)?);
        }
        DecisionAction::Propose {
            decision_type,
            title,
            by,
            description,
            risk,
            claims,
        } => {
            let input = claims.into_iter().fold(
                NewDecision::new(decision_type, title, by)
                    .with_description(description)
                    .with_risk(risk.into()),
                |input, claim| input.with_claim(claim),
            );
            let decision = repo.create(input)?;
            println!("{}", formatter.decision_changed(&decision));
        }
        DecisionAction::Approve { id, by } => {
            let decision = repo.approve(parse_id(&id)?, &by)?;
            println!("{}", formatter.decision_changed(&decision));
        }
        DecisionAction::Reject { id, by, rationale } => {
            let decision = repo.reject(parse_id(&id)?, &by, rationale.as_deref())?;
            println!("{}", formatter.decision_changed(&decision));
        }
        DecisionAction::Execute { id, by, outcome } => {
            let decision = repo.record_execution(parse_id(&id)?, &by, outcome.into())?;
            println!("{}", formatter.decision_changed(&decision));
        }
        DecisionAction::Fail { id, by, reason } => {
            let decision = repo.record_failure(parse_id(&id)?, &by, reason.as_deref())?;
            println!("{}", formatter.decision_changed(&decision));
        }
        DecisionAction::Rollback { id, by, reason } => {
            let decision = repo.roll_back(parse_id(&id)?, &by, reason.as_deref())?;
            println!("{}", formatter.decision_changed(&decision));
        }
    }
    Ok(())
}

/// Parse a decision id given on the command line.
pub fn parse_id(input: &str) -> Result<DecisionId> {
    DecisionId::from_string(input.trim())
        .map_err(|e| CliError::InvalidInput(format!("Invalid decision id '{}': {}", input, e)))
}
