//! Policy command implementation.

use crate::cli::{PolicyAction, PolicyArgs};
use crate::error::{CliError, Result};
use crate::output::Formatter;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use warrant_domain::{EvaluationContext, Policy};
use warrant_policy::PolicyRegistry;
use warrant_simulator::{PolicySimulator, Scenario};

/// A file holding either one value or an array of them
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

/// Execute a policy subcommand.
pub fn execute_policy(args: PolicyArgs, simulator: &PolicySimulator, formatter: &Formatter) -> Result<()> {
    match args.action {
        PolicyAction::DryRun { policies, context } => {
            let mut loaded = Vec::new();
            for path in &policies {
                loaded.extend(load_policies(path)?);
            }
            let context: EvaluationContext = load_json(&context)?;
            let outcome = simulator.dry_run(&loaded, &context)?;
            println!("{}", formatter.format_dry_run(&outcome)?);
        }
        PolicyAction::Simulate { policy, scenarios } => {
            let policy = load_policy(&policy)?;
            let scenarios = match scenarios {
                Some(path) => load_json::<Vec<Scenario>>(&path)?,
                None => simulator.generate_scenarios(&policy)?,
            };
            let report = simulator.simulate_policy(&policy, &scenarios)?;
            println!("{}", formatter.format_simulation(&report)?);
            if !report.all_passed() {
                return Err(CliError::ScenariosFailed(report.failed));
            }
        }
        PolicyAction::Compare {
            first,
            second,
            scenarios,
        } => {
            let first = load_policy(&first)?;
            let second = load_policy(&second)?;
            let scenarios = scenarios
                .map(|path| load_json::<Vec<Scenario>>(&path))
                .transpose()?;
            let comparison = simulator.compare_policies(&first, &second, scenarios.as_deref())?;
            println!("{}", formatter.format_comparison(&comparison)?);
        }
        PolicyAction::Scenarios { policy } => {
            let policy = load_policy(&policy)?;
            let scenarios = simulator.generate_scenarios(&policy)?;
            println!("{}", formatter.format_scenarios(&scenarios)?);
        }
    }
    Ok(())
}

/// Read a JSON file into `T`.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// Read and validate every policy in a file holding one policy or an array.
pub fn load_policies(path: &Path) -> Result<Vec<Policy>> {
    let policies = match load_json::<OneOrMany<Policy>>(path)? {
        OneOrMany::Many(policies) => policies,
        OneOrMany::One(policy) => vec![policy],
    };
    let registry = PolicyRegistry::default();
    for policy in &policies {
        registry.validate(policy)?;
    }
    Ok(policies)
}

/// Read a file that must hold exactly one policy.
pub fn load_policy(path: &Path) -> Result<Policy> {
    let mut policies = load_policies(path)?;
    if policies.len() != 1 {
        return Err(CliError::InvalidInput(format!(
            "{} holds {} policies; expected exactly one",
            path.display(),
            policies.len()
        )));
    }
    Ok(policies.remove(0))
}
