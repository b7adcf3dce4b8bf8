//! CLI command definitions and argument parsing.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use warrant_domain::{DecisionOutcome, DecisionStatus, RiskLevel};

/// Warrant CLI - Govern and audit consequential AI-agent actions.
#[derive(Debug, Parser)]
#[command(name = "warrant")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output format
    #[arg(short, long, value_enum, global = true)]
    pub format: Option<CliFormat>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// SQLite database path
    #[arg(short, long, global = true, env = "WARRANT_DB")]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Output format options.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum CliFormat {
    /// Table format (default)
    Table,
    /// JSON format
    Json,
    /// Quiet format (IDs and verdicts only)
    Quiet,
}

/// CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Verify the integrity of the provenance ledger
    Verify,

    /// Propose, review and inspect decisions
    Decisions(DecisionsArgs),

    /// Dry-run, simulate and compare policy files
    Policy(PolicyArgs),
}

/// Arguments for the decisions command.
#[derive(Debug, Parser)]
pub struct DecisionsArgs {
    #[command(subcommand)]
    pub action: DecisionAction,
}

/// Decision actions.
#[derive(Debug, Subcommand)]
pub enum DecisionAction {
    /// List decisions
    List {
        /// Filter by status
        #[arg(short, long, value_enum)]
        status: Option<StatusArg>,

        /// Filter by proposer
        #[arg(short, long)]
        proposer: Option<String>,

        /// Filter by decision type
        #[arg(short = 't', long = "type")]
        decision_type: Option<String>,

        /// Newest N only
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show a decision with its ledger trace and auto-approval advice
    Show {
        /// Decision ID
        id: String,
    },

    /// Propose a new decision
    Propose {
        /// Decision type (e.g. refund)
        #[arg(short = 't', long = "type")]
        decision_type: String,

        /// Short summary
        #[arg(long)]
        title: String,

        /// Proposing actor (e.g. agent:billing)
        #[arg(short, long)]
        by: String,

        /// Longer explanation
        #[arg(long, default_value = "")]
        description: String,

        /// Risk level
        #[arg(short, long, value_enum, default_value = "medium")]
        risk: RiskArg,

        /// Supporting claim references
        #[arg(long = "claim")]
        claims: Vec<String>,
    },

    /// Approve a proposed decision
    Approve {
        /// Decision ID
        id: String,

        /// Approving actor
        #[arg(short, long)]
        by: String,
    },

    /// Reject a proposed decision
    Reject {
        /// Decision ID
        id: String,

        /// Rejecting actor
        #[arg(short, long)]
        by: String,

        /// Why the decision is rejected
        #[arg(short, long)]
        rationale: Option<String>,
    },

    /// Record the execution of an approved decision
    Execute {
        /// Decision ID
        id: String,

        /// Executing actor
        #[arg(short, long)]
        by: String,

        /// Execution outcome
        #[arg(short, long, value_enum, default_value = "success")]
        outcome: OutcomeArg,
    },

    /// Record that an approved decision failed to execute
    Fail {
        /// Decision ID
        id: String,

        /// Reporting actor
        #[arg(short, long)]
        by: String,

        /// What went wrong
        #[arg(short, long)]
        reason: Option<String>,
    },

    /// Roll back an executed decision
    Rollback {
        /// Decision ID
        id: String,

        /// Actor performing the rollback
        #[arg(short, long)]
        by: String,

        /// Why it was rolled back
        #[arg(short, long)]
        reason: Option<String>,
    },
}

/// Arguments for the policy command.
#[derive(Debug, Parser)]
pub struct PolicyArgs {
    #[command(subcommand)]
    pub action: PolicyAction,
}

/// Policy simulator actions. Policies are read from JSON files.
#[derive(Debug, Subcommand)]
pub enum PolicyAction {
    /// Evaluate policies against one context, ignoring status and window
    DryRun {
        /// Policy file (one policy or an array); repeatable
        #[arg(short, long = "policy", required = true)]
        policies: Vec<PathBuf>,

        /// Evaluation context file
        #[arg(long)]
        context: PathBuf,
    },

    /// Run scenarios against one policy and report coverage
    Simulate {
        /// Policy file
        policy: PathBuf,

        /// Scenario file (array); generated from the rules when omitted
        #[arg(short, long)]
        scenarios: Option<PathBuf>,
    },

    /// Compare two policies structurally and behaviorally
    Compare {
        /// First policy file
        first: PathBuf,

        /// Second policy file
        second: PathBuf,

        /// Scenario file for the behavioral diff
        #[arg(short, long)]
        scenarios: Option<PathBuf>,
    },

    /// Generate scenarios that exercise every rule of a policy
    Scenarios {
        /// Policy file
        policy: PathBuf,
    },
}

/// Decision status argument.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum StatusArg {
    /// Awaiting approval
    Proposed,
    /// Cleared for execution
    Approved,
    /// Refused
    Rejected,
    /// Carried out
    Executed,
    /// Execution failed
    Failed,
    /// Execution reverted
    RolledBack,
}

/// Risk level argument.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum RiskArg {
    /// Routine
    Low,
    /// Default
    Medium,
    /// Needs a human
    High,
    /// Needs a human
    Critical,
}

/// Execution outcome argument.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutcomeArg {
    /// Achieved what was intended
    Success,
    /// Achieved part of it
    Partial,
    /// Did not achieve it
    Failure,
}

impl From<CliFormat> for crate::config::OutputFormat {
    fn from(format: CliFormat) -> Self {
        match format {
            CliFormat::Table => crate::config::OutputFormat::Table,
            CliFormat::Json => crate::config::OutputFormat::Json,
            CliFormat::Quiet => crate::config::OutputFormat::Quiet,
        }
    }
}

impl From<StatusArg> for DecisionStatus {
    fn from(status: StatusArg) -> Self {
        match status {
            StatusArg::Proposed => DecisionStatus::Proposed,
            StatusArg::Approved => DecisionStatus::Approved,
            StatusArg::Rejected => DecisionStatus::Rejected,
            StatusArg::Executed => DecisionStatus::Executed,
            StatusArg::Failed => DecisionStatus::Failed,
            StatusArg::RolledBack => DecisionStatus::RolledBack,
        }
    }
}

impl From<RiskArg> for RiskLevel {
    fn from(risk: RiskArg) -> Self {
        match risk {
            RiskArg::Low => RiskLevel::Low,
            RiskArg::Medium => RiskLevel::Medium,
            RiskArg::High => RiskLevel::High,
            RiskArg::Critical => RiskLevel::Critical,
        }
    }
}

impl From<OutcomeArg> for DecisionOutcome {
    fn from(outcome: OutcomeArg) -> Self {
        match outcome {
            OutcomeArg::Success => DecisionOutcome::Success,
            OutcomeArg::Partial => DecisionOutcome::Partial,
            OutcomeArg::Failure => DecisionOutcome::Failure,
        }
    }
}
