//! Output formatting for the CLI.

use crate::config::OutputFormat;
use crate::error::Result;
use colored::*;
use serde::Serialize;
use tabled::{
    builder::Builder,
    settings::{object::Rows, Alignment, Modify, Style},
};
use warrant_decisions::{AutoApprovalAdvice, DecisionTrace};
use warrant_domain::{Decision, DecisionStatus, PolicyEffect};
use warrant_ledger::ChainVerification;
use warrant_simulator::{DryRunResult, PolicyComparison, Scenario, SimulationReport};

/// Output formatter.
pub struct Formatter {
    format: OutputFormat,
    color_enabled: bool,
}

impl Formatter {
    /// Create a new formatter.
    pub fn new(format: OutputFormat, color_enabled: bool) -> Self {
        Self {
            format,
            color_enabled,
        }
    }

    /// Format a list of decisions.
    pub fn format_decisions(&self, decisions: &[Decision]) -> Result<String> {
        match self.format {
            OutputFormat::Json => self.json(&decisions),
            OutputFormat::Quiet => Ok(decisions
                .iter()
                .map(|d| d.id.to_string())
                .collect::<Vec<_>>()
                .join("\n")),
            OutputFormat::Table => {
                if decisions.is_empty() {
                    return Ok(self.colorize("No decisions found.", "yellow"));
                }

                let mut builder = Builder::default();
                builder.push_record(["ID", "Type", "Title", "Status", "Risk", "Proposed By"]);
                for d in decisions {
                    builder.push_record([
                        d.id.to_string(),
                        d.decision_type.clone(),
                        d.title.clone(),
                        self.status(d.status),
                        d.risk_level.as_str().to_string(),
                        d.proposed_by.clone(),
                    ]);
                }
                Ok(self.table(builder))
            }
        }
    }

    /// Format one decision with its ledger trace and auto-approval advice.
    pub fn format_decision_detail(&self, trace: &DecisionTrace, advice: &AutoApprovalAdvice) -> Result<String> {
        let decision = &trace.decision;
        match self.format {
            OutputFormat::Json => self.json(&serde_json::json!({
                "decision": decision,
                "ledger": trace.entries,
                "autoApproval": advice,
            })),
            OutputFormat::Quiet => Ok(decision.status.to_string()),
            OutputFormat::Table => {
                let mut fields = Builder::default();
                fields.push_record(["Field", "Value"]);
                fields.push_record(["ID".to_string(), decision.id.to_string()]);
                fields.push_record(["Type".to_string(), decision.decision_type.clone()]);
                fields.push_record(["Title".to_string(), decision.title.clone()]);
                fields.push_record(["Status".to_string(), self.status(decision.status)]);
                fields.push_record(["Risk".to_string(), decision.risk_level.as_str().to_string()]);
                fields.push_record(["Proposed by".to_string(), decision.proposed_by.clone()]);
                if let Some(by) = &decision.approved_by {
                    fields.push_record(["Approved by".to_string(), by.clone()]);
                }
                if let Some(by) = &decision.rejected_by {
                    fields.push_record(["Rejected by".to_string(), by.clone()]);
                }
                if let Some(rationale) = &decision.rejection_rationale {
                    fields.push_record(["Rationale".to_string(), rationale.clone()]);
                }
                if let Some(outcome) = decision.outcome {
                    fields.push_record(["Outcome".to_string(), outcome.to_string()]);
                }
                if !decision.claim_refs.is_empty() {
                    fields.push_record(["Claims".to_string(), decision.claim_refs.join(", ")]);
                }
                for reference in &decision.policy_refs {
                    let verdict = if reference.is_violated() {
                        self.colorize(
                            &format!("violated: {}", reference.violated_requirements.join(", ")),
                            "red",
                        )
                    } else if reference.applicable {
                        "applicable".to_string()
                    } else {
                        "not applicable".to_string()
                    };
                    fields.push_record([
                        format!("Policy {}@{}", reference.policy_id, reference.version),
                        verdict,
                    ]);
                }
                let auto = if advice.eligible { "yes" } else { "no" };
                fields.push_record([
                    "Auto-approvable".to_string(),
                    format!("{} ({})", auto, advice.reason),
                ]);

                let mut ledger = Builder::default();
                ledger.push_record(["Time", "Action", "Source", "Hash"]);
                for entry in &trace.entries {
                    ledger.push_record([
                        entry.timestamp.to_string(),
                        entry.action.clone(),
                        format!("{} ({})", entry.source_id, entry.source_type.as_str()),
                        entry.hash.chars().take(12).collect(),
                    ]);
                }

                Ok(format!("{}\n{}", self.table(fields), self.table(ledger)))
            }
        }
    }

    /// Format a ledger verification report.
    pub fn format_verification(&self, report: &ChainVerification) -> Result<String> {
        match self.format {
            OutputFormat::Json => self.json(report),
            OutputFormat::Quiet => Ok(if report.valid { "valid" } else { "invalid" }.to_string()),
            OutputFormat::Table => {
                if report.valid {
                    return Ok(self.success(&format!(
                        "Ledger intact: {} entries verified",
                        report.entries_verified
                    )));
                }
                let mut lines = vec![self.error(&format!(
                    "Ledger compromised: {} broken link(s), {} invalid hash(es) in {} entries",
                    report.broken_links, report.invalid_hashes, report.entries_verified
                ))];
                lines.extend(report.errors.iter().map(|e| format!("  - {}", e)));
                Ok(lines.join("\n"))
            }
        }
    }

    /// Format a dry run.
    pub fn format_dry_run(&self, outcome: &DryRunResult) -> Result<String> {
        match self.format {
            OutputFormat::Json => self.json(outcome),
            OutputFormat::Quiet => Ok(outcome.result.final_decision.to_string()),
            OutputFormat::Table => {
                let mut lines: Vec<String> = outcome.explanation.clone();
                lines.push(String::new());
                lines.push(format!("Decision: {}", self.effect(outcome.result.final_decision)));
                Ok(lines.join("\n"))
            }
        }
    }

    /// Format a simulation report.
    pub fn format_simulation(&self, report: &SimulationReport) -> Result<String> {
        match self.format {
            OutputFormat::Json => self.json(report),
            OutputFormat::Quiet => Ok(format!("{}/{}", report.passed, report.scenarios.len())),
            OutputFormat::Table => {
                let mut builder = Builder::default();
                builder.push_record(["Scenario", "Expected", "Actual", "Rule", "Result"]);
                for s in &report.scenarios {
                    builder.push_record([
                        s.name.clone(),
                        s.expected.map(|e| e.to_string()).unwrap_or_else(|| "-".to_string()),
                        self.effect(s.actual),
                        s.applied_rule.clone().unwrap_or_else(|| "-".to_string()),
                        if s.passed {
                            self.colorize("pass", "green")
                        } else {
                            self.colorize("FAIL", "red")
                        },
                    ]);
                }

                let coverage = &report.coverage;
                let mut summary = format!(
                    "{}@{}: {} passed, {} failed; coverage {}/{} rules ({:.1}%)",
                    report.policy_id,
                    report.policy_version,
                    report.passed,
                    report.failed,
                    coverage.covered_rules,
                    coverage.total_rules,
                    coverage.coverage_percent
                );
                if !coverage.uncovered_rules.is_empty() {
                    summary.push_str(&format!("\nUncovered: {}", coverage.uncovered_rules.join(", ")));
                }
                Ok(format!("{}\n{}", self.table(builder), summary))
            }
        }
    }

    /// Format a policy comparison.
    pub fn format_comparison(&self, comparison: &PolicyComparison) -> Result<String> {
        match self.format {
            OutputFormat::Json => self.json(comparison),
            OutputFormat::Quiet => Ok(comparison.behavioral.len().to_string()),
            OutputFormat::Table => {
                let (first_id, first_version) = &comparison.first;
                let (second_id, second_version) = &comparison.second;
                let diff = &comparison.structural;
                let mut lines = vec![format!(
                    "{}@{} vs {}@{}",
                    first_id, first_version, second_id, second_version
                )];

                if diff.is_empty() {
                    lines.push(self.info("No structural differences"));
                }
                for change in &diff.policy_changes {
                    lines.push(format!("  ~ policy {}: {} -> {}", change.field, change.before, change.after));
                }
                for id in &diff.only_in_first {
                    lines.push(self.colorize(&format!("  - rule {}", id), "red"));
                }
                for id in &diff.only_in_second {
                    lines.push(self.colorize(&format!("  + rule {}", id), "green"));
                }
                for rule in &diff.modified {
                    let fields: Vec<&str> = rule.differences.iter().map(|d| d.field.as_str()).collect();
                    lines.push(format!("  ~ rule {} ({})", rule.rule_id, fields.join(", ")));
                }

                if comparison.scenarios_compared > 0 {
                    lines.push(format!(
                        "{} of {} scenario(s) decided differently",
                        comparison.behavioral.len(),
                        comparison.scenarios_compared
                    ));
                    for d in &comparison.behavioral {
                        lines.push(format!(
                            "  {}: {} -> {}",
                            d.scenario,
                            self.effect(d.first),
                            self.effect(d.second)
                        ));
                    }
                }
                Ok(lines.join("\n"))
            }
        }
    }

    /// Format generated scenarios.
    pub fn format_scenarios(&self, scenarios: &[Scenario]) -> Result<String> {
        match self.format {
            OutputFormat::Json => self.json(&scenarios),
            OutputFormat::Quiet => Ok(scenarios
                .iter()
                .map(|s| s.name.clone())
                .collect::<Vec<_>>()
                .join("\n")),
            OutputFormat::Table => {
                let mut builder = Builder::default();
                builder.push_record(["Scenario", "Expected", "Context"]);
                for s in scenarios {
                    builder.push_record([
                        s.name.clone(),
                        s.expected_decision
                            .map(|e| e.to_string())
                            .unwrap_or_else(|| "-".to_string()),
                        serde_json::to_string(&s.context)?,
                    ]);
                }
                Ok(self.table(builder))
            }
        }
    }

    /// Format a decision status change.
    pub fn decision_changed(&self, decision: &Decision) -> String {
        match self.format {
            OutputFormat::Quiet => decision.id.to_string(),
            _ => self.success(&format!("Decision {} is now {}", decision.id, decision.status)),
        }
    }

    /// Format a success message.
    pub fn success(&self, message: &str) -> String {
        self.colorize(&format!("✓ {}", message), "green")
    }

    /// Format an error message.
    pub fn error(&self, message: &str) -> String {
        self.colorize(&format!("✗ {}", message), "red")
    }

    /// Format an info message.
    pub fn info(&self, message: &str) -> String {
        self.colorize(&format!("ℹ {}", message), "blue")
    }

    /// Format a warning message.
    pub fn warning(&self, message: &str) -> String {
        self.colorize(&format!("⚠ {}", message), "yellow")
    }

    fn json<T: Serialize + ?Sized>(&self, value: &T) -> Result<String> {
        Ok(serde_json::to_string_pretty(value)?)
    }

    fn table(&self, builder: Builder) -> String {
        let mut table = builder.build();
        table
            .with(Style::rounded())
            .with(Modify::new(Rows::first()).with(Alignment::center()));
        table.to_string()
    }

    fn status(&self, status: DecisionStatus) -> String {
        let color = match status {
            DecisionStatus::Proposed => "cyan",
            DecisionStatus::Approved => "blue",
            DecisionStatus::Executed => "green",
            DecisionStatus::Rejected | DecisionStatus::Failed => "red",
            DecisionStatus::RolledBack => "magenta",
        };
        self.colorize(status.as_str(), color)
    }

    fn effect(&self, effect: PolicyEffect) -> String {
        let color = match effect {
            PolicyEffect::Allow => "green",
            PolicyEffect::RequireApproval => "yellow",
            PolicyEffect::Deny => "red",
        };
        self.colorize(effect.as_str(), color)
    }

    /// Colorize text if color is enabled.
    fn colorize(&self, text: &str, color: &str) -> String {
        if !self.color_enabled {
            return text.to_string();
        }

        match color {
            "red" => text.red().to_string(),
            "green" => text.green().to_string(),
            "blue" => text.blue().to_string(),
            "yellow" => text.yellow().to_string(),
            "cyan" => text.cyan().to_string(),
            "magenta" => text.magenta().to_string(),
            _ => text.to_string(),
        }
    }
}
