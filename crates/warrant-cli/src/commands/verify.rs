//! Verify command implementation.

use crate::error::{CliError, Result};
use crate::output::Formatter;
use warrant_domain::traits::ProvenanceStore;
use warrant_ledger::ProvenanceLedger;

/// Execute the verify command.
///
/// Prints the report either way; a compromised ledger is also an error so
/// the process exits non-zero.
pub fn execute_verify<S: ProvenanceStore>(store: &S, formatter: &Formatter) -> Result<()> {
    let report = ProvenanceLedger::new().verify(store)?;
    println!("{}", formatter.format_verification(&report)?);

    if !report.valid {
        return Err(CliError::Integrity(format!(
            "{} broken link(s), {} invalid hash(es)",
            report.broken_links, report.invalid_hashes
        )));
    }
    Ok(())
}
