//! Sweep and reconcile commands.

use clap::Args;

use super::{cancel_on_ctrl_c, open_engine, output_result, print_success};
use crate::Cli;

/// Re-evaluate every pending review against one identity.
#[derive(Args)]
pub struct SweepCommand {
    /// Identity ID
    identity_id: String,
}

impl SweepCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let engine = open_engine(cli)?;
        let report = engine.sweep(&self.identity_id, &cancel_on_ctrl_c()).await?;
        print_success(&format!(
            "Swept {} review(s): {} resolved, {} suggestion(s) updated, {} skipped",
            report.scanned, report.resolved, report.suggested, report.skipped
        ));
        output_result(&report, cli.json)
    }
}

/// Repair the similarity index from the review ledger.
#[derive(Args)]
pub struct ReconcileCommand {}

impl ReconcileCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let engine = open_engine(cli)?;
        let report = engine.reconcile(&cancel_on_ctrl_c()).await?;
        print_success(&format!(
            "Checked {} point(s): {} flagged, {} restored, {} indexed",
            report.scanned, report.flagged, report.restored, report.indexed
        ));
        output_result(&report, cli.json)
    }
}
