//! Bulk scan commands.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use facelink_resolve::ScanState;

use super::{open_engine, output_result, print_success, print_verbose, print_warning};
use crate::Cli;
use crate::source::DirSource;

/// Scan a directory of face files and wait for the scan to finish.
///
/// Ctrl-C cancels the scan; clusters built so far are still queued.
#[derive(Args)]
pub struct ScanCommand {
    /// Directory holding one JSON face file per image
    dir: PathBuf,
}

impl ScanCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        if !self.dir.is_dir() {
            anyhow::bail!("'{}' is not a directory", self.dir.display());
        }
        let engine = open_engine(cli)?;
        let scan_id = engine.start_scan(Arc::new(DirSource::new(&self.dir)));
        print_verbose(cli, &format!("Scan started: {}", scan_id));

        let wait = engine.wait_scan(&scan_id);
        tokio::pin!(wait);
        let status = tokio::select! {
            status = &mut wait => status?,
            _ = tokio::signal::ctrl_c() => {
                print_warning("interrupted, cancelling scan");
                engine.cancel_scan(&scan_id);
                wait.await?
            }
        };
        let status = status.ok_or_else(|| anyhow::anyhow!("scan '{}' not found", scan_id))?;

        match status.state {
            ScanState::Completed => print_success(&format!(
                "Scanned {} file(s): {} face(s), {} matched, {} review(s)",
                status.files, status.faces, status.matches, status.reviews
            )),
            ScanState::Error => print_warning(&format!(
                "Scan failed: {}",
                status.error.as_deref().unwrap_or("unknown error")
            )),
            state => print_warning(&format!("Scan {}", state)),
        }
        output_result(&status, cli.json)
    }
}

/// Show the recorded progress of a scan.
#[derive(Args)]
pub struct StatusCommand {
    /// Scan ID
    scan_id: String,
}

impl StatusCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let engine = open_engine(cli)?;
        let status = engine
            .scan_status(&self.scan_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("scan '{}' not found", self.scan_id))?;
        output_result(&status, cli.json)
    }
}

/// List every recorded scan, oldest first.
#[derive(Args)]
pub struct ScansCommand {
    /// Only show scans in this state (running, completed, cancelled, error)
    #[arg(long)]
    state: Option<String>,
}

impl ScansCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let engine = open_engine(cli)?;
        let scans: Vec<_> = engine
            .list_scans()
            .await?
            .into_iter()
            .filter(|s| self.state.as_deref().is_none_or(|want| s.state.to_string() == want))
            .collect();
        print_success(&format!("Found {} scan(s)", scans.len()));
        output_result(&scans, cli.json)
    }
}
