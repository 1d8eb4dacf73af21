//! Identity commands.

use std::path::PathBuf;

use clap::Args;
use facelink_resolve::{Identity, IdentityCluster, SubmitOutcome};
use serde::Serialize;

use super::{open_engine, output_result, print_success, print_verbose};
use crate::Cli;
use crate::source::read_face_file;

/// Submit every face of one face file, outside a scan.
///
/// Matched faces are confirmed immediately; the rest are queued for review.
#[derive(Args)]
pub struct SubmitCommand {
    /// Face file (JSON)
    file: PathBuf,
}

impl SubmitCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let engine = open_engine(cli)?;
        let file = read_face_file(&self.file).await?;
        print_verbose(cli, &format!("Image {}: {} face(s)", file.image_id, file.faces.len()));

        let mut outcomes = Vec::with_capacity(file.faces.len());
        for face in file.faces {
            outcomes.push(engine.submit_face(face).await?);
        }
        let matched = outcomes
            .iter()
            .filter(|o| matches!(o, SubmitOutcome::Matched { .. }))
            .count();
        print_success(&format!(
            "{} face(s) matched, {} queued for review",
            matched,
            outcomes.len() - matched
        ));
        output_result(&outcomes, cli.json)
    }
}

#[derive(Serialize)]
struct AlbumView {
    identity: Identity,
    #[serde(skip_serializing_if = "Option::is_none")]
    cluster: Option<IdentityCluster>,
}

/// Show an identity and its confirmed faces.
#[derive(Args)]
pub struct AlbumCommand {
    /// Identity ID
    identity_id: String,
}

impl AlbumCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let engine = open_engine(cli)?;
        let identity = engine
            .identity(&self.identity_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("identity '{}' not found", self.identity_id))?;
        let cluster = engine.identity_cluster(&self.identity_id).await?;
        output_result(&AlbumView { identity, cluster }, cli.json)
    }
}
