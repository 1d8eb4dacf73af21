//! Review decision commands.

use clap::Args;
use facelink_resolve::{RemoveOutcome, ReviewEntry};
use serde::Serialize;

use super::{open_engine, output_result, print_success, print_warning};
use crate::Cli;

/// One line of the pending listing.
#[derive(Serialize)]
struct PendingRow {
    id: String,
    faces: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    suggested_identity_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    suggested_score: Option<f32>,
}

impl From<&ReviewEntry> for PendingRow {
    fn from(e: &ReviewEntry) -> Self {
        Self {
            id: e.id.clone(),
            faces: e.face_count(),
            image_id: e.image_id.clone(),
            suggested_identity_id: e.suggested_identity_id.clone(),
            suggested_score: e.suggested_score,
        }
    }
}

/// List pending reviews.
#[derive(Args)]
pub struct PendingCommand {
    /// Maximum number of reviews to list
    #[arg(long, default_value_t = 50)]
    limit: usize,
}

impl PendingCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let engine = open_engine(cli)?;
        let pending = engine.list_pending(self.limit).await?;
        let rows: Vec<PendingRow> = pending.iter().map(PendingRow::from).collect();
        print_success(&format!("Found {} pending review(s)", rows.len()));
        output_result(&rows, cli.json)
    }
}

/// Show a review entry with its members.
#[derive(Args)]
pub struct ShowCommand {
    /// Review ID
    review_id: String,
}

impl ShowCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let engine = open_engine(cli)?;
        let entry = engine
            .review(&self.review_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("review '{}' not found", self.review_id))?;
        output_result(&entry, cli.json)
    }
}

/// Accept a review as an identity and propagate the decision.
#[derive(Args)]
pub struct AcceptCommand {
    /// Review ID
    review_id: String,
    /// Identity ID
    identity_id: String,
    /// Display name for a new identity
    #[arg(long)]
    name: Option<String>,
}

impl AcceptCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let engine = open_engine(cli)?;
        let outcome = engine
            .accept(&self.review_id, &self.identity_id, self.name.as_deref())
            .await?;
        print_success(&format!(
            "Accepted as {}: {} duplicate(s), {} group mate(s), {} resolved by sweep",
            outcome.identity_id,
            outcome.duplicates.len(),
            outcome.group_mates.len(),
            outcome.sweep.resolved
        ));
        output_result(&outcome, cli.json)
    }
}

/// Reject a review.
#[derive(Args)]
pub struct RejectCommand {
    /// Review ID
    review_id: String,
}

impl RejectCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let engine = open_engine(cli)?;
        let entry = engine.reject(&self.review_id).await?;
        print_success(&format!("Rejected {}", entry.id));
        output_result(&entry, cli.json)
    }
}

/// Move a face out of a cluster review into its own review.
#[derive(Args)]
pub struct RemoveMemberCommand {
    /// Review ID
    review_id: String,
    /// Face ID of the member to move
    member_id: String,
}

impl RemoveMemberCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let engine = open_engine(cli)?;
        let outcome = engine
            .remove_member(&self.review_id, &self.member_id)
            .await?;
        match &outcome {
            RemoveOutcome::Moved { new_review_id, .. } => {
                print_success(&format!("Moved {} to review {}", self.member_id, new_review_id))
            }
            RemoveOutcome::MemberNotFound => print_warning(&format!(
                "Review {} has no member {}",
                self.review_id, self.member_id
            )),
        }
        output_result(&outcome, cli.json)
    }
}
