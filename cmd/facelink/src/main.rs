//! facelink CLI - resolve face identities against a local database.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod source;

use commands::{
    AcceptCommand, AlbumCommand, PendingCommand, ReconcileCommand, RejectCommand,
    RemoveMemberCommand, ScanCommand, ScansCommand, ShowCommand, StatusCommand, SubmitCommand,
    SweepCommand,
};

/// facelink CLI - resolve face identities against a local database.
///
/// Faces are read from JSON files produced by an external detector, one file
/// per image. Unmatched faces are grouped into review entries; accepting a
/// review propagates the decision to near-duplicates and group mates.
///
/// Configuration is read from ~/.facelink/config.yaml.
#[derive(Parser)]
#[command(name = "facelink")]
#[command(about = "Face identity resolution CLI tool")]
#[command(version)]
pub struct Cli {
    /// Config file (default is ~/.facelink/config.yaml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Database file (default is ~/.facelink/facelink.redb)
    #[arg(long, global = true)]
    pub db: Option<String>,

    /// Output as JSON (for piping)
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan a directory of face files
    Scan(ScanCommand),
    /// Show the progress of a scan
    Status(StatusCommand),
    /// List recorded scans
    Scans(ScansCommand),
    /// Submit a single face file
    Submit(SubmitCommand),
    /// List pending reviews
    Pending(PendingCommand),
    /// Show a review entry
    Show(ShowCommand),
    /// Accept a review as an identity
    Accept(AcceptCommand),
    /// Reject a review
    Reject(RejectCommand),
    /// Move a face out of a cluster review
    #[command(name = "remove-member")]
    RemoveMember(RemoveMemberCommand),
    /// Re-evaluate pending reviews for an identity
    Sweep(SweepCommand),
    /// Repair the index from the review ledger
    Reconcile(ReconcileCommand),
    /// Show an identity and its confirmed faces
    Album(AlbumCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::Scan(cmd) => cmd.run(&cli).await,
        Commands::Status(cmd) => cmd.run(&cli).await,
        Commands::Scans(cmd) => cmd.run(&cli).await,
        Commands::Submit(cmd) => cmd.run(&cli).await,
        Commands::Pending(cmd) => cmd.run(&cli).await,
        Commands::Show(cmd) => cmd.run(&cli).await,
        Commands::Accept(cmd) => cmd.run(&cli).await,
        Commands::Reject(cmd) => cmd.run(&cli).await,
        Commands::RemoveMember(cmd) => cmd.run(&cli).await,
        Commands::Sweep(cmd) => cmd.run(&cli).await,
        Commands::Reconcile(cmd) => cmd.run(&cli).await,
        Commands::Album(cmd) => cmd.run(&cli).await,
    }
}
