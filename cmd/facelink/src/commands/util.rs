//! Utility functions for CLI commands.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use facelink_kv::RedbStore;
use facelink_resolve::{Engine, ResolveConfig};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::Cli;

/// Base directory under the user's home.
pub const DEFAULT_BASE_DIR: &str = ".facelink";
/// Default configuration filename.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Default database filename.
pub const DEFAULT_DB_FILE: &str = "facelink.redb";

/// Contents of the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Database file path (optional, overridden by --db).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub db: String,

    /// Engine settings.
    #[serde(default)]
    pub resolve: ResolveConfig,
}

/// Gets the base directory (~/.facelink).
pub fn base_dir() -> anyhow::Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(DEFAULT_BASE_DIR))
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))
}

/// Loads the config file. A missing default config yields the defaults; a
/// missing file named with --config is an error.
pub fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let path = match &cli.config {
        Some(p) => PathBuf::from(p),
        None => base_dir()?.join(DEFAULT_CONFIG_FILE),
    };
    if !path.exists() {
        if cli.config.is_some() {
            anyhow::bail!("config file '{}' not found", path.display());
        }
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(&path)?;
    let cfg = serde_yaml::from_str(&content)
        .with_context(|| format!("parsing {}", path.display()))?;
    print_verbose(cli, &format!("Loaded config: {}", path.display()));
    Ok(cfg)
}

/// Opens the engine on the database chosen by --db, the config file, or the
/// default location, in that order.
pub fn open_engine(cli: &Cli) -> anyhow::Result<Engine> {
    let cfg = load_config(cli)?;
    let db = match (&cli.db, cfg.db.is_empty()) {
        (Some(p), _) => PathBuf::from(p),
        (None, false) => PathBuf::from(&cfg.db),
        (None, true) => base_dir()?.join(DEFAULT_DB_FILE),
    };
    if let Some(parent) = db.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    print_verbose(cli, &format!("Using database: {}", db.display()));

    let store = RedbStore::open(&db).with_context(|| format!("opening {}", db.display()))?;
    Ok(Engine::with_store(cfg.resolve, Arc::new(store))?)
}

/// A token cancelled on Ctrl-C.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            print_warning("interrupted, stopping after the current batch");
            token.cancel();
        }
    });
    cancel
}

/// Outputs result as JSON or YAML.
pub fn output_result<T: Serialize>(result: &T, as_json: bool) -> anyhow::Result<()> {
    let output = if as_json {
        serde_json::to_string_pretty(result)? + "\n"
    } else {
        serde_yaml::to_string(result)?
    };
    print!("{}", output);
    Ok(())
}

/// Prints verbose output if enabled.
pub fn print_verbose(cli: &Cli, msg: &str) {
    if cli.verbose {
        eprintln!("[verbose] {}", msg);
    }
}

/// Prints success message.
pub fn print_success(msg: &str) {
    eprintln!("\x1b[32m✓\x1b[0m {}", msg);
}

/// Prints warning message.
pub fn print_warning(msg: &str) {
    eprintln!("\x1b[33m⚠\x1b[0m {}", msg);
}
