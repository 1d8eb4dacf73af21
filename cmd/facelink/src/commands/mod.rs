//! CLI commands module.

mod identity;
mod maintenance;
mod review;
mod scan;
mod util;

pub use identity::{AlbumCommand, SubmitCommand};
pub use maintenance::{ReconcileCommand, SweepCommand};
pub use review::{AcceptCommand, PendingCommand, RejectCommand, RemoveMemberCommand, ShowCommand};
pub use scan::{ScanCommand, ScansCommand, StatusCommand};

// Re-export utils for use in commands
pub(crate) use util::*;
