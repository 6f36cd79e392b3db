use std::path::PathBuf;

use chainlog_types::BackReference;
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "chainlog",
    about = "Tamper-evident hash chain ledger for lottery transactions",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file
    #[arg(long, global = true, default_value = "chainlog.toml")]
    pub config: PathBuf,

    /// Database path, overriding the configuration file
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Append an entry to the chain
    Append(AppendArgs),
    /// Verify chain integrity
    Verify(VerifyArgs),
    /// Verify recent entries and record a checkpoint
    Checkpoint,
    /// List checkpoints
    Checkpoints,
    /// Show one entry and check its hash
    Inspect(InspectArgs),
    /// Show chain tail, size, and latest checkpoint
    Status,
    /// Periodically verify and checkpoint until interrupted
    Watch(WatchArgs),
    /// Destructive maintenance
    Admin(AdminArgs),
}

#[derive(Args)]
pub struct AppendArgs {
    /// Entry type, e.g. TICKET_PURCHASE
    #[arg(long = "type")]
    pub kind: String,
    /// Event data as a JSON object
    #[arg(long, default_value = "{}")]
    pub data: String,
    /// Metadata as a JSON object
    #[arg(long, default_value = "{}")]
    pub metadata: String,
    /// Business row to receive the entry's sequence, as TABLE:RECORD_ID
    #[arg(long, value_parser = parse_reference)]
    pub reference: Option<BackReference>,
}

#[derive(Args)]
pub struct VerifyArgs {
    /// Verify from genesis instead of from the latest checkpoint
    #[arg(long, conflicts_with_all = ["from", "to"])]
    pub full: bool,
    /// First sequence of an explicit range
    #[arg(long, requires = "to")]
    pub from: Option<u64>,
    /// Last sequence of an explicit range
    #[arg(long, requires = "from")]
    pub to: Option<u64>,
}

#[derive(Args)]
pub struct InspectArgs {
    pub sequence: u64,
}

#[derive(Args)]
pub struct WatchArgs {
    #[arg(long, default_value = "300")]
    pub interval_secs: u64,
}

#[derive(Args)]
pub struct AdminArgs {
    #[command(subcommand)]
    pub action: AdminAction,
}

#[derive(Subcommand)]
pub enum AdminAction {
    /// Delete every entry and checkpoint and clear back-references
    Reset {
        #[arg(long)]
        operator: String,
        #[arg(long)]
        reason: String,
        /// Confirm the irreversible reset
        #[arg(long)]
        yes: bool,
    },
}

fn parse_reference(s: &str) -> Result<BackReference, String> {
    match s.split_once(':') {
        Some((table, record)) if !table.is_empty() && !record.is_empty() => {
            Ok(BackReference::new(table, record))
        }
        _ => Err(format!("expected TABLE:RECORD_ID, got {s:?}")),
    }
}
