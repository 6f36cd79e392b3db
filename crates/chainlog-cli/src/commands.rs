use std::time::Duration;

use anyhow::{bail, Context};
use chainlog_ledger::{
    AppendRequest, ChainMaintenance, ChainStore, CheckpointOutcome, ChecksumStatus, Ledger,
    ResetAuthorization, VerificationReport, VerificationResult,
};
use chainlog_sqlite::SqliteChainStore;
use chainlog_types::{ChainEntry, EntryKind, Payload};
use colored::Colorize;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::cli::*;
use crate::config::CliConfig;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = CliConfig::load(&cli.config)?;
    let database = cli.db.clone().unwrap_or_else(|| config.database.clone());
    let store = SqliteChainStore::open(&database, config.sqlite_options())
        .with_context(|| format!("opening chain database {}", database.display()))?;
    let format = cli.format;
    let ledger = Ledger::with_config(store, config.ledger);

    match cli.command {
        Command::Append(args) => cmd_append(&ledger, args, format),
        Command::Verify(args) => cmd_verify(&ledger, args, format),
        Command::Checkpoint => cmd_checkpoint(&ledger, format),
        Command::Checkpoints => cmd_checkpoints(&ledger, format),
        Command::Inspect(args) => cmd_inspect(&ledger, args, format),
        Command::Status => cmd_status(&ledger, format),
        Command::Watch(args) => cmd_watch(&ledger, args),
        Command::Admin(args) => cmd_admin(ledger.store(), args, format),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_payload(flag: &str, text: &str) -> anyhow::Result<Payload> {
    let value: serde_json::Value =
        serde_json::from_str(text).with_context(|| format!("--{flag} is not valid JSON"))?;
    Payload::from_value(value).with_context(|| format!("--{flag} must be a JSON object"))
}

fn cmd_append(
    ledger: &Ledger<SqliteChainStore>,
    args: AppendArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let kind = EntryKind::custom(args.kind.as_str())
        .with_context(|| format!("invalid entry type {:?}", args.kind))?;
    let mut request = AppendRequest::new(kind, parse_payload("data", &args.data)?)
        .with_metadata(parse_payload("metadata", &args.metadata)?);
    request.back_reference = args.reference;

    let entry = ledger.append(request)?;
    match format {
        OutputFormat::Json => print_json(&entry),
        OutputFormat::Text => {
            println!(
                "{} Appended {} {}",
                "✓".green().bold(),
                format!("#{}", entry.sequence).yellow().bold(),
                entry.kind.to_string().cyan()
            );
            println!("  Hash: {}", entry.hash.to_hex().dimmed());
            Ok(())
        }
    }
}

fn print_report(report: &VerificationReport, format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        return print_json(report);
    }
    match &report.result {
        VerificationResult::Valid {
            last_sequence,
            last_hash,
        } => {
            println!("{} Chain integrity verified", "✓".green().bold());
            println!("  Range: {}..={}", report.from, report.to);
            println!("  Entries examined: {}", report.entries_examined.to_string().bold());
            match last_hash {
                Some(hash) => println!("  Verified tail: #{} {}", last_sequence, hash.short_hex().dimmed()),
                None => println!("  Verified tail: {}", "(empty chain)".dimmed()),
            }
        }
        VerificationResult::Invalid { findings } => {
            println!("{} Chain integrity violated", "✗".red().bold());
            println!("  Range: {}..={}", report.from, report.to);
            println!("  Entries examined: {}", report.entries_examined);
            for finding in findings {
                println!(
                    "  {} {} {}",
                    finding.kind.to_string().red(),
                    format!("#{}", finding.sequence).yellow(),
                    finding.detail
                );
            }
        }
    }
    Ok(())
}

fn cmd_verify(
    ledger: &Ledger<SqliteChainStore>,
    args: VerifyArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let report = match (args.full, args.from, args.to) {
        (true, _, _) => ledger.full_verify()?,
        (false, Some(from), Some(to)) => ledger.verify(from, to)?,
        _ => ledger.quick_verify()?,
    };
    print_report(&report, format)?;
    if !report.is_valid() {
        bail!(
            "chain verification failed with {} finding(s)",
            report.findings().len()
        );
    }
    Ok(())
}

fn cmd_checkpoint(ledger: &Ledger<SqliteChainStore>, format: OutputFormat) -> anyhow::Result<()> {
    let outcome = ledger.create_checkpoint()?;
    if format == OutputFormat::Json {
        print_json(&outcome)?;
    } else {
        match &outcome {
            CheckpointOutcome::Created { checkpoint } => println!(
                "{} Checkpoint created at {} {}",
                "✓".green().bold(),
                format!("#{}", checkpoint.sequence).yellow().bold(),
                checkpoint.hash.short_hex().dimmed()
            ),
            CheckpointOutcome::UpToDate { checkpoint } => println!(
                "Already checkpointed at {}",
                format!("#{}", checkpoint.sequence).yellow()
            ),
            CheckpointOutcome::EmptyChain => println!("Chain is empty; nothing to checkpoint."),
            CheckpointOutcome::Rejected { report } => print_report(report, format)?,
        }
    }
    if let CheckpointOutcome::Rejected { report } = outcome {
        bail!(
            "checkpoint rejected: {} finding(s)",
            report.findings().len()
        );
    }
    Ok(())
}

fn cmd_checkpoints(ledger: &Ledger<SqliteChainStore>, format: OutputFormat) -> anyhow::Result<()> {
    let checkpoints = ledger.checkpoints()?;
    if format == OutputFormat::Json {
        return print_json(&checkpoints);
    }
    if checkpoints.is_empty() {
        println!("No checkpoints.");
    }
    for cp in checkpoints {
        println!(
            "{}  {}  {}",
            format!("#{}", cp.sequence).yellow(),
            cp.hash.short_hex().dimmed(),
            cp.created_at
        );
    }
    Ok(())
}

fn print_entry(entry: &ChainEntry) {
    println!("Entry {}", format!("#{}", entry.sequence).yellow().bold());
    println!("  Type:      {}", entry.kind.to_string().cyan());
    println!("  Timestamp: {}", entry.timestamp);
    println!("  Data:      {}", serde_json::Value::Object(entry.data.as_map().clone()));
    println!("  Metadata:  {}", serde_json::Value::Object(entry.metadata.as_map().clone()));
    match entry.previous_hash {
        Some(prev) => println!("  Previous:  {}", prev.to_hex().dimmed()),
        None => println!("  Previous:  {}", "(genesis)".dimmed()),
    }
    println!("  Hash:      {}", entry.hash.to_hex());
}

fn cmd_inspect(
    ledger: &Ledger<SqliteChainStore>,
    args: InspectArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let inspection = ledger.inspect(args.sequence)?;
    if format == OutputFormat::Json {
        return print_json(&inspection);
    }
    print_entry(&inspection.entry);
    match &inspection.checksum {
        ChecksumStatus::Match => println!("  Checksum:  {}", "match".green()),
        ChecksumStatus::Mismatch { recomputed } => println!(
            "  Checksum:  {} (fields hash to {})",
            "MISMATCH".red().bold(),
            recomputed.to_hex()
        ),
        ChecksumStatus::Unencodable { reason } => {
            println!("  Checksum:  {} ({reason})", "UNENCODABLE".red().bold())
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct Status {
    entries: u64,
    tail: Option<chainlog_types::ChainTail>,
    latest_checkpoint: Option<chainlog_types::Checkpoint>,
}

fn cmd_status(ledger: &Ledger<SqliteChainStore>, format: OutputFormat) -> anyhow::Result<()> {
    let status = Status {
        entries: ledger.entry_count()?,
        tail: ledger.tail()?,
        latest_checkpoint: ledger.store().latest_checkpoint()?,
    };
    if format == OutputFormat::Json {
        return print_json(&status);
    }
    if let Some(path) = ledger.store().path() {
        println!("Database: {}", path.display().to_string().bold());
    }
    println!("Entries: {}", status.entries.to_string().bold());
    match status.tail {
        Some(tail) => println!("Tail: {}", tail.to_string().yellow()),
        None => println!("Tail: {}", "(empty chain)".dimmed()),
    }
    match status.latest_checkpoint {
        Some(cp) => {
            let behind = status.tail.map_or(0, |t| t.sequence.saturating_sub(cp.sequence));
            println!(
                "Checkpoint: {} {} ({} entries since)",
                format!("#{}", cp.sequence).yellow(),
                cp.hash.short_hex().dimmed(),
                behind
            );
        }
        None => println!("Checkpoint: {}", "none".dimmed()),
    }
    Ok(())
}

fn run_watch_cycle(ledger: &Ledger<SqliteChainStore>) {
    match ledger.create_checkpoint() {
        Ok(CheckpointOutcome::Created { checkpoint }) => {
            info!(seq = checkpoint.sequence, "watch: chain verified and checkpointed")
        }
        Ok(CheckpointOutcome::UpToDate { checkpoint }) => {
            info!(seq = checkpoint.sequence, "watch: no new entries")
        }
        Ok(CheckpointOutcome::EmptyChain) => info!("watch: chain is empty"),
        Ok(CheckpointOutcome::Rejected { report }) => {
            for finding in report.findings() {
                error!(
                    seq = finding.sequence,
                    kind = %finding.kind,
                    detail = %finding.detail,
                    "watch: chain integrity violation"
                );
            }
        }
        Err(e) => error!(error = %e, "watch: verification cycle failed"),
    }
}

fn cmd_watch(ledger: &Ledger<SqliteChainStore>, args: WatchArgs) -> anyhow::Result<()> {
    if args.interval_secs == 0 {
        bail!("--interval-secs must be at least 1");
    }
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;

    runtime.block_on(async {
        let mut ticker = tokio::time::interval(Duration::from_secs(args.interval_secs));
        info!(interval_secs = args.interval_secs, "watching chain");
        loop {
            tokio::select! {
                _ = ticker.tick() => run_watch_cycle(ledger),
                signal = tokio::signal::ctrl_c() => {
                    if let Err(e) = signal {
                        warn!(error = %e, "failed to listen for interrupt");
                    }
                    info!("watch stopped");
                    break;
                }
            }
        }
    });
    Ok(())
}

fn cmd_admin(
    store: &SqliteChainStore,
    args: AdminArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match args.action {
        AdminAction::Reset {
            operator,
            reason,
            yes,
        } => {
            if !yes {
                bail!("refusing to reset the chain without --yes");
            }
            let summary = ChainMaintenance::new(store)
                .reset_chain(&ResetAuthorization::new(operator, reason))?;
            if format == OutputFormat::Json {
                return print_json(&summary);
            }
            println!("{} Chain reset", "✓".green().bold());
            println!("  Entries deleted: {}", summary.entries_deleted);
            println!("  Checkpoints deleted: {}", summary.checkpoints_deleted);
            println!("  References cleared: {}", summary.references_cleared);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use chainlog_sqlite::SqliteOptions;
    use clap::Parser;

    use super::*;

    fn run(db: &Path, args: &[&str]) -> anyhow::Result<()> {
        let db = db.to_str().unwrap();
        let mut argv = vec!["chainlog", "--config", "/nonexistent/chainlog.toml", "--db", db];
        argv.extend_from_slice(args);
        run_command(Cli::try_parse_from(argv).unwrap())
    }

    fn open(db: &Path) -> Ledger<SqliteChainStore> {
        Ledger::new(SqliteChainStore::open(db, SqliteOptions::default()).unwrap())
    }

    #[test]
    fn append_verify_checkpoint_flow() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("chain.db");
        for ticket in ["T1", "T2", "T3"] {
            let data = format!(r#"{{"ticketId":"{ticket}"}}"#);
            run(&db, &["append", "--type", "TICKET_PURCHASE", "--data", &data]).unwrap();
        }
        run(&db, &["verify", "--full"]).unwrap();
        run(&db, &["checkpoint"]).unwrap();
        run(&db, &["--format", "json", "verify"]).unwrap();
        run(&db, &["verify", "--from", "2", "--to", "3"]).unwrap();
        run(&db, &["inspect", "2"]).unwrap();
        run(&db, &["status"]).unwrap();
        run(&db, &["checkpoints"]).unwrap();

        let ledger = open(&db);
        assert_eq!(ledger.entry_count().unwrap(), 3);
        assert_eq!(ledger.checkpoints().unwrap().len(), 1);
    }

    #[test]
    fn append_rejects_bad_input() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("chain.db");
        assert!(run(&db, &["append", "--type", "ticket purchase"]).is_err());
        assert!(run(&db, &["append", "--type", "ADJUSTMENT", "--data", "[1,2]"]).is_err());
        assert!(run(&db, &["append", "--type", "ADJUSTMENT", "--metadata", "{oops"]).is_err());
        assert_eq!(open(&db).entry_count().unwrap(), 0);
    }

    #[test]
    fn verify_fails_on_tampering() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("chain.db");
        run(&db, &["append", "--type", "ADJUSTMENT", "--data", r#"{"amount":5}"#]).unwrap();
        rusqlite::Connection::open(&db)
            .unwrap()
            .execute("UPDATE chain_entries SET data = '{\"amount\":500}'", [])
            .unwrap();

        let err = run(&db, &["verify", "--full"]).unwrap_err();
        assert!(err.to_string().contains("1 finding"));
        assert!(run(&db, &["checkpoint"]).is_err());
    }

    #[test]
    fn reset_requires_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("chain.db");
        run(&db, &["append", "--type", "DRAW_RESULT"]).unwrap();

        let reset = ["admin", "reset", "--operator", "alice", "--reason", "staging wipe"];
        assert!(run(&db, &reset).is_err());
        assert_eq!(open(&db).entry_count().unwrap(), 1);

        let mut confirmed = reset.to_vec();
        confirmed.push("--yes");
        run(&db, &confirmed).unwrap();
        assert_eq!(open(&db).entry_count().unwrap(), 0);
    }
}
