//! Cropmart store maintenance.
//!
//! Works on the JSON snapshot the engine's database handle reads and writes:
//!
//! - `check` audits the snapshot and exits non-zero on any violation
//! - `reconcile` rebuilds crop summaries from canonical interests and drops
//!   interests whose crop is gone, then saves
//! - `stats` prints listing and interest counts

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use cropmart_common::interest::InterestStatus;
use cropmart_engine::{audit, Database, DatabaseConfig, EngineConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cropmart", about = "Cropmart store maintenance")]
struct Cli {
    /// Snapshot file holding both stores
    /// (default: <data dir>/cropmart/snapshot.json).
    #[arg(long, env = "CROPMART_DATA", global = true)]
    data_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Report invariant violations without changing anything.
    Check {
        /// Print violations as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Repair crop summaries and orphaned interests, then save.
    Reconcile {
        /// Report what would change without saving.
        #[arg(long)]
        dry_run: bool,
    },
    /// Print listing and interest counts.
    Stats,
}

fn default_data_file() -> PathBuf {
    let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("/tmp"));
    base.join("cropmart").join("snapshot.json")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let path = cli.data_file.unwrap_or_else(default_data_file);
    let db = Database::open(DatabaseConfig {
        snapshot_path: Some(path.clone()),
    })
    .await
    .with_context(|| format!("opening {}", path.display()))?;

    match cli.command {
        Command::Check { json } => {
            let violations = audit(&db.crops().snapshot(), &db.interests().snapshot());
            if json {
                println!("{}", serde_json::to_string_pretty(&violations)?);
            } else {
                for violation in &violations {
                    println!("{violation}");
                }
            }
            if !violations.is_empty() {
                bail!("{} invariant violation(s) in {}", violations.len(), path.display());
            }
            info!("no violations");
        }
        Command::Reconcile { dry_run } => {
            let engine = db.engine(EngineConfig::default());
            let reports = engine
                .reconcile_all()
                .await
                .context("reconciling stores")?;
            let changed: Vec<_> = reports.iter().filter(|r| r.changed()).collect();
            for report in &changed {
                if report.crop_missing {
                    println!(
                        "{}: crop missing, {} orphaned interest(s) removed",
                        report.crop_id, report.orphans_removed
                    );
                } else {
                    println!(
                        "{}: summaries rewritten ({} entries)",
                        report.crop_id, report.summaries
                    );
                }
            }
            println!("{} of {} crop(s) repaired", changed.len(), reports.len());

            if dry_run {
                info!("dry run; snapshot left untouched");
            } else {
                db.shutdown()
                    .await
                    .with_context(|| format!("saving {}", path.display()))?;
            }
        }
        Command::Stats => {
            let crops = db.crops().snapshot();
            let interests = db.interests().snapshot();
            let mut by_status: BTreeMap<&str, usize> = BTreeMap::new();
            for interest in &interests {
                *by_status.entry(interest.status.as_str()).or_default() += 1;
            }
            let available: u64 = crops.iter().map(|c| u64::from(c.quantity_available)).sum();

            println!("crops:     {}", crops.len());
            println!("available: {available}");
            println!("interests: {}", interests.len());
            for status in [
                InterestStatus::Pending,
                InterestStatus::Accepted,
                InterestStatus::Rejected,
            ] {
                let count = by_status.get(status.as_str()).copied().unwrap_or(0);
                println!("  {status:<9} {count}");
            }
        }
    }

    Ok(())
}
