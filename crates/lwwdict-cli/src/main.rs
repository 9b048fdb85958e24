//! lwwdict CLI
//!
//! Edit, inspect and merge LWW element dictionaries persisted in SQLite.
//!
//! # Usage
//!
//! ```bash
//! # Write to two replicas
//! lwwdict add laptop title '"Draft"'
//! lwwdict add phone title '"Final"'
//!
//! # Converge them
//! lwwdict merge laptop phone
//! lwwdict list laptop
//!
//! # Ship a snapshot somewhere else
//! lwwdict export laptop --format msgpack --out laptop.mp
//! lwwdict --db other.db import laptop laptop.mp
//!
//! # Interactive shell
//! lwwdict shell laptop
//! ```

mod commands;
mod config;
mod shell;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use lwwdict_core::ReplicaName;
use lwwdict_storage::SqliteStorage;
use tracing::{debug, info};
use tracing_subscriber::FmtSubscriber;

use crate::commands::{Applied, Session};
use crate::config::{Config, Settings, SnapshotFormat};

/// lwwdict - Last-Writer-Wins element dictionaries
#[derive(Parser, Debug)]
#[command(name = "lwwdict")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// SQLite database holding the replicas
    #[arg(long, env = "LWWDICT_DB")]
    db: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long, env = "LWWDICT_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LWWDICT_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add or overwrite a key
    Add {
        replica: ReplicaName,
        key: String,
        /// JSON value; anything that is not valid JSON is stored as a string
        value: String,
        /// Timestamp to record instead of the current time
        #[arg(long)]
        at: Option<f64>,
    },
    /// Remove a key
    Remove {
        replica: ReplicaName,
        key: String,
        #[arg(long)]
        at: Option<f64>,
    },
    /// Overwrite a key only if it is currently present
    Update {
        replica: ReplicaName,
        key: String,
        value: String,
        #[arg(long)]
        at: Option<f64>,
    },
    /// Print a key's value
    Get { replica: ReplicaName, key: String },
    /// Print all visible entries
    List { replica: ReplicaName },
    /// Merge one or more replicas into a target replica
    Merge {
        target: ReplicaName,
        #[arg(required = true)]
        sources: Vec<ReplicaName>,
    },
    /// Write a replica snapshot to a file or stdout
    Export {
        replica: ReplicaName,
        #[arg(long, value_enum)]
        format: Option<SnapshotFormat>,
        /// Output file (default: stdout)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Merge a snapshot file into a replica
    Import {
        replica: ReplicaName,
        path: PathBuf,
        /// Snapshot encoding (default: guessed from the file extension)
        #[arg(long, value_enum)]
        format: Option<SnapshotFormat>,
    },
    /// List stored replicas
    Replicas {
        /// Glob pattern such as "eu:*"
        pattern: Option<String>,
    },
    /// Interactive shell on one replica
    Shell {
        replica: ReplicaName,
        /// No banner
        #[arg(short, long)]
        quiet: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let export_format = match &args.command {
        Command::Export { format, .. } => *format,
        _ => None,
    };
    let settings = Settings::resolve(args.db.clone(), args.log_level.clone(), export_format, config);

    // Logs go to stderr so exported snapshots on stdout stay clean
    let subscriber = FmtSubscriber::builder()
        .with_max_level(settings.log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    debug!(db = %settings.db.display(), "opening storage");
    let storage = SqliteStorage::new(&settings.db)
        .with_context(|| format!("Failed to open {}", settings.db.display()))?;
    let session = Session::new(Box::new(storage));

    run(&session, &settings, args.command).await
}

async fn run(session: &Session, settings: &Settings, command: Command) -> Result<()> {
    match command {
        Command::Add { replica, key, value, at } => {
            let applied = session.add(&replica, &key, shell::parse_value(&value), at).await?;
            report(applied);
        }
        Command::Remove { replica, key, at } => {
            let applied = session.remove(&replica, &key, at).await?;
            report(applied);
        }
        Command::Update { replica, key, value, at } => {
            match session.update(&replica, &key, shell::parse_value(&value), at).await? {
                Some(applied) => report(applied),
                None => println!("{}", "(not present)".dimmed()),
            }
        }
        Command::Get { replica, key } => match session.get(&replica, &key).await? {
            Some(value) => println!("{}", value),
            None => println!("{}", "(nil)".dimmed()),
        },
        Command::List { replica } => {
            let entries = session.list(&replica).await?;
            if entries.is_empty() {
                println!("{}", "(empty)".dimmed());
            }
            for (key, value) in entries {
                println!("{} = {}", key.yellow(), value);
            }
        }
        Command::Merge { target, sources } => {
            let summary = session.merge(&target, &sources).await?;
            println!(
                "{} {} additions, {} removals applied to {}",
                "OK".green(),
                summary.additions_applied,
                summary.removals_applied,
                target
            );
        }
        Command::Export { replica, out, .. } => {
            let bytes = session.export(&replica, settings.format).await?;
            match out {
                Some(path) => {
                    std::fs::write(&path, &bytes)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    info!(replica = %replica, path = %path.display(), bytes = bytes.len(), "exported");
                }
                None => {
                    use std::io::Write;
                    let mut stdout = std::io::stdout().lock();
                    stdout.write_all(&bytes)?;
                    if settings.format == SnapshotFormat::Json {
                        writeln!(stdout)?;
                    }
                }
            }
        }
        Command::Import { replica, path, format } => {
            let data = std::fs::read(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let format = format.unwrap_or_else(|| SnapshotFormat::from_path(&path));
            let summary = session.import(&replica, &data, format).await?;
            println!(
                "{} {} additions, {} removals applied to {}",
                "OK".green(),
                summary.additions_applied,
                summary.removals_applied,
                replica
            );
        }
        Command::Replicas { pattern } => {
            let metas = session.replicas(pattern.as_deref()).await?;
            if metas.is_empty() {
                println!("{}", "(none)".dimmed());
            }
            for meta in metas {
                println!(
                    "{}  {} visible, {} additions, {} removals",
                    meta.name.as_str().yellow(),
                    meta.visible,
                    meta.additions,
                    meta.removals
                );
            }
        }
        Command::Shell { replica, quiet } => shell::run(session, replica, quiet).await?,
    }
    Ok(())
}

fn report(applied: Applied) {
    println!("{}", shell::outcome(applied.changed, applied.timestamp));
}
