// # ipwatchctl - Event Log Query CLI
//
// Read-only queries against the change-event database written by ipwatchd.
// Opens the same SQLite file; never writes.

use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use ipwatch_core::traits::{ChangeEvent, EventLog};
use ipwatch_log_sqlite::SqliteEventLog;

/// Query the recorded history of public IP changes
#[derive(Debug, Parser)]
#[command(name = "ipwatchctl", version, about)]
struct Cli {
    /// Path to the event database (defaults to $IPWATCH_EVENT_DB_PATH)
    #[arg(long)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List recent IP changes, newest first
    Recent {
        /// Limit the number of entries displayed
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// List every change that recorded a specific address, newest first
    Search {
        /// The IP address to search for
        address: IpAddr,
    },

    /// Print total and distinct change counts
    Summary,
}

fn print_event(event: &ChangeEvent) {
    println!(
        "{}: {} (Location: {})",
        event.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
        event.address,
        event.location_summary()
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let db = match cli.db {
        Some(path) => path,
        None => std::env::var_os("IPWATCH_EVENT_DB_PATH")
            .map(PathBuf::from)
            .context("no database given; pass --db or set IPWATCH_EVENT_DB_PATH")?,
    };

    let log = SqliteEventLog::open(&db)
        .await
        .with_context(|| format!("failed to open event database {}", db.display()))?;

    match cli.command {
        Command::Recent { limit } => {
            let events = log.recent(limit).await?;
            if events.is_empty() {
                println!("No changes recorded.");
            }
            for event in &events {
                print_event(event);
            }
        }
        Command::Search { address } => {
            let events = log.find_address(address).await?;
            if events.is_empty() {
                println!("No changes recorded for {}.", address);
            }
            for event in &events {
                print_event(event);
            }
        }
        Command::Summary => {
            println!("Total IP changes: {}", log.count().await?);
            println!("Unique IPs: {}", log.distinct_address_count().await?);
        }
    }

    Ok(())
}
