use std::path::PathBuf;

use anyhow::Context;
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};

use valet_graph::{ContextGraph, GraphConfig};
use valet_server::ServerConfig;
use valet_store::Database;
use valet_telemetry::{init_telemetry, valet_dir, TelemetryConfig};

#[derive(Parser)]
#[command(name = "valet", about = "Personal-assistant event backend", version)]
struct Cli {
    /// Path to the event database (defaults to ~/.valet/events.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server
    Serve {
        #[arg(long, default_value_t = 9270)]
        port: u16,
    },
    /// Chronological dump of recent events, with type/source tallies
    Inspect {
        #[arg(long, default_value_t = 48)]
        hours: i64,
    },
    /// Windowed event counts by type and source
    Stats {
        #[arg(long, default_value_t = 7)]
        days: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _telemetry = init_telemetry(TelemetryConfig::default());

    let db_path = cli.db.unwrap_or_else(|| valet_dir().join("events.db"));
    let db = Database::open(&db_path)
        .with_context(|| format!("open event database at {}", db_path.display()))?;

    match cli.command {
        Command::Serve { port } => serve(db, port).await,
        Command::Inspect { hours } => {
            inspect(db, hours);
            Ok(())
        }
        Command::Stats { days } => {
            stats(db, days);
            Ok(())
        }
    }
}

async fn serve(db: Database, port: u16) -> anyhow::Result<()> {
    let config = ServerConfig {
        port,
        ..Default::default()
    };
    let handle = valet_server::start(config, db)
        .await
        .context("start server")?;
    tracing::info!(port = handle.port, "valet ready");

    tokio::signal::ctrl_c().await.context("listen for ctrl+c")?;
    tracing::info!("shutting down");
    Ok(())
}

/// Human verification of what is flowing into the log.
fn inspect(db: Database, hours: i64) {
    let graph = ContextGraph::new(db, GraphConfig::default());
    let since = Utc::now() - Duration::hours(hours);

    let mut events = graph.activity_feed(1000, None);
    events.retain(|e| e.occurred_at >= since);
    events.reverse(); // chronological

    println!("== events in the last {hours}h ==\n");
    if events.is_empty() {
        println!("(none)");
        return;
    }

    let mut by_type: std::collections::BTreeMap<String, u64> = Default::default();
    let mut by_source: std::collections::BTreeMap<String, u64> = Default::default();
    for event in &events {
        *by_type.entry(event.event_type.to_string()).or_insert(0) += 1;
        *by_source.entry(event.source.to_string()).or_insert(0) += 1;
    }

    println!("types:");
    for (event_type, count) in &by_type {
        println!("  {event_type}: {count}");
    }
    println!("sources:");
    for (source, count) in &by_source {
        println!("  {source}: {count}");
    }

    println!("\ntimeline:");
    for event in &events {
        println!(
            "  [{}] {} ({}): {}",
            event.occurred_at.to_rfc3339(),
            event.event_type,
            event.source,
            event.summary,
        );
        let entities =
            serde_json::to_string(&event.entities).unwrap_or_else(|_| "{}".into());
        if entities != "{}" {
            println!("    entities: {entities}");
        }
    }
    println!("\ntotal: {} events", events.len());
}

fn stats(db: Database, days: u32) {
    let graph = ContextGraph::new(db, GraphConfig::default());
    let stats = graph.event_stats(days);

    println!("== last {days} days: {} events ==", stats.total);
    println!("by type:");
    for (event_type, count) in &stats.by_type {
        println!("  {event_type}: {count}");
    }
    println!("by source:");
    for (source, count) in &stats.by_source {
        println!("  {source}: {count}");
    }
}
