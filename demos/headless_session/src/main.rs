//! Headless Session Example
//!
//! Runs the session runtime without a transport. One scripted player logs
//! in, mines for a while, disconnects, and reconnects to collect its offline
//! reward. Every notification the player would receive is printed as JSON.
//!
//! Usage: `headless_session [--config session.ron] [--db players.db]`
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use idlemmo_core::{ActivityId, PlayerId};
use idlemmo_db::{MemoryRepository, NativeDbRepository, Repository};
use idlemmo_session::{ClientCommand, SessionConfig, SessionRuntime};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

struct Args {
    config: Option<PathBuf>,
    db: Option<PathBuf>,
}

fn parse_args() -> Args {
    let mut args = Args {
        config: None,
        db: None,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => args.config = iter.next().map(PathBuf::from),
            "--db" => args.db = iter.next().map(PathBuf::from),
            other => eprintln!("ignoring unknown argument {}", other),
        }
    }
    args
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = parse_args();
    let config = match &args.config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads())
        .enable_all()
        .build()?;
    runtime.block_on(run(config, args.db))
}

async fn run(config: SessionConfig, db: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
    println!("=== Idlemmo Headless Session ===\n");

    let catalog = idlemmo_script::bundled_catalog()?;
    println!("Loaded catalog:");
    for summary in catalog.summaries() {
        println!(
            "  {} ({}s per tick, {} sub-projects)",
            summary.id,
            summary.tick_interval,
            summary.sub_projects.len()
        );
    }
    println!();

    let repo: Arc<dyn Repository> = match &db {
        Some(path) => Arc::new(NativeDbRepository::open(path)?),
        None => Arc::new(MemoryRepository::new()),
    };
    let session = SessionRuntime::start(config, catalog, repo);
    let player = PlayerId::new("demo_player");

    let (conn, mut outbound) = session.open_connection();
    let conn_id = conn.id();
    let printer = tokio::spawn(async move {
        while let Some(notification) = outbound.recv().await {
            match notification.to_json() {
                Ok(json) => println!("  <- {}", json),
                Err(err) => eprintln!("  <- unencodable notification: {}", err),
            }
        }
    });

    session.connect(player.clone(), conn, false)?;
    session
        .dispatch(player.clone(), ClientCommand::ListSequences)
        .await?;
    session
        .dispatch(
            player.clone(),
            ClientCommand::StartSequence {
                seq_id: ActivityId::new("mining"),
                sub_project_id: None,
            },
        )
        .await?;

    info!("mining for ten seconds");
    tokio::time::sleep(Duration::from_secs(10)).await;

    session.dispatch(player.clone(), ClientCommand::ListBag).await?;
    session
        .dispatch(player.clone(), ClientCommand::StopSequence)
        .await?;

    info!("disconnecting");
    session.connection_closed(player.clone(), conn_id)?;
    tokio::time::sleep(Duration::from_secs(5)).await;

    let (conn, mut outbound) = session.open_connection();
    session.connect(player.clone(), conn, true)?;
    let reconnect_printer = tokio::spawn(async move {
        while let Some(notification) = outbound.recv().await {
            if let Ok(json) = notification.to_json() {
                println!("  <- {}", json);
            }
        }
    });

    let login = session.dispatch(player.clone(), ClientCommand::Login).await?;
    println!("\nFinal login view: {}", login.to_json()?);

    session.shutdown().await?;
    let _ = printer.await;
    let _ = reconnect_printer.await;
    println!("\n=== Session complete ===");
    Ok(())
}
