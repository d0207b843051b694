//! notes: offline-first notes client.
//!
//! Wraps `notes_sync::SyncEngine` with on-disk state, the HTTP remote and a
//! connectivity probe. One-shot subcommands run a single operation; `daemon`
//! keeps probing and resyncs whenever the server comes back.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use notes_client::{Cli, Command, ConnectivityMonitor, HttpRemote, JsonFileStore, ProbeConfig, StaticToken, TokenFile};
use notes_sync::{
    AuthProvider, EngineConfig, FlushReport, Identifier, Mode, Namespace, Note, NotePayload, SyncEngine, SyncError,
    SyncEvent,
};

type Engine = SyncEngine<HttpRemote, JsonFileStore>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging - respects RUST_LOG env var, defaults to info (or debug with --verbose)
    let default_filter = if cli.verbose {
        "debug,notes_sync=debug,notes_client=debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let state_dir = cli.state_dir();
    info!("State directory: {:?}", state_dir);
    let store = Arc::new(
        JsonFileStore::open(&state_dir).with_context(|| format!("Failed to open state directory {state_dir:?}"))?,
    );

    let auth: Arc<dyn AuthProvider> = match &cli.token_file {
        Some(path) => Arc::new(TokenFile::new(path)),
        None => Arc::new(StaticToken::new(cli.token.clone())),
    };
    if !auth.is_authenticated() {
        warn!("No token configured, the server will likely refuse requests");
    }

    let remote = HttpRemote::new(&cli.server, auth, cli.timeout())?;
    let config = EngineConfig {
        request_timeout: cli.timeout(),
    };
    let engine = SyncEngine::open(remote, store, &Namespace::new(&cli.namespace), config)
        .context("Failed to load client state")?;

    let _events = engine.events().subscribe(|event| match event {
        SyncEvent::OperationDiscarded { operation, reason } => {
            warn!("Server refused {:?} for {}: {}", operation.kind(), operation.target(), reason)
        }
        SyncEvent::AuthRequired => warn!("Log in again: the server no longer accepts this token"),
        _ => {}
    });

    let result = run_command(engine, cli.command).await;
    result.map_err(|e| match e.downcast_ref::<SyncError>() {
        Some(SyncError::AuthRequired) => e.context("Local notes were cleared; supply a valid token"),
        _ => e,
    })
}

async fn run_command(engine: Engine, command: Command) -> Result<()> {
    match command {
        Command::List => {
            for note in engine.load_all().await? {
                print_note(&note);
            }
        }
        Command::Add { content } => {
            let note = engine.create(NotePayload::new(content)).await?;
            print_note(&note);
        }
        Command::Edit { id, content } => {
            let id = parse_id(&id)?;
            let note = engine.update(&id, NotePayload::new(content)).await?;
            print_note(&note);
        }
        Command::Rm { id } => {
            let id = parse_id(&id)?;
            engine.delete(&id).await?;
            println!("deleted {id}");
        }
        Command::Sync => {
            if !engine.mode().is_online() {
                anyhow::bail!("Client is offline; run `notes mode online` first");
            }
            let report = engine.resync().await?;
            print_report(&report);
        }
        Command::Status => {
            let counts = engine.pending_counts().await;
            println!("mode:    {}", engine.mode().mode());
            println!("state:   {:?}", engine.state());
            println!(
                "pending: {} create(s), {} update(s), {} delete(s)",
                counts.creates, counts.updates, counts.deletes
            );
        }
        Command::Mode { mode } => {
            if let Some(report) = engine.switch_mode(mode).await? {
                print_report(&report);
            }
            println!("mode: {}", engine.mode().mode());
        }
        Command::Daemon { interval_secs } => run_daemon(Arc::new(engine), interval_secs).await?,
    }
    Ok(())
}

async fn run_daemon(engine: Arc<Engine>, interval_secs: u64) -> Result<()> {
    info!("Starting notes daemon against {}", engine.remote().base());
    if engine.mode().mode() == Mode::Offline {
        info!("Client is offline; it will resync as soon as the server is reachable");
    }

    let probe = ProbeConfig {
        interval: Duration::from_secs(interval_secs),
        ..Default::default()
    };
    let monitor = ConnectivityMonitor::new(engine.remote().clone(), Arc::clone(engine.mode()), probe);
    let monitor = tokio::spawn(monitor.run());

    let runner = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.run().await })
    };

    tokio::signal::ctrl_c().await.context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");
    monitor.abort();
    runner.abort();

    let counts = engine.pending_counts().await;
    if !counts.is_empty() {
        info!("{} change(s) still queued for the next run", counts.total());
    }
    Ok(())
}

fn parse_id(raw: &str) -> Result<Identifier> {
    raw.parse().with_context(|| format!("Invalid note id '{raw}'"))
}

fn print_note(note: &Note) {
    let marker = if note.id.is_temporary() { " (unsynced)" } else { "" };
    println!("{}{}\t{}", note.id, marker, note.content);
}

fn print_report(report: &FlushReport) {
    println!(
        "synced {} change(s), {} failed, {} discarded{}",
        report.resolved.len(),
        report.failed.len(),
        report.discarded.len(),
        if report.cancelled { ", interrupted by going offline" } else { "" }
    );
    for failed in &report.failed {
        println!("  still queued: {} ({})", failed.operation.target(), failed.error);
    }
    for discarded in &report.discarded {
        println!("  discarded: {} ({})", discarded.operation.target(), discarded.reason);
    }
}
