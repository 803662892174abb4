//! specgraph - Main Entry Point
//!
//! Loads a graph document, runs it once and prints the state of every node.

use anyhow::Context;
use clap::Parser;
use specgraph::{
    config::{AppConfig, AppState, DocumentFile},
    graph::{event_channel, GraphEvent, Workspace},
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "specgraph", version, about = "Run a multispectral node-graph document")]
struct Cli {
    /// Graph document to load and execute
    document: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = AppConfig::load_or_default();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting specgraph");

    match run(&cli, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli, config: &AppConfig) -> anyhow::Result<()> {
    let mut app_state = AppState::load_or_default();
    app_state.cleanup_missing_documents();

    let (tx, rx) = event_channel();
    let mut workspace = Workspace::with_config(config.engine.clone());
    workspace.set_event_sink(Some(tx));

    if let Some(path) = &cli.document {
        let file = DocumentFile::load(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let report = workspace
            .load_document(&file.document)
            .with_context(|| format!("Failed to load {}", path.display()))?;
        for warning in &report.warnings {
            tracing::warn!("{:?}", warning);
        }

        app_state.add_recent_document(path, &DocumentFile::display_name(path));
        if let Err(e) = app_state.save() {
            tracing::warn!("Failed to save app state: {}", e);
        }
    } else {
        tracing::info!("No document given, nothing to run");
    }

    let failures = rx
        .try_iter()
        .filter(|e| matches!(e, GraphEvent::NodeErrored { .. }))
        .count();

    for row in workspace.graph().summary() {
        println!("{}", row);
    }
    tracing::info!(
        "{} nodes, {} failed",
        workspace.graph().len(),
        failures
    );
    Ok(())
}
