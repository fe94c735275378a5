//! Keel
//!
//! Command-line entry point and HTTP server for the document-driven agent
//! pipeline in `keel_core`.

mod api;

use anyhow::Context;
use clap::{Parser, Subcommand};
use keel_core::config::PipelineConfig;
use keel_core::skills::DecisionStatus;
use keel_core::state::{io::get_runtime_path, NlpCommand};
use keel_core::swarm::{spawn_orchestrator, AgentEvent, Orchestrator, PipelineEvent};
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tokio::{
    net::TcpListener,
    sync::{broadcast, mpsc},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Clone)]
#[command(author, version, about = "Keel - document-driven agent pipeline")]
struct Args {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Clone)]
enum CliCommand {
    /// Split a specification document into a fresh master document
    Upload {
        /// Project identifier
        #[arg(long)]
        project: String,
        /// Path to the specification document
        #[arg(long)]
        spec: PathBuf,
        /// Who uploaded it
        #[arg(long)]
        by: Option<String>,
    },
    /// Route a natural-language change request
    Command {
        /// The request text
        text: String,
        #[arg(long)]
        by: Option<String>,
    },
    /// Approve or reject a proposal
    Decide {
        /// Proposal id
        id: String,
        #[arg(long, value_parser = parse_decision)]
        status: DecisionStatus,
        #[arg(long)]
        by: Option<String>,
    },
    /// Run the worker against an existing feature
    RunFeature {
        /// Feature id
        id: String,
        /// Extra instructions appended to the task
        #[arg(long)]
        instructions: Option<String>,
        #[arg(long)]
        by: Option<String>,
    },
    /// Print the master document
    Show,
    /// Start the HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },
}

fn parse_decision(value: &str) -> Result<DecisionStatus, String> {
    match value.to_lowercase().as_str() {
        "approved" | "approve" => Ok(DecisionStatus::Approved),
        "rejected" | "reject" => Ok(DecisionStatus::Rejected),
        other => Err(format!("expected approved or rejected, got {other}")),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let env_path = get_runtime_path().join(".env");
    if env_path.exists() {
        dotenvy::from_path(&env_path)
            .with_context(|| format!("Failed to load {}", env_path.display()))?;
    }

    let args = Args::parse();
    let config = PipelineConfig::load()
        .await
        .context("Failed to load pipeline configuration")?;

    match args.command {
        CliCommand::Serve { port } => run_server(config, port).await,
        CliCommand::Show => {
            let doc = config.store().require().await?;
            print_json(&doc)
        }
        command => {
            let event = to_event(command, &config.default_actor)
                .context("Subcommand does not produce a pipeline event")?;
            let mut orchestrator = Orchestrator::from_config(&config);
            let outcome = orchestrator.handle_event(event).await?;
            print_json(&outcome)
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "keel_core=info,keel_server=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Translate a one-shot subcommand into its pipeline event
fn to_event(command: CliCommand, default_actor: &str) -> Option<PipelineEvent> {
    let actor = |by: Option<String>| by.unwrap_or_else(|| default_actor.to_string());
    let event = match command {
        CliCommand::Upload { project, spec, by } => PipelineEvent::DocumentUploaded {
            project_id: project,
            document_path: spec,
            uploaded_by: actor(by),
        },
        CliCommand::Command { text, by } => PipelineEvent::NlpCommandReceived {
            command: NlpCommand::new(text, actor(by)),
        },
        CliCommand::Decide { id, status, by } => PipelineEvent::ProposalDecided {
            proposal_id: id,
            status,
            decided_by: actor(by),
        },
        CliCommand::RunFeature {
            id,
            instructions,
            by,
        } => PipelineEvent::FeatureRun {
            feature_id: id,
            issued_by: actor(by),
            instructions,
        },
        CliCommand::Show | CliCommand::Serve { .. } => return None,
    };
    Some(event)
}

async fn run_server(config: PipelineConfig, port: u16) -> anyhow::Result<()> {
    let (progress_tx, mut progress_rx) = mpsc::channel::<AgentEvent>(100);
    let (event_tx, _) = broadcast::channel::<AgentEvent>(100);

    let orchestrator = Orchestrator::from_config(&config).with_event_channel(progress_tx);
    let (handle, dispatcher) = spawn_orchestrator(orchestrator);

    // Fan progress events out to SSE subscribers
    let fanout = event_tx.clone();
    tokio::spawn(async move {
        while let Some(event) = progress_rx.recv().await {
            let _ = fanout.send(event);
        }
    });

    let state = Arc::new(api::AppState {
        handle,
        store: config.store(),
        event_tx,
    });
    let app = api::routes(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(
        %addr,
        document = %config.document_path.display(),
        workspace = %config.workspace_root.display(),
        provider = config.model.provider.display_name(),
        "Keel server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;

    // Router (and with it every handle) is gone; let queued jobs finish
    dispatcher.await.context("Dispatcher task panicked")?;
    Ok(())
}
