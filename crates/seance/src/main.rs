//! # seance
//!
//! `seance serve` runs the spirit server; `seance join` connects a terminal
//! participant to a session and reveals the spirit's answers letter by letter.

#![deny(unsafe_code)]

mod join;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use seance_server::config::ServerConfig;
use seance_server::server::SeanceServer;
use seance_settings::SeanceSettings;
use seance_spirit::ResponsePipeline;

/// Séance: a shared conversation with a spirit.
#[derive(Parser, Debug)]
#[command(name = "seance", about = "Séance server and terminal client")]
struct Cli {
    /// Settings file (defaults to `~/.seance/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the server.
    Serve(ServeArgs),
    /// Join a session from this terminal.
    Join(JoinArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,
}

#[derive(Args, Debug)]
pub(crate) struct JoinArgs {
    /// Session to join.
    #[arg(long, default_value = "main")]
    pub session: String,

    /// Display name.
    #[arg(long)]
    pub name: Option<String>,

    /// Server URL, e.g. `ws://127.0.0.1:8000` (overrides settings).
    #[arg(long)]
    pub url: Option<String>,
}

fn load(path: Option<&PathBuf>) -> Result<SeanceSettings> {
    match path {
        Some(path) => seance_settings::load_settings_from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display())),
        None => seance_settings::load_settings().context("Failed to load settings"),
    }
}

fn server_config(settings: &SeanceSettings, args: &ServeArgs) -> ServerConfig {
    let mut config = ServerConfig::from_settings(settings);
    if let Some(host) = &args.host {
        config.host.clone_from(host);
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    config
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Settings first: they carry the log level.
    let settings = load(cli.settings.as_ref())?;
    seance_core::logging::init_subscriber(&settings.logging.level, settings.logging.json);

    match cli.command {
        Command::Serve(args) => tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("Failed to start the runtime")?
            .block_on(serve(&settings, &args)),
        // Client state machines share one thread.
        Command::Join(args) => tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to start the runtime")?
            .block_on(join::run(&settings, args)),
    }
}

async fn serve(settings: &SeanceSettings, args: &ServeArgs) -> Result<()> {
    let metrics_handle =
        seance_server::metrics::install_recorder().context("Failed to install metrics recorder")?;
    let pipeline = ResponsePipeline::from_settings(&settings.spirit)
        .context("Failed to build the response pipeline")?;
    let server = SeanceServer::new(server_config(settings, args), pipeline, metrics_handle);

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!("Séance listening on ws://{addr}/ws/{{session_id}}");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    let _ = server.shutdown().graceful_shutdown(None).await;
    let _ = handle.await;

    tracing::info!("Shutdown complete");
    Ok(())
}
