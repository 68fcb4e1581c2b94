//! Stresswatch CLI
//!
//! Real-time stress detection server.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use stresswatch::{
    classifier::{ForestParams, FsModelStore, ModelStore, StressClassifier},
    config::Config,
    server::{self, ServerConfig},
    SimulatedAppProvider, Storage, VERSION,
};

#[derive(Parser)]
#[command(name = "stresswatch")]
#[command(version = VERSION)]
#[command(about = "Real-time stress detection from keyboard and mouse behavior", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the tracking server
    Serve {
        /// Port to listen on (overrides config)
        #[arg(long)]
        port: Option<u16>,

        /// Database file path (overrides config)
        #[arg(long)]
        db: Option<PathBuf>,

        /// Model artifact path (overrides config)
        #[arg(long)]
        model: Option<PathBuf>,
    },

    /// Refit the classifier from the calibration corpus and save the artifact
    Train {
        /// Model artifact path (overrides config)
        #[arg(long)]
        model: Option<PathBuf>,
    },

    /// Show effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, db, model } => cmd_serve(port, db, model).await,
        Commands::Train { model } => cmd_train(model),
        Commands::Config => cmd_config(),
    }
}

async fn cmd_serve(
    port: Option<u16>,
    db: Option<PathBuf>,
    model: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut config = Config::load().context("failed to load configuration")?;
    if let Some(port) = port {
        config.listen_port = port;
    }
    if let Some(model) = model {
        config.model_path = model;
    }
    config
        .ensure_directories()
        .context("failed to create data directories")?;

    let db_path = db.unwrap_or_else(|| config.db_path());
    let storage = Storage::open(db_path).context("failed to open database")?;

    let store = FsModelStore::new(config.model_path.clone());
    let classifier = Arc::new(
        StressClassifier::load_or_train(&store).context("failed to initialize classifier")?,
    );

    let provider = Arc::new(SimulatedAppProvider::new());

    let server_config = ServerConfig {
        port: config.listen_port,
        cadence: config.cadence(),
    };
    let (addr, shutdown_tx) = server::run(server_config, classifier, storage, provider).await?;
    tracing::info!("stresswatch v{VERSION} ready on {addr}");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    tracing::info!("shutting down");
    let _ = shutdown_tx.send(());

    Ok(())
}

fn cmd_train(model: Option<PathBuf>) -> anyhow::Result<()> {
    let mut config = Config::load().context("failed to load configuration")?;
    if let Some(model) = model {
        config.model_path = model;
    }
    config
        .ensure_directories()
        .context("failed to create data directories")?;

    tracing::info!("fitting classifier from calibration corpus");
    let classifier =
        StressClassifier::train(ForestParams::default()).context("training failed")?;

    let json = classifier
        .to_artifact_json()
        .context("failed to serialize model artifact")?;
    let store = FsModelStore::new(config.model_path.clone());
    store
        .save(&json)
        .context("failed to save model artifact")?;

    println!("model saved to {}", config.model_path.display());
    Ok(())
}

fn cmd_config() -> anyhow::Result<()> {
    let config = Config::load().context("failed to load configuration")?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    println!("\nconfig file: {}", Config::config_path().display());
    println!("database:    {}", config.db_path().display());
    Ok(())
}
