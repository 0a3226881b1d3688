use std::process::ExitCode;
use std::sync::Arc;

use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use crate::application::{IngestionPipeline, LayoutRules};
use crate::domain::error::Result;
use crate::domain::outcome::RunOutcome;
use crate::domain::settings::Settings;
use crate::infrastructure::config::SettingsLoader;
use crate::infrastructure::db::pension::repository::PensionRepository;

/// Process entry: load settings, open the database, ingest the configured
/// inputs and print the run outcome as JSON on stdout.
pub fn run() -> ExitCode {
    let _ = dotenvy::dotenv();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let loader = SettingsLoader::new();
    let settings = match loader.load() {
        Ok(settings) => settings,
        Err(err) => {
            tracing::error!(file = %loader.file().display(), error = %err, "Failed to load settings");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            tracing::error!(error = %err, "Failed to start async runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(ingest(settings)) {
        Ok(outcome) => match serde_json::to_string_pretty(&outcome) {
            Ok(json) => {
                println!("{}", json);
                ExitCode::SUCCESS
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to serialize run outcome");
                ExitCode::FAILURE
            }
        },
        Err(err) => {
            tracing::error!(error = %err, "Ingestion failed");
            ExitCode::FAILURE
        }
    }
}

async fn ingest(settings: Settings) -> Result<RunOutcome> {
    let inputs = settings.ingestion.inputs.clone();
    if inputs.is_empty() {
        tracing::warn!("No input files configured (ingestion.inputs)");
    }

    let repository = Arc::new(PensionRepository::connect(&settings.database).await?);
    tracing::info!(path = %settings.database.path.display(), "Database ready");

    let rules = LayoutRules::from_settings(&settings)?;
    let pipeline = IngestionPipeline::new(repository, settings, rules)
        .load_directory()
        .await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current batches");
            let _ = shutdown_tx.send(true);
        }
    });

    pipeline.run_with_shutdown(&inputs, shutdown_rx).await
}
