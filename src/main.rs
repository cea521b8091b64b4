use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::time::sleep;
use tracing::info;
use tracing_subscriber::EnvFilter;

use feature_factory::api::{self, AppState};
use feature_factory::cli::{Cli, Command};
use feature_factory::client::FactoryClient;
use feature_factory::config::FactoryConfig;
use feature_factory::coordinator::BatchCoordinator;
use feature_factory::executor::{AnyExecutor, Executor};
use feature_factory::store::{BatchStore, FileStore, MemoryStore};
use feature_factory::ui::{self, BatchProgress};

const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Serve { host, port } => serve(&cli.config, host, port).await,
        Command::Submit { file, wait } => {
            let client = FactoryClient::new(&cli.api_url)?;
            submit(&client, &file, wait).await
        }
        Command::Status { batch_id } => {
            let client = FactoryClient::new(&cli.api_url)?;
            ui::print_batch(&client.batch(&batch_id).await?);
            Ok(())
        }
        Command::Fetch {
            batch_id,
            feature_id,
        } => {
            let client = FactoryClient::new(&cli.api_url)?;
            let feature = client.feature(&batch_id, &feature_id).await?;
            println!("{}", ui::feature_line(&feature));
            println!("  objective: {}", feature.objective);
            Ok(())
        }
        Command::List => {
            let client = FactoryClient::new(&cli.api_url)?;
            let batches = client.list().await?;
            if batches.is_empty() {
                println!("No batches yet.");
            }
            for batch in &batches {
                ui::print_batch(batch);
            }
            Ok(())
        }
    }
}

async fn serve(config_path: &Path, host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut config = FactoryConfig::load_from(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }

    let store: Arc<dyn BatchStore> = match &config.data_file {
        Some(path) => Arc::new(FileStore::open(path)?),
        None => Arc::new(MemoryStore::new()),
    };
    let executor = Arc::new(AnyExecutor::from_config(&config)?);
    info!(
        executor = executor.name(),
        execution = ?config.execution,
        persistent = config.data_file.is_some(),
        "starting feature factory"
    );

    let coordinator = Arc::new(BatchCoordinator::new(
        store,
        executor,
        config.default_max_steps,
        config.max_concurrent_batches,
        Duration::from_secs(config.step_timeout_secs),
    ));
    let resumed = coordinator.resume_incomplete();
    if resumed > 0 {
        info!(resumed, "resumed incomplete batches");
    }

    api::serve(
        &config.addr(),
        AppState {
            coordinator,
            execution: config.execution,
        },
    )
    .await?;
    Ok(())
}

async fn submit(client: &FactoryClient, file: &Path, wait: bool) -> Result<()> {
    let contents = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let payload: serde_json::Value = serde_json::from_str(&contents)
        .with_context(|| format!("{} is not valid JSON", file.display()))?;

    let response = client.submit(&payload).await?;
    if !wait {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    let progress = BatchProgress::start(&response.batch_id);
    loop {
        let batch = client.batch(&response.batch_id).await?;
        if batch.status.is_terminal() {
            progress.finish(&batch);
            return Ok(());
        }
        progress.update(&batch);
        sleep(POLL_INTERVAL).await;
    }
}
