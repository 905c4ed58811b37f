use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vulnscan_config::{Config, ConfigLoad, ConfigLoader, DatabaseConfig};
use vulnscan_core::{
    MIGRATOR, PostgresScanStore, ScanWorker, TrivyEngine, WorkerOutcome,
};
use vulnscan_model::ScanId;
use vulnscan_server::{
    create_app,
    infra::startup::{
        build_launcher, build_state, connect_pool, spawn_reconciler,
    },
};

/// Connections a single worker needs: one for the scan row, one spare.
const WORKER_MAX_CONNECTIONS: u32 = 2;

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "vulnscan")]
#[command(about = "Container image vulnerability scanning service")]
struct Cli {
    /// TOML configuration file (also read from VULNSCAN_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(ClapArgs, Debug, Clone, Default)]
struct ServeArgs {
    /// Server port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long)]
    host: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP API (default)
    Serve(ServeArgs),
    /// Run one scan to completion; the entry point of every execution unit
    Worker(WorkerArgs),
    #[command(subcommand)]
    Db(DbCommand),
}

#[derive(ClapArgs, Debug)]
struct WorkerArgs {
    #[arg(long, env = "SCAN_ID")]
    scan_id: i64,

    #[arg(long, env = "IMAGE_NAME")]
    image_name: String,
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    /// Apply database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_runtime_config(cli.config.as_ref())?;

    match cli.command {
        Some(Command::Worker(args)) => run_worker(config, args).await,
        Some(Command::Db(DbCommand::Migrate)) => run_db_migrate(config).await,
        Some(Command::Serve(args)) => run_server(config, args).await,
        None => run_server(config, cli.serve).await,
    }
}

fn load_runtime_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = path {
        loader = loader.with_config_path(path);
    }
    let ConfigLoad { config, warnings } =
        loader.load().context("failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "info,vulnscan=info,tower_http=warn,sqlx=warn".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = &config.metadata.config_path {
        info!(path = %path.display(), "loaded configuration file");
    }

    for warning in warnings.iter() {
        match &warning.hint {
            Some(hint) => {
                warn!(message = %warning.message, hint = %hint, "configuration warning")
            }
            None => warn!(message = %warning.message, "configuration warning"),
        }
    }

    Ok(config)
}

async fn run_db_migrate(config: Config) -> anyhow::Result<()> {
    let pool = connect_pool(&config.database).await?;
    MIGRATOR
        .run(&pool)
        .await
        .context("database migration failed")?;
    info!("Database migrations applied successfully");
    Ok(())
}

async fn run_worker(config: Config, args: WorkerArgs) -> anyhow::Result<()> {
    let scan_id = ScanId(args.scan_id);
    let pool_config = DatabaseConfig {
        max_connections: config
            .database
            .max_connections
            .min(WORKER_MAX_CONNECTIONS),
        min_connections: 0,
        ..config.database.clone()
    };
    let pool = connect_pool(&pool_config).await?;

    let worker = ScanWorker::new(
        Arc::new(PostgresScanStore::new(pool)),
        Arc::new(TrivyEngine::from_config(&config.engine)),
    );

    let outcome = worker
        .run(scan_id, &args.image_name)
        .await
        .with_context(|| format!("scan {scan_id} could not be run"))?;

    match outcome {
        WorkerOutcome::Done { findings } => {
            info!(scan_id = %scan_id, findings, "worker finished: DONE");
        }
        WorkerOutcome::Failed { reason } => {
            warn!(scan_id = %scan_id, reason = %reason, "worker finished: FAILED");
        }
    }
    Ok(())
}

async fn run_server(mut config: Config, args: ServeArgs) -> anyhow::Result<()> {
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }
    let config = Arc::new(config);

    let pool = connect_pool(&config.database).await?;
    MIGRATOR
        .run(&pool)
        .await
        .context("database migration failed")?;

    let store = Arc::new(PostgresScanStore::new(pool));
    let launcher = build_launcher(&config)?;
    let state = build_state(Arc::clone(&config), store, launcher);

    let shutdown = CancellationToken::new();
    let reconciler = spawn_reconciler(&config, &state, shutdown.clone());

    let addr = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(
        address = %addr,
        launcher = %config.launcher.kind,
        tag_policy = %config.dispatcher.tag_policy,
        "Starting vulnscan API"
    );

    axum::serve(listener, create_app(state))
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    if let Some(handle) = reconciler
        && let Err(err) = handle.await
    {
        error!(error = %err, "reconciler task ended abnormally");
    }
    info!("vulnscan API stopped");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = shutdown.cancelled() => {},
    }

    info!("shutdown signal received");
    shutdown.cancel();
}
