use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::{PgPool, postgres::PgPoolOptions};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use vulnscan_config::{Config, DatabaseConfig, LauncherKind};
use vulnscan_core::{
    Dispatcher, JobLauncher, LaunchError, Reconciler, ScanStore,
    launcher::ProcessLauncher,
};

use crate::infra::app_state::AppState;

/// Open the PostgreSQL pool described by `config`.
pub async fn connect_pool(config: &DatabaseConfig) -> Result<PgPool> {
    let url = config.primary_url.as_deref().context(
        "no database URL configured; set DATABASE_URL, the DB_* variables or PGDATABASE",
    )?;

    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect(url)
        .await
        .context("failed to connect to PostgreSQL")
}

/// Build the launcher selected by `LAUNCHER_KIND`.
pub fn build_launcher(config: &Config) -> Result<Arc<dyn JobLauncher>> {
    let database_url = config
        .worker_database_url()
        .ok_or(LaunchError::MissingDatabaseUrl)?
        .to_string();

    match config.launcher.kind {
        LauncherKind::Process => {
            let launcher = ProcessLauncher::for_worker_binary(
                config.launcher.worker_binary.clone(),
                database_url,
            )?
            .with_config_path(config.metadata.config_path.clone());
            info!("execution units run as local worker processes");
            Ok(Arc::new(launcher))
        }
        #[cfg(feature = "docker")]
        LauncherKind::Docker => {
            let launcher = vulnscan_core::launcher::DockerLauncher::connect(
                config.launcher.worker_image.clone(),
                database_url,
            )?
            .with_network(config.launcher.docker_network.clone());
            info!(
                image = %config.launcher.worker_image,
                "execution units run as docker containers"
            );
            Ok(Arc::new(launcher))
        }
        #[cfg(not(feature = "docker"))]
        LauncherKind::Docker => anyhow::bail!(
            "LAUNCHER_KIND=docker requires a build with the `docker` feature"
        ),
    }
}

pub fn build_state(
    config: Arc<Config>,
    store: Arc<dyn ScanStore>,
    launcher: Arc<dyn JobLauncher>,
) -> AppState {
    let dispatcher =
        Dispatcher::new(store, launcher, config.dispatcher.tag_policy);
    AppState::new(Arc::new(dispatcher), config)
}

/// Start the reconciler when an interval is configured.
pub fn spawn_reconciler(
    config: &Config,
    state: &AppState,
    shutdown: CancellationToken,
) -> Option<JoinHandle<()>> {
    let interval = config.reconciler.interval?;
    let reconciler = Reconciler::new(
        Arc::clone(state.store()),
        Arc::clone(state.dispatcher.launcher()),
        config.reconciler.pending_grace,
        interval,
    );
    Some(reconciler.spawn(shutdown))
}
