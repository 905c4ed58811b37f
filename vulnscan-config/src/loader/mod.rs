pub mod db_url;
pub mod error;

use once_cell::sync::Lazy;
use std::{fs, path::PathBuf, time::Duration};

use vulnscan_model::TagPolicy;

use crate::{
    models::{
        Config, ConfigMetadata, CorsConfig, DatabaseConfig, DispatcherConfig,
        EngineConfig, LauncherConfig, LauncherKind, ReconcilerConfig,
        ServerConfig,
        sources::{EnvConfig, FileConfig},
    },
    util::parse_duration,
    validation::{self, ConfigWarnings},
};

pub use error::ConfigLoadError;

static DEFAULT_CONFIG_LOCATIONS: Lazy<Vec<PathBuf>> = Lazy::new(|| {
    vec![
        PathBuf::from("vulnscan.toml"),
        PathBuf::from("config/vulnscan.toml"),
    ]
});

pub const DEFAULT_SERVER_PORT: u16 = 8000;
pub const DEFAULT_WORKER_IMAGE: &str = "vulnscan-worker:latest";
pub const DEFAULT_TRIVY_PATH: &str = "trivy";
pub const DEFAULT_SCANNERS: &str = "vuln";
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(20 * 60);
pub const DEFAULT_PENDING_GRACE: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    /// Load `.env`, the optional TOML file and the process environment, then
    /// compose them. Environment wins over the file, the file over defaults.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true).or_else(
                |err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                },
            )?,
            None => {
                dotenvy::dotenv().map(|_| true).or_else(|err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                })?
            }
        };

        let env_config = EnvConfig::gather();
        let (file_config, config_path) = self.load_file_config(&env_config)?;

        Self::compose(
            file_config,
            env_config,
            ConfigMetadata {
                config_path,
                env_file_loaded,
            },
        )
    }

    fn load_file_config(
        &self,
        env_config: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let (path, explicit) = match (
            &self.options.config_path,
            &env_config.config_path,
        ) {
            (Some(path), _) | (None, Some(path)) => (path.clone(), true),
            (None, None) => match DEFAULT_CONFIG_LOCATIONS
                .iter()
                .find(|candidate| candidate.exists())
            {
                Some(path) => (path.clone(), false),
                None => return Ok((None, None)),
            },
        };

        if !path.exists() {
            if explicit {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            return Ok((None, None));
        }

        let contents =
            fs::read_to_string(&path).map_err(|source| ConfigLoadError::Io {
                path: path.clone(),
                source,
            })?;
        let file_config: FileConfig =
            toml::from_str(&contents).map_err(|source| {
                ConfigLoadError::Parse {
                    path: path.clone(),
                    source,
                }
            })?;

        Ok((Some(file_config), Some(path)))
    }

    /// Merge file and environment values over the built-in defaults and run
    /// the guard rails.
    pub fn compose(
        file_config: Option<FileConfig>,
        env: EnvConfig,
        metadata: ConfigMetadata,
    ) -> Result<ConfigLoad, ConfigLoadError> {
        let mut warnings = ConfigWarnings::default();

        if metadata.config_path.is_none() {
            warnings.push_with_hint(
                "No vulnscan.toml detected; falling back to environment variables",
                "Create vulnscan.toml or point VULNSCAN_CONFIG at one to pin settings",
            );
        }

        let FileConfig {
            server: file_server,
            database: file_database,
            dispatcher: file_dispatcher,
            launcher: file_launcher,
            engine: file_engine,
            reconciler: file_reconciler,
            cors: file_cors,
            dev_mode: file_dev_mode,
        } = file_config.unwrap_or_default();

        let server = ServerConfig {
            host: env
                .server_host
                .clone()
                .or(file_server.host)
                .unwrap_or_else(|| "0.0.0.0".to_string()),
            port: env
                .server_port
                .or(file_server.port)
                .unwrap_or(DEFAULT_SERVER_PORT),
        };

        let database = DatabaseConfig {
            primary_url: db_url::resolve_database_url(&env, &file_database)?,
            max_connections: env
                .database_max_connections
                .or(file_database.max_connections)
                .unwrap_or(10),
            min_connections: env
                .database_min_connections
                .or(file_database.min_connections)
                .unwrap_or(0),
            acquire_timeout: duration_or(
                "database.acquire_timeout",
                file_database.acquire_timeout,
                Duration::from_secs(30),
            )?,
        };

        let tag_policy = match env
            .image_tag_policy
            .clone()
            .or(file_dispatcher.tag_policy)
        {
            Some(raw) => raw.parse::<TagPolicy>().map_err(|_| {
                ConfigLoadError::InvalidTagPolicy { value: raw }
            })?,
            None => TagPolicy::default(),
        };
        let dispatcher = DispatcherConfig { tag_policy };

        let kind = match env.launcher_kind.clone().or(file_launcher.kind) {
            Some(raw) => raw
                .parse::<LauncherKind>()
                .map_err(|value| ConfigLoadError::UnknownLauncherKind { value })?,
            None => LauncherKind::default(),
        };
        let launcher = LauncherConfig {
            kind,
            worker_binary: env
                .worker_binary
                .clone()
                .or(file_launcher.worker_binary),
            worker_image: env
                .worker_image
                .clone()
                .or(file_launcher.worker_image)
                .unwrap_or_else(|| DEFAULT_WORKER_IMAGE.to_string()),
            worker_database_url: env
                .worker_database_url
                .clone()
                .or(file_launcher.worker_database_url),
            docker_network: env
                .docker_network
                .clone()
                .or(file_launcher.docker_network),
        };

        let engine = EngineConfig {
            trivy_path: env
                .trivy_path
                .clone()
                .or(file_engine.trivy_path)
                .unwrap_or_else(|| DEFAULT_TRIVY_PATH.to_string()),
            timeout: duration_or(
                "SCAN_TIMEOUT",
                env.scan_timeout.clone().or(file_engine.timeout),
                DEFAULT_SCAN_TIMEOUT,
            )?,
            scanners: env
                .scan_scanners
                .clone()
                .or(file_engine.scanners)
                .unwrap_or_else(|| DEFAULT_SCANNERS.to_string()),
            report_dir: env
                .scan_report_dir
                .clone()
                .or(file_engine.report_dir),
        };

        let reconciler = ReconcilerConfig {
            interval: env
                .reconcile_interval
                .clone()
                .or(file_reconciler.interval)
                .map(|raw| parse_field("RECONCILE_INTERVAL", raw))
                .transpose()?,
            pending_grace: duration_or(
                "RECONCILE_PENDING_GRACE",
                env.reconcile_pending_grace
                    .clone()
                    .or(file_reconciler.pending_grace),
                DEFAULT_PENDING_GRACE,
            )?,
        };

        let cors = CorsConfig {
            allowed_origins: env
                .cors_allowed_origins
                .clone()
                .or(file_cors.allowed_origins)
                .unwrap_or_else(|| vec!["*".to_string()]),
        };

        let dev_mode = env.dev_mode.or(file_dev_mode).unwrap_or(false);

        let config = Config {
            server,
            database,
            dispatcher,
            launcher,
            engine,
            reconciler,
            cors,
            dev_mode,
            metadata,
        };

        warnings.extend(validation::apply_guard_rails(&config)?);

        Ok(ConfigLoad { config, warnings })
    }
}

fn parse_field(
    field: &'static str,
    raw: String,
) -> Result<Duration, ConfigLoadError> {
    parse_duration(&raw).map_err(|source| ConfigLoadError::InvalidDuration {
        field,
        value: raw,
        source,
    })
}

fn duration_or(
    field: &'static str,
    raw: Option<String>,
    default: Duration,
) -> Result<Duration, ConfigLoadError> {
    raw.map(|raw| parse_field(field, raw))
        .transpose()
        .map(|value| value.unwrap_or(default))
}
