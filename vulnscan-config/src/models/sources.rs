use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::util::{parse_bool_var, parse_csv_var, parse_var, var};

/// Raw configuration as defined in a TOML file.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(default)]
    pub server: FileServerConfig,
    #[serde(default)]
    pub database: FileDatabaseConfig,
    #[serde(default)]
    pub dispatcher: FileDispatcherConfig,
    #[serde(default)]
    pub launcher: FileLauncherConfig,
    #[serde(default)]
    pub engine: FileEngineConfig,
    #[serde(default)]
    pub reconciler: FileReconcilerConfig,
    #[serde(default)]
    pub cors: FileCorsConfig,
    pub dev_mode: Option<bool>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileDatabaseConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_connections: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acquire_timeout: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileDispatcherConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_policy: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileLauncherConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_binary: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_database_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_network: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileEngineConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trivy_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scanners: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileReconcilerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_grace: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileCorsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_origins: Option<Vec<String>>,
}

/// Environment-derived configuration values.
///
/// Durations, the launcher kind and the tag policy are kept raw here and
/// validated while composing so a typo fails the load instead of being
/// silently ignored.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub server_host: Option<String>,
    pub server_port: Option<u16>,
    pub database_url: Option<String>,
    pub database_url_file: Option<PathBuf>,
    pub database_host: Option<String>,
    pub database_port: Option<u16>,
    pub database_user: Option<String>,
    pub database_name: Option<String>,
    pub database_password: Option<String>,
    pub database_password_file: Option<PathBuf>,
    /// libpq-style database name, the last-resort URL source.
    pub pg_database: Option<String>,
    pub database_max_connections: Option<u32>,
    pub database_min_connections: Option<u32>,
    pub launcher_kind: Option<String>,
    pub worker_image: Option<String>,
    pub worker_binary: Option<PathBuf>,
    pub worker_database_url: Option<String>,
    pub docker_network: Option<String>,
    pub trivy_path: Option<String>,
    pub scan_timeout: Option<String>,
    pub scan_scanners: Option<String>,
    pub scan_report_dir: Option<PathBuf>,
    pub image_tag_policy: Option<String>,
    pub reconcile_interval: Option<String>,
    pub reconcile_pending_grace: Option<String>,
    pub cors_allowed_origins: Option<Vec<String>>,
    pub dev_mode: Option<bool>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self {
            config_path: var("VULNSCAN_CONFIG").map(PathBuf::from),
            server_host: var("SERVER_HOST"),
            server_port: parse_var("SERVER_PORT"),
            database_url: var("DATABASE_URL"),
            database_url_file: var("DATABASE_URL_FILE").map(PathBuf::from),
            database_host: var("DB_HOST"),
            database_port: parse_var("DB_PORT"),
            database_user: var("DB_USER"),
            database_name: var("DB_NAME"),
            database_password: var("DB_PASSWORD"),
            database_password_file: var("DB_PASSWORD_FILE")
                .map(PathBuf::from),
            pg_database: var("PGDATABASE"),
            database_max_connections: parse_var("DB_MAX_CONNECTIONS"),
            database_min_connections: parse_var("DB_MIN_CONNECTIONS"),

            launcher_kind: var("LAUNCHER_KIND"),
            worker_image: var("WORKER_IMAGE"),
            worker_binary: var("WORKER_BINARY").map(PathBuf::from),
            worker_database_url: var("WORKER_DATABASE_URL"),
            docker_network: var("DOCKER_NETWORK"),

            trivy_path: var("TRIVY_PATH"),
            scan_timeout: var("SCAN_TIMEOUT"),
            scan_scanners: var("SCAN_SCANNERS"),
            scan_report_dir: var("SCAN_REPORT_DIR").map(PathBuf::from),

            image_tag_policy: var("IMAGE_TAG_POLICY"),
            reconcile_interval: var("RECONCILE_INTERVAL"),
            reconcile_pending_grace: var("RECONCILE_PENDING_GRACE"),

            cors_allowed_origins: parse_csv_var("CORS_ALLOWED_ORIGINS"),
            dev_mode: parse_bool_var("DEV_MODE"),
        }
    }
}
