pub mod sources;

use std::{fmt, path::PathBuf, str::FromStr, time::Duration};

use vulnscan_model::TagPolicy;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub dispatcher: DispatcherConfig,
    pub launcher: LauncherConfig,
    pub engine: EngineConfig,
    pub reconciler: ReconcilerConfig,
    pub cors: CorsConfig,
    pub dev_mode: bool,
    pub metadata: ConfigMetadata,
}

impl Config {
    /// Connection URL handed to execution units. Falls back to the API's own
    /// database URL when no dedicated worker URL is configured.
    pub fn worker_database_url(&self) -> Option<&str> {
        self.launcher
            .worker_database_url
            .as_deref()
            .or(self.database.primary_url.as_deref())
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub primary_url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct DispatcherConfig {
    pub tag_policy: TagPolicy,
}

/// Which execution substrate runs scan units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LauncherKind {
    /// Child process of the API running `vulnscan worker`.
    #[default]
    Process,
    /// Container started through the Docker Engine API.
    Docker,
}

impl LauncherKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LauncherKind::Process => "process",
            LauncherKind::Docker => "docker",
        }
    }
}

impl fmt::Display for LauncherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LauncherKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "process" => Ok(LauncherKind::Process),
            "docker" => Ok(LauncherKind::Docker),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LauncherConfig {
    pub kind: LauncherKind,
    /// Executable spawned by the process launcher; defaults to the running
    /// binary when unset.
    pub worker_binary: Option<PathBuf>,
    /// Container image used by the docker launcher.
    pub worker_image: String,
    pub worker_database_url: Option<String>,
    pub docker_network: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub trivy_path: String,
    pub timeout: Duration,
    pub scanners: String,
    pub report_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Sweep period. `None` disables the reconciler.
    pub interval: Option<Duration>,
    /// How long a scan may sit in PENDING before its unit is relaunched.
    pub pending_grace: Duration,
}

impl ReconcilerConfig {
    pub fn is_enabled(&self) -> bool {
        self.interval.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl CorsConfig {
    pub fn is_wildcard_included(&self) -> bool {
        self.allowed_origins
            .iter()
            .any(|origin| origin.trim() == "*")
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}
