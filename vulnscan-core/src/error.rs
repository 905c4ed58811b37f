use std::{io, path::PathBuf, time::Duration};

use thiserror::Error;
use vulnscan_model::{ModelError, ScanId, ScanStatus};

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("schema migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("scan {0} not found")]
    NotFound(ScanId),

    #[error("scan {scan_id} is {actual}, expected {expected}")]
    StatusConflict {
        scan_id: ScanId,
        expected: ScanStatus,
        actual: ScanStatus,
    },

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("failed to launch execution unit for scan {scan_id}: {source}")]
    LaunchFailed {
        scan_id: ScanId,
        #[source]
        source: LaunchError,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScanError {
    /// Whether the error was caused by the caller's input rather than by the
    /// store or the substrate.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, ScanError::Model(ModelError::InvalidImageReference(_)))
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("malformed scan report: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to prepare report directory: {0}")]
    Workspace(#[source] io::Error),

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("scanner did not finish within {}s", .after.as_secs())]
    TimedOut { after: Duration },

    #[error("scanner exited with {}: {stderr}", exit_label(.code))]
    ExitStatus { code: Option<i32>, stderr: String },

    #[error("failed to read report {path}: {source}")]
    ReportRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to decode report: {0}")]
    ReportDecode(#[from] serde_json::Error),
}

impl EngineError {
    /// Failures of the scanning process itself, as opposed to failures
    /// around it (spawning, report handling).
    pub fn is_process_failure(&self) -> bool {
        matches!(
            self,
            EngineError::TimedOut { .. } | EngineError::ExitStatus { .. }
        )
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit status {code}"),
        None => "no exit status (terminated by signal)".to_string(),
    }
}

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("execution unit {unit} is already running")]
    AlreadyRunning { unit: String },

    #[error("no database URL available for execution units")]
    MissingDatabaseUrl,

    #[error("failed to spawn execution unit {unit}: {source}")]
    Spawn {
        unit: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to resolve worker executable: {0}")]
    WorkerBinary(#[source] io::Error),

    #[cfg(feature = "docker")]
    #[error("docker error: {0}")]
    Docker(#[from] bollard::errors::Error),
}
