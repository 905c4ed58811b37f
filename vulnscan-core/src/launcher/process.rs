use std::{path::PathBuf, process::Stdio, sync::Arc};

use async_trait::async_trait;
use dashmap::{DashMap, mapref::entry::Entry};
use tokio::process::Command;
use tracing::{info, warn};
use vulnscan_model::ScanId;

use super::{
    CONFIG_PATH_VAR, ExecutionUnitSpec, JobLauncher, LaunchedUnit,
    WORKER_SUBCOMMAND,
};
use crate::error::LaunchError;

/// Runs each unit as a child process of the API.
///
/// Live children are tracked per scan so a scan never has two local units at
/// once; a reaper task removes the entry when the child exits.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    database_url: String,
    config_path: Option<PathBuf>,
    running: Arc<DashMap<ScanId, Option<u32>>>,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>, database_url: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            database_url: database_url.into(),
            config_path: None,
            running: Arc::new(DashMap::new()),
        }
    }

    /// Launch `program`, or the currently running executable when `None`.
    pub fn for_worker_binary(
        program: Option<PathBuf>,
        database_url: impl Into<String>,
    ) -> Result<Self, LaunchError> {
        let program = match program {
            Some(program) => program,
            None => std::env::current_exe().map_err(LaunchError::WorkerBinary)?,
        };
        Ok(Self::new(program, database_url))
    }

    /// Hand the API's config file to every unit through `VULNSCAN_CONFIG`.
    pub fn with_config_path(mut self, config_path: Option<PathBuf>) -> Self {
        self.config_path = config_path;
        self
    }

    pub fn is_running(&self, scan_id: ScanId) -> bool {
        self.running.contains_key(&scan_id)
    }

    pub fn running_units(&self) -> usize {
        self.running.len()
    }
}

#[async_trait]
impl JobLauncher for ProcessLauncher {
    async fn launch(
        &self,
        spec: &ExecutionUnitSpec,
    ) -> Result<LaunchedUnit, LaunchError> {
        let unit = spec.unit_name();

        let slot = match self.running.entry(spec.scan_id) {
            Entry::Occupied(_) => {
                return Err(LaunchError::AlreadyRunning { unit });
            }
            Entry::Vacant(slot) => slot,
        };

        let mut cmd = Command::new(&self.program);
        cmd.arg(WORKER_SUBCOMMAND)
            .envs(spec.environment(&self.database_url))
            .stdin(Stdio::null());
        if let Some(path) = &self.config_path {
            cmd.env(CONFIG_PATH_VAR, path);
        }

        let mut child = cmd.spawn().map_err(|source| LaunchError::Spawn {
            unit: unit.clone(),
            source,
        })?;
        let pid = child.id();
        slot.insert(pid);

        info!(scan_id = %spec.scan_id, unit = %unit, pid, "execution unit started");

        let running = Arc::clone(&self.running);
        let scan_id = spec.scan_id;
        let reaped_unit = unit.clone();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => {
                    info!(scan_id = %scan_id, unit = %reaped_unit, "execution unit finished");
                }
                Ok(status) => {
                    warn!(scan_id = %scan_id, unit = %reaped_unit, %status, "execution unit exited unsuccessfully");
                }
                Err(err) => {
                    warn!(scan_id = %scan_id, unit = %reaped_unit, error = %err, "failed to wait for execution unit");
                }
            }
            running.remove(&scan_id);
        });

        Ok(LaunchedUnit {
            name: unit,
            handle: pid.map(|pid| pid.to_string()),
        })
    }
}
