//! Execution substrate adapters.
//!
//! A launched unit runs `vulnscan worker` for exactly one scan. Its inputs are
//! passed through the environment: `SCAN_ID`, `IMAGE_NAME` and `DATABASE_URL`.

#[cfg(feature = "docker")]
mod docker;
mod process;

#[cfg(feature = "docker")]
pub use docker::DockerLauncher;
pub use process::ProcessLauncher;

use async_trait::async_trait;
use vulnscan_model::ScanId;

use crate::error::LaunchError;

pub const SCAN_ID_VAR: &str = "SCAN_ID";
pub const IMAGE_NAME_VAR: &str = "IMAGE_NAME";
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";
/// Config file a local unit reloads so it sees the API's `[engine]` settings.
pub const CONFIG_PATH_VAR: &str = "VULNSCAN_CONFIG";

/// Subcommand of the `vulnscan` binary that runs inside a unit.
pub const WORKER_SUBCOMMAND: &str = "worker";

/// What a unit needs to know about its scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionUnitSpec {
    pub scan_id: ScanId,
    pub image_name: String,
}

impl ExecutionUnitSpec {
    pub fn new(scan_id: ScanId, image_name: impl Into<String>) -> Self {
        Self {
            scan_id,
            image_name: image_name.into(),
        }
    }

    /// Deterministic unit name; a second launch for the same scan collides
    /// with the first one on substrates that enforce unique names.
    pub fn unit_name(&self) -> String {
        format!("scan-job-{}", self.scan_id)
    }

    pub fn environment(&self, database_url: &str) -> Vec<(&'static str, String)> {
        vec![
            (SCAN_ID_VAR, self.scan_id.to_string()),
            (IMAGE_NAME_VAR, self.image_name.clone()),
            (DATABASE_URL_VAR, database_url.to_string()),
        ]
    }
}

/// Handle for a unit the substrate accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchedUnit {
    pub name: String,
    /// Substrate-specific identifier (process id, container id).
    pub handle: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobLauncher: Send + Sync {
    /// Start a unit for `spec`. Returns once the substrate accepted it.
    async fn launch(
        &self,
        spec: &ExecutionUnitSpec,
    ) -> Result<LaunchedUnit, LaunchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_name_is_derived_from_scan_id() {
        let spec = ExecutionUnitSpec::new(ScanId(17), "nginx");
        assert_eq!(spec.unit_name(), "scan-job-17");
    }

    #[test]
    fn environment_carries_scan_inputs() {
        let spec = ExecutionUnitSpec::new(ScanId(3), "alpine:3.19");
        let env = spec.environment("postgres://db/scans");
        assert_eq!(
            env,
            vec![
                ("SCAN_ID", "3".to_string()),
                ("IMAGE_NAME", "alpine:3.19".to_string()),
                ("DATABASE_URL", "postgres://db/scans".to_string()),
            ]
        );
    }
}
