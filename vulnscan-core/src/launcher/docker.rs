use std::collections::HashMap;

use async_trait::async_trait;
use bollard::{
    Docker,
    container::{Config, CreateContainerOptions},
    errors::Error as BollardError,
    models::HostConfig,
};
use tracing::info;

use super::{ExecutionUnitSpec, JobLauncher, LaunchedUnit, WORKER_SUBCOMMAND};
use crate::error::LaunchError;

pub const SCAN_ID_LABEL: &str = "vulnscan.scan_id";

/// Runs each unit as a short-lived container named after the unit.
///
/// Docker enforces unique container names, so a second launch for a scan
/// whose container still exists is rejected with a 409 and reported as
/// [`LaunchError::AlreadyRunning`].
#[derive(Debug, Clone)]
pub struct DockerLauncher {
    docker: Docker,
    image: String,
    database_url: String,
    network: Option<String>,
}

impl DockerLauncher {
    pub fn new(
        docker: Docker,
        image: impl Into<String>,
        database_url: impl Into<String>,
    ) -> Self {
        Self {
            docker,
            image: image.into(),
            database_url: database_url.into(),
            network: None,
        }
    }

    pub fn connect(
        image: impl Into<String>,
        database_url: impl Into<String>,
    ) -> Result<Self, LaunchError> {
        Ok(Self::new(
            Docker::connect_with_local_defaults()?,
            image,
            database_url,
        ))
    }

    pub fn with_network(mut self, network: Option<String>) -> Self {
        self.network = network;
        self
    }

    fn container_config(&self, spec: &ExecutionUnitSpec) -> Config<String> {
        let env = spec
            .environment(&self.database_url)
            .into_iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        let labels =
            HashMap::from([(SCAN_ID_LABEL.to_string(), spec.scan_id.to_string())]);

        Config {
            image: Some(self.image.clone()),
            cmd: Some(vec![WORKER_SUBCOMMAND.to_string()]),
            env: Some(env),
            labels: Some(labels),
            host_config: Some(HostConfig {
                auto_remove: Some(true),
                network_mode: self.network.clone(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

#[async_trait]
impl JobLauncher for DockerLauncher {
    async fn launch(
        &self,
        spec: &ExecutionUnitSpec,
    ) -> Result<LaunchedUnit, LaunchError> {
        let unit = spec.unit_name();
        let options = CreateContainerOptions {
            name: unit.clone(),
            ..Default::default()
        };

        let container = match self
            .docker
            .create_container(Some(options), self.container_config(spec))
            .await
        {
            Ok(container) => container,
            Err(BollardError::DockerResponseServerError {
                status_code: 409, ..
            }) => return Err(LaunchError::AlreadyRunning { unit }),
            Err(err) => return Err(err.into()),
        };

        self.docker
            .start_container::<String>(&container.id, None)
            .await?;

        info!(
            scan_id = %spec.scan_id,
            unit = %unit,
            container = %container.id,
            image = %self.image,
            "execution unit container started"
        );

        Ok(LaunchedUnit {
            name: unit,
            handle: Some(container.id),
        })
    }
}

#[cfg(test)]
mod tests {
    use vulnscan_model::ScanId;

    use super::*;

    #[tokio::test]
    async fn container_config_carries_inputs_and_cleanup() {
        let docker = Docker::connect_with_local_defaults()
            .expect("client construction does not connect");
        let launcher =
            DockerLauncher::new(docker, "vulnscan-worker:latest", "postgres://db/scans")
                .with_network(Some("scanners".into()));

        let config =
            launcher.container_config(&ExecutionUnitSpec::new(ScanId(4), "nginx"));

        assert_eq!(config.cmd, Some(vec!["worker".to_string()]));
        let env = config.env.unwrap();
        assert!(env.contains(&"SCAN_ID=4".to_string()));
        assert!(env.contains(&"IMAGE_NAME=nginx".to_string()));
        let host = config.host_config.unwrap();
        assert_eq!(host.auto_remove, Some(true));
        assert_eq!(host.network_mode.as_deref(), Some("scanners"));
        assert_eq!(
            config.labels.unwrap().get(SCAN_ID_LABEL).map(String::as_str),
            Some("4")
        );
    }
}
