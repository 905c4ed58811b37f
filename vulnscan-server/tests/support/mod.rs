use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum_test::TestServer;
use chrono::{DateTime, Utc};
use serde_json::Value;
use vulnscan_config::{Config, ConfigLoader, ConfigMetadata, models::sources::EnvConfig};
use vulnscan_core::{
    EngineError, ExecutionUnitSpec, InMemoryScanStore, JobLauncher, LaunchError,
    LaunchedUnit, ScanEngine, ScanError, ScanStore, ScanWorker,
};
use vulnscan_model::{
    Finding, FindingId, ImageId, NewFinding, ScanId, ScanRecord, ScanSummary,
    StatusTransition,
};
use vulnscan_server::{create_app, infra::startup::build_state};

pub fn default_config() -> Config {
    ConfigLoader::compose(None, EnvConfig::default(), ConfigMetadata::default())
        .expect("defaults compose")
        .config
}

/// Records launch requests; optionally refuses them all.
#[derive(Default)]
pub struct RecordingLauncher {
    pub launched: Mutex<Vec<ExecutionUnitSpec>>,
    pub refuse: bool,
}

impl RecordingLauncher {
    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    pub fn take(&self) -> Vec<ExecutionUnitSpec> {
        std::mem::take(&mut *self.launched.lock().unwrap())
    }
}

#[async_trait]
impl JobLauncher for RecordingLauncher {
    async fn launch(
        &self,
        spec: &ExecutionUnitSpec,
    ) -> Result<LaunchedUnit, LaunchError> {
        if self.refuse {
            return Err(LaunchError::MissingDatabaseUrl);
        }
        self.launched.lock().unwrap().push(spec.clone());
        Ok(LaunchedUnit {
            name: spec.unit_name(),
            handle: None,
        })
    }
}

/// Returns the same report for every image, or fails like a scanner that
/// exits non-zero when none is set.
pub struct FixedEngine(pub Option<Value>);

#[async_trait]
impl ScanEngine for FixedEngine {
    async fn scan(&self, _image: &str) -> Result<Value, EngineError> {
        self.0.clone().ok_or(EngineError::ExitStatus {
            code: Some(1),
            stderr: "unable to pull image".into(),
        })
    }
}

/// Every call fails as if the database were down.
pub struct UnavailableStore;

fn unavailable<T>() -> vulnscan_core::Result<T> {
    Err(ScanError::Internal("store unavailable".into()))
}

#[async_trait]
impl ScanStore for UnavailableStore {
    async fn ensure_schema(&self) -> vulnscan_core::Result<()> {
        unavailable()
    }

    async fn create_image(
        &self,
        _name: &str,
        _tag: &str,
    ) -> vulnscan_core::Result<ImageId> {
        unavailable()
    }

    async fn create_scan(
        &self,
        _image_id: ImageId,
    ) -> vulnscan_core::Result<ScanId> {
        unavailable()
    }

    async fn get_scan(
        &self,
        _scan_id: ScanId,
    ) -> vulnscan_core::Result<Option<ScanRecord>> {
        unavailable()
    }

    async fn set_status(
        &self,
        _scan_id: ScanId,
        _transition: StatusTransition,
        _results: Option<Value>,
    ) -> vulnscan_core::Result<()> {
        unavailable()
    }

    async fn insert_finding(
        &self,
        _scan_id: ScanId,
        _finding: NewFinding,
    ) -> vulnscan_core::Result<FindingId> {
        unavailable()
    }

    async fn complete_scan(
        &self,
        _scan_id: ScanId,
        _results: Value,
        _findings: Vec<NewFinding>,
    ) -> vulnscan_core::Result<usize> {
        unavailable()
    }

    async fn list_scans(&self) -> vulnscan_core::Result<Vec<ScanSummary>> {
        unavailable()
    }

    async fn list_findings(
        &self,
        _scan_id: ScanId,
    ) -> vulnscan_core::Result<Vec<Finding>> {
        unavailable()
    }

    async fn list_pending_before(
        &self,
        _cutoff: DateTime<Utc>,
    ) -> vulnscan_core::Result<Vec<ScanRecord>> {
        unavailable()
    }
}

#[allow(unused)]
pub struct TestApp {
    pub server: TestServer,
    pub store: Arc<dyn ScanStore>,
    pub launcher: Arc<RecordingLauncher>,
}

#[allow(unused)]
impl TestApp {
    pub fn new() -> Self {
        Self::with(
            Arc::new(InMemoryScanStore::new()),
            Arc::new(RecordingLauncher::default()),
        )
    }

    pub fn with(store: Arc<dyn ScanStore>, launcher: Arc<RecordingLauncher>) -> Self {
        let state = build_state(
            Arc::new(default_config()),
            Arc::clone(&store),
            launcher.clone(),
        );
        let server = TestServer::new(create_app(state)).expect("test server");
        Self {
            server,
            store,
            launcher,
        }
    }

    /// Run every launched unit against `engine`, the way the execution
    /// substrate would.
    pub async fn run_launched(&self, engine: FixedEngine) {
        let worker = ScanWorker::new(Arc::clone(&self.store), Arc::new(engine));
        for spec in self.launcher.take() {
            worker
                .run(spec.scan_id, &spec.image_name)
                .await
                .expect("worker writes a terminal status");
        }
    }
}
