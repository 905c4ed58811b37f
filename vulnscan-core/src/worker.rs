use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{error, info, warn};
use vulnscan_model::{ScanId, StatusTransition};

use crate::{
    engine::ScanEngine,
    error::{EngineError, Result, ScanError},
    report::parse_findings,
    store::ScanStore,
};

/// Headline written into `results.error` when the scanner itself failed.
pub const PROCESS_FAILURE: &str = "Scan process failed";

/// Terminal status the worker wrote for its scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    Done { findings: usize },
    Failed { reason: String },
}

impl WorkerOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, WorkerOutcome::Done { .. })
    }
}

/// Runs exactly one scan inside an execution unit.
#[derive(Clone)]
pub struct ScanWorker {
    store: Arc<dyn ScanStore>,
    engine: Arc<dyn ScanEngine>,
}

impl ScanWorker {
    pub fn new(store: Arc<dyn ScanStore>, engine: Arc<dyn ScanEngine>) -> Self {
        Self { store, engine }
    }

    /// Drive `scan_id` from PENDING to DONE or FAILED.
    ///
    /// Returns `Err` only when no terminal status could be written: the store
    /// is unreachable, or the scan was not PENDING to begin with (another unit
    /// owns it or it already finished).
    pub async fn run(&self, scan_id: ScanId, image: &str) -> Result<WorkerOutcome> {
        self.store.ensure_schema().await?;
        self.store
            .set_status(scan_id, StatusTransition::START, None)
            .await?;
        info!(scan_id = %scan_id, image, "scan started");

        let failure = match self.scan_and_record(scan_id, image).await {
            Ok(findings) => {
                info!(scan_id = %scan_id, findings, "scan completed");
                return Ok(WorkerOutcome::Done { findings });
            }
            Err(failure) => failure,
        };

        let reason = failure.to_string();
        warn!(scan_id = %scan_id, image, error = %reason, "scan failed");

        if let Err(err) = self
            .store
            .set_status(scan_id, StatusTransition::FAIL, Some(failure.payload()))
            .await
        {
            error!(scan_id = %scan_id, error = %err, "could not record scan failure");
            return Err(err);
        }

        Ok(WorkerOutcome::Failed { reason })
    }

    async fn scan_and_record(
        &self,
        scan_id: ScanId,
        image: &str,
    ) -> std::result::Result<usize, Failure> {
        let report = self.engine.scan(image).await.map_err(Failure::Engine)?;
        let findings = parse_findings(&report)
            .map_err(|err| Failure::Other(err.to_string()))?;
        self.store
            .complete_scan(scan_id, report, findings)
            .await
            .map_err(Failure::Store)
    }
}

#[derive(Debug)]
enum Failure {
    Engine(EngineError),
    Store(ScanError),
    Other(String),
}

impl Failure {
    fn payload(&self) -> Value {
        match self {
            Failure::Engine(err) if err.is_process_failure() => json!({
                "error": PROCESS_FAILURE,
                "details": err.to_string(),
            }),
            other => json!({ "error": other.to_string() }),
        }
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Failure::Engine(err) => err.fmt(f),
            Failure::Store(err) => err.fmt(f),
            Failure::Other(msg) => f.write_str(msg),
        }
    }
}
