//! Scan lifecycle orchestration.
//!
//! A scan moves `PENDING -> RUNNING -> {DONE, FAILED}`. The [`Dispatcher`]
//! records the PENDING scan and launches an execution unit through a
//! [`JobLauncher`]; the unit runs a [`ScanWorker`] which drives the scan to a
//! terminal status through the [`ScanStore`]. The [`Reconciler`] relaunches
//! units for scans that never left PENDING.
#![allow(missing_docs)]

pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod launcher;
pub mod reconciler;
pub mod report;
pub mod store;
pub mod worker;

pub use dispatcher::{Dispatcher, SubmittedScan};
pub use engine::{ScanEngine, TrivyEngine};
pub use error::{EngineError, LaunchError, ReportError, Result, ScanError};
pub use launcher::{ExecutionUnitSpec, JobLauncher, LaunchedUnit};
pub use reconciler::{Reconciler, SweepSummary};
pub use report::parse_findings;
pub use store::{InMemoryScanStore, PostgresScanStore, ScanStore};
pub use worker::{ScanWorker, WorkerOutcome};

/// Embedded schema migrations for the scan store.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
