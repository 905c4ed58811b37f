//! Durable scan state: images, scans and findings.
//!
//! Status changes go through [`StatusTransition`] and are applied as a
//! compare-and-set on the current status, so a scan can only move along the
//! legal edges of the state machine no matter who calls the store.

mod memory;
mod postgres;

pub use memory::InMemoryScanStore;
pub use postgres::PostgresScanStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use vulnscan_model::{
    Finding, FindingId, ImageId, NewFinding, ScanId, ScanRecord, ScanSummary,
    StatusTransition,
};

use crate::error::Result;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScanStore: Send + Sync {
    /// Make sure every table the worker writes to exists. Idempotent.
    async fn ensure_schema(&self) -> Result<()>;

    /// Record an image reference. Duplicate `(name, tag)` pairs are legal.
    async fn create_image(&self, name: &str, tag: &str) -> Result<ImageId>;

    /// Create a scan for `image_id` in PENDING.
    async fn create_scan(&self, image_id: ImageId) -> Result<ScanId>;

    async fn get_scan(&self, scan_id: ScanId) -> Result<Option<ScanRecord>>;

    /// Apply `transition` if the scan is currently in `transition.from()`.
    ///
    /// `results` is written only for transitions into a terminal status;
    /// passing it for any other transition is rejected.
    async fn set_status(
        &self,
        scan_id: ScanId,
        transition: StatusTransition,
        results: Option<Value>,
    ) -> Result<()>;

    /// Append one finding. Only succeeds while the scan is RUNNING.
    async fn insert_finding(
        &self,
        scan_id: ScanId,
        finding: NewFinding,
    ) -> Result<FindingId>;

    /// Insert every finding and move the scan RUNNING -> DONE with `results`,
    /// all or nothing. Returns the number of findings written.
    async fn complete_scan(
        &self,
        scan_id: ScanId,
        results: Value,
        findings: Vec<NewFinding>,
    ) -> Result<usize>;

    /// All scans joined with their image name, newest first.
    async fn list_scans(&self) -> Result<Vec<ScanSummary>>;

    /// Findings of one scan in insertion order. Unknown scans yield none.
    async fn list_findings(&self, scan_id: ScanId) -> Result<Vec<Finding>>;

    /// Scans still PENDING that were created at or before `cutoff`, oldest
    /// first.
    async fn list_pending_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ScanRecord>>;
}

fn reject_unexpected_results(
    transition: StatusTransition,
    results: &Option<Value>,
) -> Result<()> {
    if results.is_some() && !transition.writes_results() {
        return Err(crate::error::ScanError::Internal(format!(
            "transition {transition} cannot carry results"
        )));
    }
    Ok(())
}
