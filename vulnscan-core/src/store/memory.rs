use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use vulnscan_model::{
    Finding, FindingId, Image, ImageId, NewFinding, ScanId, ScanRecord,
    ScanStatus, ScanSummary, StatusTransition,
};

use super::{ScanStore, reject_unexpected_results};
use crate::error::{Result, ScanError};

#[derive(Debug)]
struct StoredScan {
    image_id: ImageId,
    status: ScanStatus,
    scan_date: DateTime<Utc>,
    results: Option<Value>,
}

#[derive(Debug, Default)]
struct State {
    images: BTreeMap<ImageId, Image>,
    scans: BTreeMap<ScanId, StoredScan>,
    findings: Vec<Finding>,
    next_image: i64,
    next_scan: i64,
    next_finding: i64,
}

impl State {
    fn record(&self, id: ScanId, scan: &StoredScan) -> Result<ScanRecord> {
        let image = self.images.get(&scan.image_id).ok_or_else(|| {
            ScanError::Internal(format!(
                "scan {id} references missing image {}",
                scan.image_id
            ))
        })?;
        Ok(ScanRecord {
            id,
            image_id: scan.image_id,
            image_name: image.name.clone(),
            image_tag: image.tag.clone(),
            status: scan.status,
            scan_date: scan.scan_date,
            results: scan.results.clone(),
        })
    }

    fn require_status(
        &self,
        scan_id: ScanId,
        expected: ScanStatus,
    ) -> Result<()> {
        let scan = self
            .scans
            .get(&scan_id)
            .ok_or(ScanError::NotFound(scan_id))?;
        if scan.status != expected {
            return Err(ScanError::StatusConflict {
                scan_id,
                expected,
                actual: scan.status,
            });
        }
        Ok(())
    }

    fn push_finding(&mut self, scan_id: ScanId, new: NewFinding) -> FindingId {
        self.next_finding += 1;
        let id = FindingId(self.next_finding);
        self.findings.push(Finding::from_new(id, scan_id, new));
        id
    }
}

/// Process-local store with the same contract as the PostgreSQL store.
///
/// A single lock guards all tables, which gives every operation the
/// atomicity the PostgreSQL store gets from row locks and transactions.
#[derive(Debug, Default)]
pub struct InMemoryScanStore {
    state: Mutex<State>,
}

impl InMemoryScanStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScanStore for InMemoryScanStore {
    async fn ensure_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn create_image(&self, name: &str, tag: &str) -> Result<ImageId> {
        let mut state = self.state.lock().await;
        state.next_image += 1;
        let id = ImageId(state.next_image);
        state.images.insert(
            id,
            Image {
                id,
                name: name.to_string(),
                tag: tag.to_string(),
            },
        );
        Ok(id)
    }

    async fn create_scan(&self, image_id: ImageId) -> Result<ScanId> {
        let mut state = self.state.lock().await;
        if !state.images.contains_key(&image_id) {
            return Err(ScanError::Internal(format!(
                "image {image_id} does not exist"
            )));
        }
        state.next_scan += 1;
        let id = ScanId(state.next_scan);
        state.scans.insert(
            id,
            StoredScan {
                image_id,
                status: ScanStatus::Pending,
                scan_date: Utc::now(),
                results: None,
            },
        );
        Ok(id)
    }

    async fn get_scan(&self, scan_id: ScanId) -> Result<Option<ScanRecord>> {
        let state = self.state.lock().await;
        state
            .scans
            .get(&scan_id)
            .map(|scan| state.record(scan_id, scan))
            .transpose()
    }

    async fn set_status(
        &self,
        scan_id: ScanId,
        transition: StatusTransition,
        results: Option<Value>,
    ) -> Result<()> {
        reject_unexpected_results(transition, &results)?;

        let mut state = self.state.lock().await;
        state.require_status(scan_id, transition.from())?;
        if let Some(scan) = state.scans.get_mut(&scan_id) {
            scan.status = transition.to();
            if results.is_some() {
                scan.results = results;
            }
        }
        Ok(())
    }

    async fn insert_finding(
        &self,
        scan_id: ScanId,
        finding: NewFinding,
    ) -> Result<FindingId> {
        let mut state = self.state.lock().await;
        state.require_status(scan_id, ScanStatus::Running)?;
        Ok(state.push_finding(scan_id, finding))
    }

    async fn complete_scan(
        &self,
        scan_id: ScanId,
        results: Value,
        findings: Vec<NewFinding>,
    ) -> Result<usize> {
        let mut state = self.state.lock().await;
        state.require_status(scan_id, ScanStatus::Running)?;

        let written = findings.len();
        for finding in findings {
            state.push_finding(scan_id, finding);
        }
        if let Some(scan) = state.scans.get_mut(&scan_id) {
            scan.status = StatusTransition::COMPLETE.to();
            scan.results = Some(results);
        }
        Ok(written)
    }

    async fn list_scans(&self) -> Result<Vec<ScanSummary>> {
        let state = self.state.lock().await;
        state
            .scans
            .iter()
            .rev()
            .map(|(id, scan)| {
                state.record(*id, scan).map(|record| ScanSummary::from(&record))
            })
            .collect()
    }

    async fn list_findings(&self, scan_id: ScanId) -> Result<Vec<Finding>> {
        let state = self.state.lock().await;
        Ok(state
            .findings
            .iter()
            .filter(|finding| finding.scan_id == scan_id)
            .cloned()
            .collect())
    }

    async fn list_pending_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ScanRecord>> {
        let state = self.state.lock().await;
        state
            .scans
            .iter()
            .filter(|(_, scan)| {
                scan.status == ScanStatus::Pending && scan.scan_date <= cutoff
            })
            .map(|(id, scan)| state.record(*id, scan))
            .collect()
    }
}
