//! Request and response bodies of the HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    finding::Finding,
    ids::ScanId,
    scan::{ScanRecord, ScanStatus, ScanSummary},
};

pub const QUEUED: &str = "queued";
pub const ERROR: &str = "error";
pub const API_RUNNING: &str = "API running";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitScanRequest {
    pub image_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitScanResponse {
    pub status: String,
    pub scan_id: ScanId,
    pub job_triggered: bool,
}

impl SubmitScanResponse {
    pub fn queued(scan_id: ScanId) -> Self {
        Self {
            status: QUEUED.to_string(),
            scan_id,
            job_triggered: true,
        }
    }
}

/// Body of every error response: `{"status":"error","detail":...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: String,
    pub detail: String,
}

impl ErrorBody {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            status: ERROR.to_string(),
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummaryView {
    pub id: ScanId,
    pub image_name: String,
    pub status: ScanStatus,
    pub scan_date: DateTime<Utc>,
}

impl From<ScanSummary> for ScanSummaryView {
    fn from(summary: ScanSummary) -> Self {
        Self {
            id: summary.id,
            image_name: summary.image_name,
            status: summary.status,
            scan_date: summary.scan_date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingView {
    pub package_name: String,
    pub severity: String,
    pub description: String,
    pub fixed_version: String,
}

impl From<Finding> for FindingView {
    fn from(finding: Finding) -> Self {
        Self {
            package_name: finding.package_name,
            severity: finding.severity,
            description: finding.description,
            fixed_version: finding.fixed_version,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanDetailView {
    pub id: ScanId,
    pub image_name: String,
    pub image_tag: String,
    pub status: ScanStatus,
    pub scan_date: DateTime<Utc>,
    pub results: Option<Value>,
}

impl From<ScanRecord> for ScanDetailView {
    fn from(record: ScanRecord) -> Self {
        Self {
            id: record.id,
            image_name: record.image_name,
            image_tag: record.image_tag,
            status: record.status,
            scan_date: record.scan_date,
            results: record.results,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: API_RUNNING.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn queued_response_matches_wire_shape() {
        let body = serde_json::to_value(SubmitScanResponse::queued(ScanId(3)))
            .unwrap();
        assert_eq!(
            body,
            json!({"status": "queued", "scan_id": 3, "job_triggered": true})
        );
    }

    #[test]
    fn error_body_carries_detail() {
        let body = serde_json::to_value(ErrorBody::new("boom")).unwrap();
        assert_eq!(body, json!({"status": "error", "detail": "boom"}));
    }

    #[test]
    fn summary_scan_date_is_a_string() {
        let view = ScanSummaryView {
            id: ScanId(1),
            image_name: "nginx".into(),
            status: ScanStatus::Done,
            scan_date: DateTime::<Utc>::from_timestamp(0, 0).unwrap(),
        };
        let body = serde_json::to_value(view).unwrap();
        assert_eq!(body["status"], "DONE");
        assert!(body["scan_date"].is_string());
    }
}
