//! Core data model definitions shared across vulnscan crates.
#![allow(missing_docs)]

pub mod api;
pub mod error;
pub mod finding;
pub mod ids;
pub mod image;
pub mod scan;

pub use api::{
    ErrorBody, FindingView, HealthResponse, ScanDetailView, ScanSummaryView,
    SubmitScanRequest, SubmitScanResponse,
};
pub use error::{ModelError, Result as ModelResult};
pub use finding::{Finding, NewFinding};
pub use ids::{FindingId, ImageId, ScanId};
pub use image::{DEFAULT_TAG, Image, ImageReference, TagPolicy};
pub use scan::{ScanRecord, ScanStatus, ScanSummary, StatusTransition};
