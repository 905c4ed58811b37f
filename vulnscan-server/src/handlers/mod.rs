//! HTTP request handlers organized by functionality

pub mod health;
pub mod scan;

pub use health::health_handler;
pub use scan::{
    get_scan_handler, list_findings_handler, list_scans_handler,
    submit_scan_handler,
};
