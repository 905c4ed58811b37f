use serde::{Deserialize, Serialize};

use crate::ids::{FindingId, ScanId};

pub const UNKNOWN_PACKAGE: &str = "Unknown";
pub const UNKNOWN_SEVERITY: &str = "UNKNOWN";
pub const NO_DESCRIPTION: &str = "No description available";
pub const NO_FIXED_VERSION: &str = "N/A";

/// A finding ready to be appended to a scan. `severity` is kept exactly as
/// the scanning engine reported it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFinding {
    pub package_name: String,
    pub severity: String,
    pub description: String,
    pub fixed_version: String,
}

impl NewFinding {
    /// Build a finding, filling absent fields with the documented defaults.
    pub fn with_defaults(
        package_name: Option<String>,
        severity: Option<String>,
        description: Option<String>,
        fixed_version: Option<String>,
    ) -> Self {
        Self {
            package_name: package_name
                .unwrap_or_else(|| UNKNOWN_PACKAGE.to_string()),
            severity: severity.unwrap_or_else(|| UNKNOWN_SEVERITY.to_string()),
            description: description
                .unwrap_or_else(|| NO_DESCRIPTION.to_string()),
            fixed_version: fixed_version
                .unwrap_or_else(|| NO_FIXED_VERSION.to_string()),
        }
    }
}

/// A stored `vulnerabilities` row. Findings are append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub id: FindingId,
    pub scan_id: ScanId,
    pub package_name: String,
    pub severity: String,
    pub description: String,
    pub fixed_version: String,
}

impl Finding {
    pub fn from_new(id: FindingId, scan_id: ScanId, new: NewFinding) -> Self {
        Self {
            id,
            scan_id,
            package_name: new.package_name,
            severity: new.severity,
            description: new.description,
            fixed_version: new.fixed_version,
        }
    }
}
