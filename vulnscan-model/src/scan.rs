use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{ModelError, Result},
    ids::{ImageId, ScanId},
};

/// Lifecycle status of a scan.
///
/// The status only moves forward: `Pending -> Running -> {Done, Failed}`.
/// `Done` and `Failed` are terminal and `Running` can never be skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl ScanStatus {
    pub const ALL: [ScanStatus; 4] = [
        ScanStatus::Pending,
        ScanStatus::Running,
        ScanStatus::Done,
        ScanStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Pending => "PENDING",
            ScanStatus::Running => "RUNNING",
            ScanStatus::Done => "DONE",
            ScanStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanStatus::Done | ScanStatus::Failed)
    }

    /// Whether a scan in this status may carry `results` and findings.
    pub fn has_results(&self) -> bool {
        self.is_terminal()
    }

    pub fn can_transition_to(&self, next: ScanStatus) -> bool {
        matches!(
            (self, next),
            (ScanStatus::Pending, ScanStatus::Running)
                | (ScanStatus::Running, ScanStatus::Done)
                | (ScanStatus::Running, ScanStatus::Failed)
        )
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(ScanStatus::Pending),
            "RUNNING" => Ok(ScanStatus::Running),
            "DONE" => Ok(ScanStatus::Done),
            "FAILED" => Ok(ScanStatus::Failed),
            _ => Err(ModelError::InvalidStatus(s.to_string())),
        }
    }
}

/// A validated edge of the scan state machine.
///
/// Stores apply a transition as a compare-and-set on the current status, so
/// holding a `StatusTransition` means the edge itself is legal; whether the
/// row is still in `from` is decided by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTransition {
    from: ScanStatus,
    to: ScanStatus,
}

impl StatusTransition {
    /// Worker picked the scan up.
    pub const START: StatusTransition = StatusTransition {
        from: ScanStatus::Pending,
        to: ScanStatus::Running,
    };
    /// Engine succeeded and findings were ingested.
    pub const COMPLETE: StatusTransition = StatusTransition {
        from: ScanStatus::Running,
        to: ScanStatus::Done,
    };
    /// Anything went wrong after the worker started.
    pub const FAIL: StatusTransition = StatusTransition {
        from: ScanStatus::Running,
        to: ScanStatus::Failed,
    };

    pub fn new(from: ScanStatus, to: ScanStatus) -> Result<Self> {
        if from.can_transition_to(to) {
            Ok(Self { from, to })
        } else {
            Err(ModelError::IllegalTransition { from, to })
        }
    }

    pub fn from(&self) -> ScanStatus {
        self.from
    }

    pub fn to(&self) -> ScanStatus {
        self.to
    }

    /// Only transitions into a terminal status write `results`.
    pub fn writes_results(&self) -> bool {
        self.to.has_results()
    }
}

impl fmt::Display for StatusTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// Full scan row joined with its image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    pub id: ScanId,
    pub image_id: ImageId,
    pub image_name: String,
    pub image_tag: String,
    pub status: ScanStatus,
    pub scan_date: DateTime<Utc>,
    pub results: Option<Value>,
}

impl ScanRecord {
    /// Image reference to hand to the scanning engine, rebuilt from the stored
    /// name and tag.
    pub fn image_reference(&self) -> String {
        if self.image_tag == crate::image::DEFAULT_TAG {
            self.image_name.clone()
        } else {
            format!("{}:{}", self.image_name, self.image_tag)
        }
    }
}

/// Row shape of the scan listing, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub id: ScanId,
    pub image_name: String,
    pub status: ScanStatus,
    pub scan_date: DateTime<Utc>,
}

impl From<&ScanRecord> for ScanSummary {
    fn from(record: &ScanRecord) -> Self {
        Self {
            id: record.id,
            image_name: record.image_name.clone(),
            status: record.status,
            scan_date: record.scan_date,
        }
    }
}
