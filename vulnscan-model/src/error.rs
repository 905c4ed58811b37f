use std::fmt::{self, Display};

use crate::scan::ScanStatus;

/// Errors produced by model constructors and validation routines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    InvalidId(String),
    InvalidStatus(String),
    InvalidImageReference(String),
    IllegalTransition { from: ScanStatus, to: ScanStatus },
}

impl Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::InvalidId(raw) => write!(f, "invalid id: {raw}"),
            ModelError::InvalidStatus(raw) => {
                write!(f, "unknown scan status: {raw}")
            }
            ModelError::InvalidImageReference(msg) => {
                write!(f, "invalid image reference: {msg}")
            }
            ModelError::IllegalTransition { from, to } => {
                write!(f, "illegal scan transition {from} -> {to}")
            }
        }
    }
}

impl std::error::Error for ModelError {}

pub type Result<T> = std::result::Result<T, ModelError>;
