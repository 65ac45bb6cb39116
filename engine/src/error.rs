use std::fmt;

use cropmart_common::crop::CropValidationError;
use cropmart_common::interest::InterestStatus;
use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Crop,
    Interest,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Crop => f.write_str("crop"),
            RecordKind::Interest => f.write_str("interest"),
        }
    }
}

/// Typed failure of an engine operation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{kind} {id} not found")]
    NotFound { kind: RecordKind, id: String },

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("cannot move interest from {from} to {to}")]
    InvalidTransition {
        from: InterestStatus,
        to: InterestStatus,
    },

    #[error("storage failure: {0}")]
    Store(StoreError),
}

impl EngineError {
    pub(crate) fn crop_not_found(id: impl fmt::Display) -> Self {
        EngineError::NotFound {
            kind: RecordKind::Crop,
            id: id.to_string(),
        }
    }

    pub(crate) fn interest_not_found(id: impl fmt::Display) -> Self {
        EngineError::NotFound {
            kind: RecordKind::Interest,
            id: id.to_string(),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::CropNotFound(id) => EngineError::crop_not_found(id),
            StoreError::InterestNotFound(id) => EngineError::interest_not_found(id),
            StoreError::Contended { crop_id, attempts } => EngineError::Conflict(format!(
                "quantity of crop {crop_id} changed concurrently ({attempts} attempts)"
            )),
            other => EngineError::Store(other),
        }
    }
}

impl From<CropValidationError> for EngineError {
    fn from(err: CropValidationError) -> Self {
        EngineError::InvalidArgument(err.to_string())
    }
}
