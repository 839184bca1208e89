// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageErrorKind {
    InvalidInput,
    NotFound,
    /// More than one partition claims the same volume name
    Conflict,
    InsufficientCapacity,
    Unsupported,
    Timeout,
    Unavailable,
    Internal,
}

impl StorageErrorKind {
    /// Whether the orchestration layer may retry the request on another node.
    pub fn is_reschedulable(self) -> bool {
        matches!(self, Self::InsufficientCapacity)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind:?}: {message}")]
pub struct StorageError {
    pub kind: StorageErrorKind,
    pub message: String,
}

impl StorageError {
    pub fn new(kind: StorageErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_error_roundtrips() {
        let error = StorageError::new(StorageErrorKind::Conflict, "2 partitions named pvc-1");
        let json = serde_json::to_string(&error).expect("serialize error");
        let parsed: StorageError = serde_json::from_str(&json).expect("deserialize error");
        assert_eq!(parsed, error);
    }

    #[test]
    fn only_capacity_is_reschedulable() {
        assert!(StorageErrorKind::InsufficientCapacity.is_reschedulable());
        assert!(!StorageErrorKind::Internal.is_reschedulable());
        assert!(!StorageErrorKind::NotFound.is_reschedulable());
    }
}
