//! Logical volume request and status models
//!
//! The resource store owns these records; the engine only reads the request
//! and reports the outcome of a create as a status.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A request to provision one volume on this node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeRequest {
    /// Volume name; becomes the partition label
    pub name: String,

    /// Pattern matched against the meta partition label of candidate disks
    pub disk_pattern: String,

    /// Requested capacity in bytes (rounded down to whole MiB)
    pub capacity_bytes: u64,

    /// Node that owns the volume
    pub owner_node_id: String,
}

/// Provisioning state of a volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolumeState {
    Pending,
    Ready,
    Failed,
}

impl fmt::Display for VolumeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::Ready => "Ready",
            Self::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// Class of a provisioning failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolumeErrorCode {
    /// System internal error
    Internal,

    /// No disk has a free extent large enough for the request
    InsufficientCapacity,
}

/// Error recorded on a failed volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeError {
    pub code: VolumeErrorCode,
    pub message: String,
}

/// Status recorded on the volume after a reconcile step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeStatus {
    pub state: VolumeState,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<VolumeError>,
}

impl VolumeStatus {
    pub fn pending() -> Self {
        Self {
            state: VolumeState::Pending,
            error: None,
        }
    }

    pub fn ready() -> Self {
        Self {
            state: VolumeState::Ready,
            error: None,
        }
    }

    pub fn failed(code: VolumeErrorCode, message: impl Into<String>) -> Self {
        Self {
            state: VolumeState::Failed,
            error: Some(VolumeError {
                code,
                message: message.into(),
            }),
        }
    }

    /// Map a create outcome to the status to record.
    ///
    /// Capacity exhaustion is recorded as `InsufficientCapacity` so the
    /// orchestration layer can reschedule the volume elsewhere; every other
    /// error is a hard `Internal` failure.
    pub fn from_create_result<E: fmt::Display>(
        result: &Result<(), E>,
        insufficient_capacity: impl FnOnce(&E) -> bool,
    ) -> Self {
        match result {
            Ok(()) => Self::ready(),
            Err(err) if insufficient_capacity(err) => {
                Self::failed(VolumeErrorCode::InsufficientCapacity, err.to_string())
            }
            Err(err) => Self::failed(VolumeErrorCode::Internal, err.to_string()),
        }
    }
}
