// SPDX-License-Identifier: GPL-3.0-only

use thiserror::Error;

/// Error types for partition engine operations
#[derive(Error, Debug)]
pub enum SysError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("{command} exited with {status}: {output}")]
    Execution {
        command: String,
        status: String,
        /// Merged stdout and stderr of the failed process
        output: String,
    },

    #[error("{command} timed out after {seconds}s")]
    Timeout { command: String, seconds: u64 },

    #[error("{command} was cancelled")]
    Cancelled { command: String },

    #[error("Unexpected {context} output: {line:?}")]
    Parse { context: &'static str, line: String },

    #[error("Disk {disk}: wrong partition type {found:?}, only gpt is supported")]
    WrongPartitionTable { disk: String, found: String },

    #[error("Disk {disk}: wrong meta name {found:?}, expected a match for {expected:?}")]
    WrongMetaName {
        disk: String,
        expected: String,
        found: Option<String>,
    },

    #[error("Disk {0}: no meta partition")]
    MetaPartitionNotFound(String),

    #[error("Disk {0}: disk identifier not found")]
    DiskIdentifierNotFound(String),

    #[error("Insufficient capacity: requested {requested_mib} MiB, largest free extent {largest_mib} MiB")]
    InsufficientCapacity { requested_mib: u64, largest_mib: u64 },

    #[error("Ambiguous identity: {count} partitions named {name:?}")]
    AmbiguousIdentity { name: String, count: usize },

    #[error("Volume not found: {0}")]
    VolumeNotFound(String),

    #[error("Partition {name:?} not visible on {disk} after create")]
    PartitionNotVisible { disk: String, name: String },

    #[error("Invalid volume name {0:?}")]
    InvalidName(String),

    #[error("Invalid volume size {0} bytes, at least 1 MiB is required")]
    InvalidSize(u64),

    #[error("Invalid disk pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SysError {
    pub(crate) fn parse(context: &'static str, line: impl Into<String>) -> Self {
        Self::Parse {
            context,
            line: line.into(),
        }
    }

    /// Combined output of a failed command, if this error carries one
    pub fn command_output(&self) -> Option<&str> {
        match self {
            Self::Execution { output, .. } => Some(output),
            _ => None,
        }
    }

    pub fn is_insufficient_capacity(&self) -> bool {
        matches!(self, Self::InsufficientCapacity { .. })
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, SysError>;
