//! Disk data models
//!
//! Disks are never cached: every inventory call re-reads the kernel's view of
//! the block devices, so these types carry no ownership or lifecycle state.

use serde::{Deserialize, Serialize};

/// Kind of block device kept from the `lsblk` listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    /// A physical disk
    Disk,

    /// A loop device (used for test fixtures)
    Loop,
}

impl DeviceType {
    /// Parse the `TYPE` column of `lsblk`. Partitions, ROMs and anything else
    /// return `None` and are dropped from the inventory.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "disk" => Some(Self::Disk),
            "loop" => Some(Self::Loop),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disk => "disk",
            Self::Loop => "loop",
        }
    }
}

/// One physical or loop block device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskDetail {
    /// Device node name without `/dev/` (e.g., "sdb", "nvme0n1")
    pub path: String,

    /// Total capacity in bytes
    pub size_bytes: u64,

    /// Disk or loop device
    pub device_type: DeviceType,
}

impl DiskDetail {
    /// Absolute device node (e.g., "/dev/sdb")
    pub fn dev_node(&self) -> String {
        format!("/dev/{}", self.path)
    }
}

/// Capacity record for a prepared disk, as reported to the resource store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Label of the disk's meta partition
    pub name: String,

    /// GPT disk identifier
    pub uuid: String,

    /// Total size in bytes
    pub size: u64,

    /// Largest single allocatable free extent in bytes
    pub free: u64,
}
