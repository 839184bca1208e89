//! Partition information - flat representation
//!
//! `PartitionRow` is one parsed row of a `parted -m` listing. The other types
//! are resolved views of those rows: an occupied partition bound to a volume,
//! an unallocated MiB-aligned extent, or a disk's identity (meta) partition.

use serde::{Deserialize, Serialize};

use crate::common::{bytes_to_mib_ceil, bytes_to_mib_floor};

/// Partition number reserved for the meta partition on every prepared disk.
pub const META_PARTITION_NUMBER: u32 = 1;

/// Partition table type as reported by parted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionTableType {
    /// GPT (GUID Partition Table)
    Gpt,

    /// MBR/DOS (Master Boot Record)
    Msdos,

    /// Whole-device filesystem without a partition table
    Loop,
}

impl PartitionTableType {
    /// Parse from parted (or fdisk) string format
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "gpt" => Some(Self::Gpt),
            "msdos" | "dos" => Some(Self::Msdos),
            "loop" => Some(Self::Loop),
            _ => None,
        }
    }
}

/// What a partition-table row describes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionSlot {
    /// Unallocated space; carries no identity
    Free,

    /// An allocated partition
    Used {
        /// Filesystem type; empty if none detected
        fs_type: String,

        /// GPT partition name (label)
        name: String,

        /// Comma separated flag list; empty if none
        flags: String,
    },
}

/// One row of a partition-table listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionRow {
    /// Partition number (1-based)
    pub number: u32,

    /// First byte of the slot
    pub begin_bytes: u64,

    /// Last byte of the slot (inclusive)
    pub end_bytes: u64,

    /// Size in bytes as reported by the tool
    pub size_bytes: u64,

    pub slot: PartitionSlot,
}

impl PartitionRow {
    pub fn is_free(&self) -> bool {
        matches!(self.slot, PartitionSlot::Free)
    }

    /// GPT name of an allocated partition, `None` for free slots
    pub fn name(&self) -> Option<&str> {
        match &self.slot {
            PartitionSlot::Free => None,
            PartitionSlot::Used { name, .. } => Some(name.as_str()),
        }
    }
}

/// An occupied partition bound to a logical volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsedPartition {
    /// Owning disk (e.g., "sdc")
    pub disk_path: String,

    /// Partition number on that disk
    pub number: u32,

    /// Partition label, which identifies the volume
    pub name: String,

    /// Partition device node (e.g., "/dev/sdc2")
    pub device_path: String,

    /// Size in bytes
    pub size_bytes: u64,
}

impl UsedPartition {
    /// Resolve an allocated row on `disk_path`. Free slots yield `None`.
    pub fn from_row(disk_path: &str, row: &PartitionRow) -> Option<Self> {
        let name = row.name()?;
        Some(Self {
            disk_path: disk_path.to_string(),
            number: row.number,
            name: name.to_string(),
            device_path: partition_device_path(disk_path, row.number),
            size_bytes: row.size_bytes,
        })
    }
}

/// An unallocated, MiB-aligned candidate region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeExtent {
    pub disk_path: String,
    pub start_mib: u64,
    pub end_mib: u64,
    pub size_mib: u64,
}

impl FreeExtent {
    /// Convert a free slot to whole MiB.
    ///
    /// The start is rounded up and the end down. The size is measured on the
    /// exclusive end (`end_bytes + 1`), since parted reports an inclusive last
    /// byte, and collapses to zero when rounding leaves no whole MiB.
    pub fn from_row(disk_path: &str, row: &PartitionRow) -> Option<Self> {
        if !row.is_free() {
            return None;
        }

        let start_mib = bytes_to_mib_ceil(row.begin_bytes);
        let end_mib = bytes_to_mib_floor(row.end_bytes);
        let size_mib =
            bytes_to_mib_floor(row.end_bytes.saturating_add(1)).saturating_sub(start_mib);

        Some(Self {
            disk_path: disk_path.to_string(),
            start_mib,
            end_mib,
            size_mib,
        })
    }
}

/// The identity partition of a prepared disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaPartition {
    pub disk_path: String,

    /// Free-form label recorded when the disk was prepared
    pub label: String,
}

impl MetaPartition {
    /// A meta partition is partition 1 with no filesystem, no flags and a
    /// label made only of `[A-Za-z0-9_.-]`.
    pub fn from_row(disk_path: &str, row: &PartitionRow) -> Option<Self> {
        if row.number != META_PARTITION_NUMBER {
            return None;
        }

        match &row.slot {
            PartitionSlot::Used {
                fs_type,
                name,
                flags,
            } if fs_type.is_empty() && flags.is_empty() && is_valid_meta_label(name) => {
                Some(Self {
                    disk_path: disk_path.to_string(),
                    label: name.clone(),
                })
            }
            _ => None,
        }
    }
}

/// Check a label against `[A-Za-z0-9_.-]+`
pub fn is_valid_meta_label(label: &str) -> bool {
    !label.is_empty()
        && label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// Device node of partition `number` on `disk_path`.
///
/// Disks whose name ends in a digit (`nvme0n1`, `loop0`) take a `p`
/// separator; the rest (`sda`) do not.
pub fn partition_device_path(disk_path: &str, number: u32) -> String {
    let separator = if disk_path.ends_with(|c: char| c.is_ascii_digit()) {
        "p"
    } else {
        ""
    };
    format!("/dev/{disk_path}{separator}{number}")
}

/// Recover the partition number from a device node produced by
/// [`partition_device_path`] for the same disk.
pub fn partition_number_from_path(disk_path: &str, device_path: &str) -> Option<u32> {
    let rest = device_path
        .strip_prefix("/dev/")
        .unwrap_or(device_path)
        .strip_prefix(disk_path)?;

    let digits = if disk_path.ends_with(|c: char| c.is_ascii_digit()) {
        rest.strip_prefix('p')?
    } else {
        rest
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
