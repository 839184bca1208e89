// SPDX-License-Identifier: GPL-3.0-only

//! Canonical domain models for node-local partition volumes
//!
//! This crate defines the single source of truth for the provisioner's data
//! types. Nothing here is persisted by the engine: every value is recomputed
//! from the live partition table on each call.
//!
//! - **localpv-sys**: parses tool output into these types and acts on them
//! - **localpv-contracts**: exposes them to the orchestration layer
//! - **localpv-agent**: prints them for operators
//!
//! ## Architecture
//!
//! - `DiskDetail` → one block device from the disk listing
//! - `PartitionRow` → one raw row of a partition-table listing
//! - `UsedPartition` / `FreeExtent` / `MetaPartition` → resolved views of rows
//! - `Device` → capacity record of a prepared disk
//! - `VolumeStatus` → outcome recorded on a logical volume

pub mod common;
pub mod disk;
pub mod partition;
pub mod volume;

pub use common::{
    MIB, bytes_to_mib_ceil, bytes_to_mib_floor, bytes_to_pretty, mib_to_bytes, pretty_to_bytes,
};
pub use disk::{Device, DeviceType, DiskDetail};
pub use partition::{
    FreeExtent, META_PARTITION_NUMBER, MetaPartition, PartitionRow, PartitionSlot,
    PartitionTableType, UsedPartition, is_valid_meta_label, partition_device_path,
    partition_number_from_path,
};
pub use volume::{VolumeError, VolumeErrorCode, VolumeRequest, VolumeState, VolumeStatus};
