// SPDX-License-Identifier: GPL-3.0-only

//! Meta partition lookup and per-disk capacity records

use localpv_types::{Device, MetaPartition, mib_to_bytes};
use tracing::{debug, warn};

use crate::error::{Result, SysError};
use crate::extents::free_capacity;
use crate::tools::{DiskTools, PrintMode};

/// The meta partition of `disk`, or [`SysError::MetaPartitionNotFound`].
pub async fn find_meta_partition(tools: &DiskTools, disk: &str) -> Result<MetaPartition> {
    let table = tools.print_partitions(disk, PrintMode::Used).await?;
    table
        .rows
        .iter()
        .find_map(|row| MetaPartition::from_row(disk, row))
        .ok_or_else(|| SysError::MetaPartitionNotFound(disk.to_string()))
}

async fn disk_record(tools: &DiskTools, disk: &str, size_bytes: u64) -> Result<Device> {
    let meta = find_meta_partition(tools, disk).await?;
    let uuid = tools.disk_identifier(disk).await?;
    let free_mib = free_capacity(tools, disk).await?;

    Ok(Device {
        name: meta.label,
        uuid,
        size: size_bytes,
        free: mib_to_bytes(free_mib),
    })
}

/// Capacity records for every prepared disk.
///
/// Disks failing any step (no meta partition, non-GPT label, unreadable
/// table) are logged and left out.
pub async fn disk_details(tools: &DiskTools) -> Result<Vec<Device>> {
    let mut devices = Vec::new();

    for disk in tools.list_disks().await? {
        match disk_record(tools, &disk.path, disk.size_bytes).await {
            Ok(device) => devices.push(device),
            Err(SysError::MetaPartitionNotFound(_)) => {
                debug!("Disk {} is not prepared, skipping", disk.path);
            }
            Err(e) => warn!("Skipping disk {} in inventory: {}", disk.path, e),
        }
    }

    Ok(devices)
}
