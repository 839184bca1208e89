// SPDX-License-Identifier: GPL-3.0-only

//! Free extent discovery

use localpv_types::FreeExtent;
use tracing::{debug, warn};

use crate::error::Result;
use crate::inventory::{DiskPattern, family_partitions};
use crate::tools::{DiskTools, PrintMode};

/// MiB aligned free extents on one prepared disk, in table order
pub async fn disk_free_extents(
    tools: &DiskTools,
    disk: &str,
    pattern: &DiskPattern,
) -> Result<Vec<FreeExtent>> {
    let rows = family_partitions(tools, disk, PrintMode::WithFree, pattern).await?;
    Ok(rows
        .iter()
        .filter_map(|row| FreeExtent::from_row(disk, row))
        .collect())
}

/// Free extents on every prepared disk whose meta label matches `pattern`.
///
/// Disks that cannot be listed, are not prepared, or whose meta label does
/// not match are skipped.
pub async fn list_free_extents(tools: &DiskTools, pattern: &DiskPattern) -> Result<Vec<FreeExtent>> {
    let mut extents = Vec::new();

    for disk in tools.list_disks().await? {
        match disk_free_extents(tools, &disk.path, pattern).await {
            Ok(found) => extents.extend(found),
            Err(e) => warn!("Skipping disk {} while listing free space: {}", disk.path, e),
        }
    }

    debug!(
        "Found {} free extents for pattern {:?}",
        extents.len(),
        pattern.as_str()
    );
    Ok(extents)
}

/// Size in MiB of the largest single free extent on `disk`
pub async fn free_capacity(tools: &DiskTools, disk: &str) -> Result<u64> {
    let extents = disk_free_extents(tools, disk, &DiskPattern::any()).await?;
    Ok(extents.iter().map(|e| e.size_mib).max().unwrap_or(0))
}
