// SPDX-License-Identifier: GPL-3.0-only

use async_trait::async_trait;

use localpv_types::{Device, DiskDetail};

use crate::StorageError;

#[async_trait]
pub trait DiskDiscovery: Send + Sync {
    /// Every disk and loop device on the host.
    async fn list_disks(&self) -> Result<Vec<DiskDetail>, StorageError>;

    /// Capacity records of prepared disks. Disks that cannot be resolved are
    /// left out rather than failing the whole listing.
    async fn list_disk_inventory(&self) -> Result<Vec<Device>, StorageError>;
}
