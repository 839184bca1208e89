// SPDX-License-Identifier: GPL-3.0-only

use async_trait::async_trait;

use localpv_types::UsedPartition;

use crate::StorageError;

/// Volume lifecycle as seen by the orchestration layer.
///
/// `disk_pattern` is matched against the meta partition label of each disk and
/// restricts every operation to the disks of that family.
#[async_trait]
pub trait VolumeProvisioner: Send + Sync {
    /// Create a partition-backed volume of `size_bytes`.
    ///
    /// Succeeds without changes when the volume already exists. Fails with
    /// [`StorageErrorKind::InsufficientCapacity`](crate::StorageErrorKind) when
    /// no free extent is large enough.
    async fn create_volume(
        &self,
        name: &str,
        disk_pattern: &str,
        size_bytes: u64,
    ) -> Result<(), StorageError>;

    /// Remove a volume. Succeeds when it is already gone.
    async fn destroy_volume(&self, name: &str, disk_pattern: &str) -> Result<(), StorageError>;

    /// Device node backing a volume.
    async fn device_path(&self, name: &str, disk_pattern: &str) -> Result<String, StorageError>;

    /// Every volume partition on the host.
    async fn list_volumes(&self) -> Result<Vec<UsedPartition>, StorageError>;
}
