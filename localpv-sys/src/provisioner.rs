// SPDX-License-Identifier: GPL-3.0-only

//! Contract implementations over [`PartitionManager`]

use async_trait::async_trait;
use localpv_contracts::{DiskDiscovery, StorageError, StorageErrorKind, VolumeProvisioner};
use localpv_types::{Device, DiskDetail, UsedPartition, VolumeRequest, VolumeStatus};
use tracing::info;

use crate::error::SysError;
use crate::manager::PartitionManager;

impl From<SysError> for StorageError {
    fn from(err: SysError) -> Self {
        let kind = match &err {
            SysError::InsufficientCapacity { .. } => StorageErrorKind::InsufficientCapacity,
            SysError::VolumeNotFound(_) | SysError::MetaPartitionNotFound(_) => {
                StorageErrorKind::NotFound
            }
            SysError::AmbiguousIdentity { .. } => StorageErrorKind::Conflict,
            SysError::InvalidName(_)
            | SysError::InvalidSize(_)
            | SysError::InvalidPattern(_)
            | SysError::Config(_) => StorageErrorKind::InvalidInput,
            SysError::WrongPartitionTable { .. } | SysError::WrongMetaName { .. } => {
                StorageErrorKind::Unsupported
            }
            SysError::ToolNotFound(_) | SysError::Cancelled { .. } => StorageErrorKind::Unavailable,
            SysError::Timeout { .. } => StorageErrorKind::Timeout,
            SysError::Io(_)
            | SysError::Execution { .. }
            | SysError::Parse { .. }
            | SysError::DiskIdentifierNotFound(_)
            | SysError::PartitionNotVisible { .. } => StorageErrorKind::Internal,
        };
        StorageError::new(kind, err.to_string())
    }
}

#[async_trait]
impl VolumeProvisioner for PartitionManager {
    async fn create_volume(
        &self,
        name: &str,
        disk_pattern: &str,
        size_bytes: u64,
    ) -> Result<(), StorageError> {
        Ok(PartitionManager::create_volume(self, name, disk_pattern, size_bytes).await?)
    }

    async fn destroy_volume(&self, name: &str, disk_pattern: &str) -> Result<(), StorageError> {
        Ok(PartitionManager::destroy_volume(self, name, disk_pattern).await?)
    }

    async fn device_path(&self, name: &str, disk_pattern: &str) -> Result<String, StorageError> {
        Ok(self.volume_device_path(name, disk_pattern).await?)
    }

    async fn list_volumes(&self) -> Result<Vec<UsedPartition>, StorageError> {
        Ok(PartitionManager::list_volumes(self).await?)
    }
}

#[async_trait]
impl DiskDiscovery for PartitionManager {
    async fn list_disks(&self) -> Result<Vec<DiskDetail>, StorageError> {
        Ok(PartitionManager::list_disks(self).await?)
    }

    async fn list_disk_inventory(&self) -> Result<Vec<Device>, StorageError> {
        Ok(self.disk_inventory().await?)
    }
}

/// Create the volume described by `request` and report the status to record.
pub async fn provision(provisioner: &dyn VolumeProvisioner, request: &VolumeRequest) -> VolumeStatus {
    let result = provisioner
        .create_volume(&request.name, &request.disk_pattern, request.capacity_bytes)
        .await;
    let status = VolumeStatus::from_create_result(&result, |e| e.kind.is_reschedulable());
    info!("Volume {} is {}", request.name, status.state);
    status
}
