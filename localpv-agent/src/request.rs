// SPDX-License-Identifier: GPL-3.0-only

//! Volume requests handed over by the orchestration layer

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use localpv_contracts::VolumeProvisioner;
use localpv_types::{VolumeRequest, VolumeStatus};

pub fn parse_request(raw: &str) -> Result<VolumeRequest> {
    serde_json::from_str(raw).context("Invalid volume request")
}

/// Read a JSON request from `path`, or stdin when `path` is `-`.
pub fn read_request(path: &Path) -> Result<VolumeRequest> {
    let raw = if path == Path::new("-") {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("Failed to read request from stdin")?;
        raw
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?
    };
    parse_request(&raw)
}

/// Provision `request` if it belongs to `node_id`.
///
/// Requests owned by another node are left `Pending` for that node's agent.
pub async fn provision_on_node(
    provisioner: &dyn VolumeProvisioner,
    node_id: &str,
    request: &VolumeRequest,
) -> VolumeStatus {
    if request.owner_node_id != node_id {
        tracing::info!(
            "Volume {} belongs to node {}, not {}",
            request.name,
            request.owner_node_id,
            node_id
        );
        return VolumeStatus::pending();
    }
    localpv_sys::provision(provisioner, request).await
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use localpv_contracts::{StorageError, StorageErrorKind};
    use localpv_types::{UsedPartition, VolumeErrorCode, VolumeState};

    use super::*;

    /// Provisioner answering every create with a fixed result
    struct Scripted {
        create: Result<(), StorageError>,
        created: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(create: Result<(), StorageError>) -> Arc<Self> {
            Arc::new(Self {
                create,
                created: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl VolumeProvisioner for Scripted {
        async fn create_volume(&self, name: &str, _: &str, _: u64) -> Result<(), StorageError> {
            self.created.lock().unwrap().push(name.to_string());
            self.create.clone()
        }

        async fn destroy_volume(&self, _: &str, _: &str) -> Result<(), StorageError> {
            Ok(())
        }

        async fn device_path(&self, name: &str, _: &str) -> Result<String, StorageError> {
            Err(StorageError::new(StorageErrorKind::NotFound, name))
        }

        async fn list_volumes(&self) -> Result<Vec<UsedPartition>, StorageError> {
            Ok(Vec::new())
        }
    }

    const REQUEST: &str = r#"{
        "name": "pvc-1",
        "disk_pattern": "HDD",
        "capacity_bytes": 10485760,
        "owner_node_id": "worker-1"
    }"#;

    #[test]
    fn parses_request_json() {
        let request = parse_request(REQUEST).unwrap();
        assert_eq!(request.name, "pvc-1");
        assert_eq!(request.capacity_bytes, 10 * 1024 * 1024);
        assert!(parse_request("{\"name\": \"pvc-1\"}").is_err());
    }

    #[tokio::test]
    async fn other_nodes_requests_stay_pending() {
        let provisioner = Scripted::new(Ok(()));
        let request = parse_request(REQUEST).unwrap();

        let status = provision_on_node(provisioner.as_ref(), "worker-2", &request).await;
        assert_eq!(status, VolumeStatus::pending());
        assert!(provisioner.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn own_requests_are_provisioned() {
        let provisioner = Scripted::new(Ok(()));
        let request = parse_request(REQUEST).unwrap();

        let status = provision_on_node(provisioner.as_ref(), "worker-1", &request).await;
        assert_eq!(status, VolumeStatus::ready());
        assert_eq!(*provisioner.created.lock().unwrap(), vec!["pvc-1"]);
    }

    #[tokio::test]
    async fn capacity_failures_are_recorded() {
        let provisioner = Scripted::new(Err(StorageError::new(
            StorageErrorKind::InsufficientCapacity,
            "requested 10 MiB, largest free extent 4 MiB",
        )));
        let request = parse_request(REQUEST).unwrap();

        let status = provision_on_node(provisioner.as_ref(), "worker-1", &request).await;
        assert_eq!(status.state, VolumeState::Failed);
        let error = status.error.unwrap();
        assert_eq!(error.code, VolumeErrorCode::InsufficientCapacity);
        assert!(error.message.contains("largest free extent 4 MiB"));
    }
}
