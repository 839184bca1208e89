// SPDX-License-Identifier: GPL-3.0-only

//! Partition lifecycle: create, destroy and resolve volume partitions
//!
//! A volume is a GPT partition whose label is derived from the volume name
//! (see [`Config::partition_label`]). Nothing is stored besides the partition
//! table itself, so every call re-reads the disks before acting.
//!
//! Create and destroy run under one process-wide lock. The tools serialise
//! table writes themselves, but "find a free extent, then create" is only
//! atomic if no other create runs in between.
//!
//! A partition whose table could not be read back after `mkpart` is recorded
//! under the lock. The next create of that volume wipes it before reporting
//! success instead of taking it for a finished volume.

use std::collections::HashMap;
use std::sync::Arc;

use localpv_types::{Device, DiskDetail, META_PARTITION_NUMBER, UsedPartition, bytes_to_mib_floor};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::allocator::find_best_extent;
use crate::config::Config;
use crate::error::{Result, SysError};
use crate::inventory::{DiskPattern, find_used_partitions, list_used_partitions};
use crate::meta::disk_details;
use crate::runner::{BoxedRunner, HostRunner};
use crate::tools::{DiskTools, PrintMode};

pub struct PartitionManager {
    tools: DiskTools,
    config: Arc<Config>,
    /// Label to disk of partitions created but never wiped
    unfinished: Mutex<HashMap<String, String>>,
}

impl PartitionManager {
    pub fn new(runner: BoxedRunner, config: Arc<Config>) -> Self {
        Self {
            tools: DiskTools::new(runner, config.tools.clone()),
            config,
            unfinished: Mutex::new(HashMap::new()),
        }
    }

    /// Manager running the real tools, killed when `cancel` fires
    pub fn on_host(config: Arc<Config>, cancel: CancellationToken) -> Self {
        let runner = HostRunner::new(config.command_timeout()).with_cancellation(cancel);
        Self::new(Arc::new(runner), config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tools(&self) -> &DiskTools {
        &self.tools
    }

    pub async fn list_disks(&self) -> Result<Vec<DiskDetail>> {
        self.tools.list_disks().await
    }

    /// Capacity records of every prepared disk
    pub async fn disk_inventory(&self) -> Result<Vec<Device>> {
        disk_details(&self.tools).await
    }

    /// Every volume partition on prepared disks
    pub async fn list_volumes(&self) -> Result<Vec<UsedPartition>> {
        list_used_partitions(&self.tools).await
    }

    /// Create the partition backing volume `name` on a disk matching
    /// `disk_pattern`.
    ///
    /// The size is rounded down to whole MiB. If a partition with the volume's
    /// label already exists on a matching disk this returns `Ok` without
    /// touching anything, whatever its size. The exception is a partition this
    /// manager created but could not read back: it is wiped first.
    pub async fn create_volume(&self, name: &str, disk_pattern: &str, size_bytes: u64) -> Result<()> {
        let label = self.config.partition_label(name)?;
        let pattern = DiskPattern::new(disk_pattern)?;
        let size_mib = bytes_to_mib_floor(size_bytes);
        if size_mib == 0 {
            return Err(SysError::InvalidSize(size_bytes));
        }

        let mut unfinished = self.unfinished.lock().await;

        let existing = find_used_partitions(&self.tools, &label, &pattern).await?;
        if let Some(disk) = unfinished.get(&label).cloned() {
            if let Some(found) = existing.iter().find(|p| p.disk_path == disk) {
                info!(
                    "Finishing interrupted create of volume {} at {}",
                    name, found.device_path
                );
                self.wipe_new_partition(found).await?;
                unfinished.remove(&label);
                info!("Created volume {} at {}", name, found.device_path);
                return Ok(());
            }
            unfinished.remove(&label);
        }
        if let Some(found) = existing.first() {
            info!(
                "Volume {} already exists at {}, nothing to create",
                name, found.device_path
            );
            return Ok(());
        }

        let extent = find_best_extent(&self.tools, &pattern, size_mib).await?;
        self.tools
            .create_partition(
                &extent.disk_path,
                &label,
                extent.start_mib,
                extent.start_mib + size_mib,
            )
            .await?;

        let created = match self.created_partition(&extent.disk_path, &label).await {
            Ok(created) => created,
            Err(first_err) => {
                warn!(
                    "Reading back {} after creating {} failed, retrying: {}",
                    extent.disk_path, label, first_err
                );
                match self.created_partition(&extent.disk_path, &label).await {
                    Ok(created) => created,
                    Err(err) => {
                        error!(
                            "New partition {} on {} could not be read back, it stays unfinished: {}",
                            label, extent.disk_path, err
                        );
                        unfinished.insert(label, extent.disk_path);
                        return Err(err);
                    }
                }
            }
        };

        self.wipe_new_partition(&created).await?;

        info!(
            "Created volume {} at {} ({} MiB)",
            name, created.device_path, size_mib
        );
        Ok(())
    }

    /// Wipe a partition created for a volume, deleting it again on failure.
    async fn wipe_new_partition(&self, created: &UsedPartition) -> Result<()> {
        if let Err(wipe_err) = self.tools.wipe_signatures(&created.device_path).await {
            error!(
                "Wiping new partition {} failed, removing it: {}",
                created.device_path, wipe_err
            );
            if let Err(rm_err) = self
                .tools
                .delete_partition(&created.disk_path, created.number)
                .await
            {
                error!(
                    "Rollback of {} failed, partition left behind: {}",
                    created.device_path, rm_err
                );
            }
            return Err(wipe_err);
        }
        Ok(())
    }

    /// The partition just created on `disk`, read back from the table
    async fn created_partition(&self, disk: &str, label: &str) -> Result<UsedPartition> {
        let table = self.tools.print_partitions(disk, PrintMode::Used).await?;
        table
            .rows
            .iter()
            .filter(|row| row.number != META_PARTITION_NUMBER && row.name() == Some(label))
            .find_map(|row| UsedPartition::from_row(disk, row))
            .ok_or_else(|| SysError::PartitionNotVisible {
                disk: disk.to_string(),
                name: label.to_string(),
            })
    }

    /// Wipe and delete the partition backing volume `name`.
    ///
    /// A volume that does not exist is already destroyed.
    pub async fn destroy_volume(&self, name: &str, disk_pattern: &str) -> Result<()> {
        let label = self.config.partition_label(name)?;
        let pattern = DiskPattern::new(disk_pattern)?;

        let mut unfinished = self.unfinished.lock().await;

        let found = find_used_partitions(&self.tools, &label, &pattern).await?;
        let part = match found.as_slice() {
            [] => {
                info!("Volume {} not found, nothing to destroy", name);
                unfinished.remove(&label);
                return Ok(());
            }
            [part] => part,
            _ => {
                return Err(SysError::AmbiguousIdentity {
                    name: label,
                    count: found.len(),
                });
            }
        };

        self.tools.wipe_signatures(&part.device_path).await?;
        self.tools.delete_partition(&part.disk_path, part.number).await?;
        unfinished.remove(&label);

        info!("Destroyed volume {} at {}", name, part.device_path);
        Ok(())
    }

    /// The single partition backing volume `name`
    pub async fn find_volume(&self, name: &str, disk_pattern: &str) -> Result<UsedPartition> {
        let label = self.config.partition_label(name)?;
        let pattern = DiskPattern::new(disk_pattern)?;

        let mut found = find_used_partitions(&self.tools, &label, &pattern).await?;
        match found.len() {
            0 => Err(SysError::VolumeNotFound(name.to_string())),
            1 => Ok(found.remove(0)),
            count => Err(SysError::AmbiguousIdentity { name: label, count }),
        }
    }

    /// Device node of volume `name`, e.g. `/dev/sdb3`
    pub async fn volume_device_path(&self, name: &str, disk_pattern: &str) -> Result<String> {
        let part = self.find_volume(name, disk_pattern).await?;
        debug!("Volume {} resolves to {}", name, part.device_path);
        Ok(part.device_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{Faults, Host, SimDisk};
    use localpv_types::MIB;

    fn manager(host: &Host) -> PartitionManager {
        PartitionManager::new(host.runner(), Arc::new(Config::default()))
    }

    fn position(calls: &[String], needle: &str) -> Option<usize> {
        calls.iter().position(|c| c.contains(needle))
    }

    #[tokio::test]
    async fn creates_and_wipes_a_new_partition() {
        let host = Host::standard();
        let manager = manager(&host);

        manager.create_volume("pvc-new", "HDD", 100 * MIB).await.unwrap();

        assert_eq!(host.partitions_named("pvc-new"), vec![("sdb".to_string(), 3)]);
        let calls = host.fake().rendered_calls();
        let mkpart = position(&calls, "parted /dev/sdb mkpart pvc-new 110MiB 210MiB --script").unwrap();
        let wipe = position(&calls, "wipefs --force -a /dev/sdb3").unwrap();
        assert!(mkpart < wipe);
        assert_eq!(host.fake().count_matching(" rm "), 0);
    }

    #[tokio::test]
    async fn size_is_rounded_down_to_whole_mib() {
        let host = Host::standard();
        let manager = manager(&host);

        manager
            .create_volume("pvc-odd", "SSD", 64 * MIB + MIB / 2)
            .await
            .unwrap();
        assert_eq!(
            host.fake()
                .count_matching("parted /dev/nvme0n1 mkpart pvc-odd 1034MiB 1098MiB"),
            1
        );
        assert!(host.fake().count_matching("wipefs --force -a /dev/nvme0n1p3") == 1);
    }

    #[tokio::test]
    async fn create_is_idempotent() {
        let host = Host::standard();
        let manager = manager(&host);

        manager.create_volume("pvc-new", "HDD", 100 * MIB).await.unwrap();
        manager.create_volume("pvc-new", "HDD", 100 * MIB).await.unwrap();
        // an existing volume is never resized
        manager.create_volume("pvc-1", "HDD", 500 * MIB).await.unwrap();

        assert_eq!(host.fake().count_matching("mkpart"), 1);
        assert_eq!(host.partitions_named("pvc-new").len(), 1);
    }

    #[tokio::test]
    async fn exhausted_capacity_mutates_nothing() {
        let host = Host::standard();
        let manager = manager(&host);

        let err = manager
            .create_volume("pvc-huge", "HDD", 1024 * 1024 * MIB)
            .await
            .unwrap_err();
        assert!(err.is_insufficient_capacity());
        assert_eq!(host.fake().count_matching("mkpart"), 0);
        assert_eq!(host.fake().count_matching("wipefs"), 0);
        assert_eq!(host.fake().count_matching(" rm "), 0);
    }

    #[tokio::test]
    async fn no_matching_disk_is_insufficient_capacity() {
        let host = Host::standard();
        let manager = manager(&host);

        let err = manager
            .create_volume("pvc-x", "NO-SUCH-POOL", 10 * MIB)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SysError::InsufficientCapacity {
                requested_mib: 10,
                largest_mib: 0
            }
        ));
    }

    #[tokio::test]
    async fn wipe_failure_rolls_back_and_returns_wipe_error() {
        let host = Host::standard();
        host.set_faults(Faults {
            fail_wipe: true,
            ..Default::default()
        });
        let manager = manager(&host);

        let err = manager.create_volume("pvc-new", "HDD", 100 * MIB).await.unwrap_err();
        match err {
            SysError::Execution { command, output, .. } => {
                assert!(command.starts_with("wipefs"));
                assert!(output.contains("Device or resource busy"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(host.fake().count_matching("parted /dev/sdb rm 3 --script"), 1);
        assert!(host.partitions_named("pvc-new").is_empty());
    }

    #[tokio::test]
    async fn failed_rollback_still_reports_wipe_error() {
        let host = Host::standard();
        host.set_faults(Faults {
            fail_wipe: true,
            fail_rm: true,
            ..Default::default()
        });
        let manager = manager(&host);

        let err = manager.create_volume("pvc-new", "HDD", 100 * MIB).await.unwrap_err();
        assert!(matches!(err, SysError::Execution { ref command, .. } if command.starts_with("wipefs")));
        assert_eq!(host.fake().count_matching(" rm "), 1);
    }

    #[tokio::test]
    async fn invisible_partition_is_an_error() {
        let host = Host::standard();
        host.set_faults(Faults {
            hide_created: true,
            ..Default::default()
        });
        let manager = manager(&host);

        let err = manager.create_volume("pvc-new", "HDD", 100 * MIB).await.unwrap_err();
        assert!(matches!(err, SysError::PartitionNotVisible { ref disk, .. } if disk == "sdb"));
        assert_eq!(host.fake().count_matching("wipefs"), 0);
    }

    #[tokio::test]
    async fn transient_read_back_failure_is_retried() {
        let host = Host::standard();
        host.set_faults(Faults {
            fail_print_after_mkpart: 1,
            ..Default::default()
        });
        let manager = manager(&host);

        manager.create_volume("pvc-new", "HDD", 100 * MIB).await.unwrap();
        assert_eq!(host.fake().count_matching("wipefs --force -a /dev/sdb3"), 1);
    }

    #[tokio::test]
    async fn unread_partition_is_wiped_before_it_is_reported() {
        let host = Host::standard();
        host.set_faults(Faults {
            fail_print_after_mkpart: 2,
            ..Default::default()
        });
        let manager = manager(&host);

        let err = manager.create_volume("pvc-new", "HDD", 100 * MIB).await.unwrap_err();
        assert!(matches!(err, SysError::Execution { ref command, .. } if command.contains("print")));
        assert_eq!(host.partitions_named("pvc-new"), vec![("sdb".to_string(), 3)]);
        assert_eq!(host.fake().count_matching("wipefs"), 0);

        // the retry finds the partition and wipes it instead of reporting it ready
        manager.create_volume("pvc-new", "HDD", 100 * MIB).await.unwrap();
        assert_eq!(host.fake().count_matching("mkpart"), 1);
        assert_eq!(host.fake().count_matching("wipefs --force -a /dev/sdb3"), 1);

        // once finished it is an ordinary existing volume
        manager.create_volume("pvc-new", "HDD", 100 * MIB).await.unwrap();
        assert_eq!(host.fake().count_matching("wipefs"), 1);
    }

    #[tokio::test]
    async fn unread_partition_failing_its_wipe_is_removed() {
        let host = Host::standard();
        host.set_faults(Faults {
            fail_print_after_mkpart: 2,
            ..Default::default()
        });
        let manager = manager(&host);
        assert!(manager.create_volume("pvc-new", "HDD", 100 * MIB).await.is_err());

        host.set_faults(Faults {
            fail_wipe: true,
            ..Default::default()
        });
        let err = manager.create_volume("pvc-new", "HDD", 100 * MIB).await.unwrap_err();
        assert!(matches!(err, SysError::Execution { ref command, .. } if command.starts_with("wipefs")));
        assert_eq!(host.fake().count_matching("parted /dev/sdb rm 3 --script"), 1);
        assert!(host.partitions_named("pvc-new").is_empty());
    }

    #[tokio::test]
    async fn failed_mkpart_propagates() {
        let host = Host::standard();
        host.set_faults(Faults {
            fail_mkpart: true,
            ..Default::default()
        });
        let manager = manager(&host);

        let err = manager.create_volume("pvc-new", "HDD", 100 * MIB).await.unwrap_err();
        assert!(matches!(err, SysError::Execution { .. }));
        assert_eq!(host.fake().count_matching("wipefs"), 0);
    }

    #[tokio::test]
    async fn rejects_bad_requests_before_running_anything() {
        let host = Host::standard();
        let manager = manager(&host);

        assert!(matches!(
            manager.create_volume("pvc-tiny", "HDD", MIB - 1).await.unwrap_err(),
            SysError::InvalidSize(_)
        ));
        assert!(matches!(
            manager.create_volume("pvc a", "HDD", MIB).await.unwrap_err(),
            SysError::InvalidName(_)
        ));
        assert!(matches!(
            manager.create_volume("pvc-1", "HDD-(", MIB).await.unwrap_err(),
            SysError::InvalidPattern(_)
        ));
        assert!(host.fake().calls().is_empty());
    }

    #[tokio::test]
    async fn label_prefix_is_stripped() {
        let host = Host::standard();
        let config = Config {
            label_prefix: Some("pvc-".to_string()),
            ..Config::default()
        };
        let manager = PartitionManager::new(host.runner(), Arc::new(config));

        manager.create_volume("pvc-77", "HDD", 10 * MIB).await.unwrap();
        assert_eq!(host.partitions_named("77"), vec![("sdb".to_string(), 3)]);
        assert_eq!(
            manager.volume_device_path("pvc-77", "HDD").await.unwrap(),
            "/dev/sdb3"
        );
    }

    #[tokio::test]
    async fn concurrent_creates_do_not_overlap() {
        let host = Host::new(vec![SimDisk::gpt("sdb", 1024 * MIB).meta("HDD-1")]);
        let manager = manager(&host);

        let (a, b) = tokio::join!(
            manager.create_volume("pvc-a", "HDD", 100 * MIB),
            manager.create_volume("pvc-b", "HDD", 100 * MIB),
        );
        a.unwrap();
        b.unwrap();

        let disk = host.disk("sdb").unwrap();
        assert_eq!(disk.partitions.len(), 3);
        let mut starts: Vec<u64> = disk.partitions.iter().map(|p| p.begin / MIB).collect();
        starts.sort();
        assert_eq!(starts, vec![1, 10, 110]);
    }

    #[tokio::test]
    async fn creates_on_loop_devices() {
        let host = Host::new(vec![SimDisk::loop_device("loop0", 256 * MIB).meta("TEST-1")]);
        let manager = manager(&host);

        manager.create_volume("pvc-loop", "TEST", 16 * MIB).await.unwrap();
        assert_eq!(
            manager.volume_device_path("pvc-loop", "TEST").await.unwrap(),
            "/dev/loop0p2"
        );
        assert_eq!(host.fake().count_matching("wipefs --force -a /dev/loop0p2"), 1);
    }

    #[tokio::test]
    async fn destroy_wipes_then_deletes() {
        let host = Host::standard();
        let manager = manager(&host);

        manager.destroy_volume("pvc-1", "HDD").await.unwrap();

        let calls = host.fake().rendered_calls();
        let wipe = position(&calls, "wipefs --force -a /dev/sdb2").unwrap();
        let rm = position(&calls, "parted /dev/sdb rm 2 --script").unwrap();
        assert!(wipe < rm);
        assert!(host.partitions_named("pvc-1").is_empty());
    }

    #[tokio::test]
    async fn destroy_is_idempotent() {
        let host = Host::standard();
        let manager = manager(&host);

        manager.destroy_volume("pvc-1", "HDD").await.unwrap();
        manager.destroy_volume("pvc-1", "HDD").await.unwrap();
        manager.destroy_volume("never-created", "").await.unwrap();

        assert_eq!(host.fake().count_matching("wipefs"), 1);
        assert_eq!(host.fake().count_matching(" rm "), 1);
    }

    #[tokio::test]
    async fn empty_pattern_never_touches_unprepared_disks() {
        let host = Host::new(vec![
            SimDisk::gpt("sda", 20 * 1024 * MIB)
                .partition(1, 513, "fat32", "", "boot, esp")
                .partition(513, 1024, "ext4", "pvc-os", "")
                .mounted(&["/"]),
            SimDisk::gpt("sdb", 1024 * MIB).meta("HDD-1"),
        ]);
        let manager = manager(&host);

        manager.destroy_volume("pvc-os", "").await.unwrap();
        assert_eq!(host.fake().count_matching("wipefs"), 0);
        assert_eq!(host.partitions_named("pvc-os"), vec![("sda".to_string(), 2)]);
        assert!(matches!(
            manager.volume_device_path("pvc-os", "").await.unwrap_err(),
            SysError::VolumeNotFound(_)
        ));

        // new volumes land on the prepared disk, not in the OS disk's free space
        manager.create_volume("pvc-new", "", 100 * MIB).await.unwrap();
        assert_eq!(host.partitions_named("pvc-new"), vec![("sdb".to_string(), 2)]);
    }

    #[tokio::test]
    async fn destroy_refuses_ambiguous_identity() {
        let host = Host::standard();
        host.insert_partition("sdb", 200, 300, "pvc-1");
        let manager = manager(&host);

        let err = manager.destroy_volume("pvc-1", "HDD").await.unwrap_err();
        assert!(matches!(err, SysError::AmbiguousIdentity { count: 2, .. }));
        assert_eq!(host.fake().count_matching("wipefs"), 0);
        assert_eq!(host.partitions_named("pvc-1").len(), 2);
    }

    #[tokio::test]
    async fn destroy_keeps_partition_when_wipe_fails() {
        let host = Host::standard();
        host.set_faults(Faults {
            fail_wipe: true,
            ..Default::default()
        });
        let manager = manager(&host);

        assert!(manager.destroy_volume("pvc-1", "HDD").await.is_err());
        assert_eq!(host.fake().count_matching(" rm "), 0);
        assert_eq!(host.partitions_named("pvc-1").len(), 1);
    }

    #[tokio::test]
    async fn resolves_device_paths() {
        let host = Host::standard();
        let manager = manager(&host);

        assert_eq!(
            manager.volume_device_path("pvc-9", "SSD").await.unwrap(),
            "/dev/nvme0n1p2"
        );
        assert_eq!(
            manager.volume_device_path("pvc-1", "").await.unwrap(),
            "/dev/sdb2"
        );
        assert!(matches!(
            manager.volume_device_path("pvc-9", "HDD").await.unwrap_err(),
            SysError::VolumeNotFound(_)
        ));

        host.insert_partition("nvme0n1", 2000, 2100, "pvc-9");
        assert!(matches!(
            manager.volume_device_path("pvc-9", "SSD").await.unwrap_err(),
            SysError::AmbiguousIdentity { count: 2, .. }
        ));
    }

    #[tokio::test]
    async fn lists_volumes_and_inventory() {
        let host = Host::standard();
        let manager = manager(&host);

        manager.create_volume("pvc-new", "SSD", 10 * MIB).await.unwrap();

        let names: Vec<String> = manager
            .list_volumes()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["pvc-1", "pvc-9", "pvc-new"]);

        let inventory = manager.disk_inventory().await.unwrap();
        assert_eq!(inventory.len(), 2);
        assert_eq!(manager.list_disks().await.unwrap().len(), 5);
    }
}
