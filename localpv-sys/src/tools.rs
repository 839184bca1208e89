// SPDX-License-Identifier: GPL-3.0-only

//! Command lines for the host partitioning toolchain
//!
//! | Operation | Command |
//! |---|---|
//! | list block devices | `lsblk -b` |
//! | disk identifier | `fdisk -l /dev/<disk>` |
//! | print partitions | `parted /dev/<disk> unit b print [free] --script -m` |
//! | create partition | `parted /dev/<disk> mkpart <name> <start>MiB <end>MiB --script` |
//! | delete partition | `parted /dev/<disk> rm <number> --script` |
//! | wipe signatures | `wipefs --force -a <device>` |

use localpv_types::DiskDetail;
use tracing::{debug, info};

use crate::config::ToolPaths;
use crate::error::Result;
use crate::parser::{self, PartitionTable};
use crate::runner::BoxedRunner;

/// Whether a partition listing includes unallocated slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintMode {
    Used,
    WithFree,
}

/// Runs the partitioning tools and parses what they print
#[derive(Clone)]
pub struct DiskTools {
    runner: BoxedRunner,
    paths: ToolPaths,
}

fn dev_node(disk: &str) -> String {
    format!("/dev/{disk}")
}

impl DiskTools {
    pub fn new(runner: BoxedRunner, paths: ToolPaths) -> Self {
        Self { runner, paths }
    }

    pub fn list_disks_argv(&self) -> Vec<String> {
        vec![self.paths.lsblk.clone(), "-b".to_string()]
    }

    pub fn print_argv(&self, disk: &str, mode: PrintMode) -> Vec<String> {
        let mut argv = vec![
            self.paths.parted.clone(),
            dev_node(disk),
            "unit".to_string(),
            "b".to_string(),
            "print".to_string(),
        ];
        if mode == PrintMode::WithFree {
            argv.push("free".to_string());
        }
        argv.push("--script".to_string());
        argv.push("-m".to_string());
        argv
    }

    pub fn disk_label_argv(&self, disk: &str) -> Vec<String> {
        vec![self.paths.fdisk.clone(), "-l".to_string(), dev_node(disk)]
    }

    pub fn mkpart_argv(&self, disk: &str, label: &str, start_mib: u64, end_mib: u64) -> Vec<String> {
        vec![
            self.paths.parted.clone(),
            dev_node(disk),
            "mkpart".to_string(),
            label.to_string(),
            format!("{start_mib}MiB"),
            format!("{end_mib}MiB"),
            "--script".to_string(),
        ]
    }

    pub fn rm_argv(&self, disk: &str, number: u32) -> Vec<String> {
        vec![
            self.paths.parted.clone(),
            dev_node(disk),
            "rm".to_string(),
            number.to_string(),
            "--script".to_string(),
        ]
    }

    pub fn wipefs_argv(&self, device_path: &str) -> Vec<String> {
        vec![
            self.paths.wipefs.clone(),
            "--force".to_string(),
            "-a".to_string(),
            device_path.to_string(),
        ]
    }

    /// Disk and loop devices known to the kernel right now
    pub async fn list_disks(&self) -> Result<Vec<DiskDetail>> {
        let output = self.runner.run(&self.list_disks_argv()).await?;
        let disks = parser::parse_disk_list(&output)?;
        debug!("Found {} disks", disks.len());
        Ok(disks)
    }

    /// Partition table of one disk; fails unless it is GPT
    pub async fn print_partitions(&self, disk: &str, mode: PrintMode) -> Result<PartitionTable> {
        let output = self.runner.run(&self.print_argv(disk, mode)).await?;
        parser::parse_partition_table(disk, &output)
    }

    /// GPT disk identifier of one disk
    pub async fn disk_identifier(&self, disk: &str) -> Result<String> {
        let output = self.runner.run(&self.disk_label_argv(disk)).await?;
        parser::parse_disk_identifier(disk, &output)
    }

    pub async fn create_partition(
        &self,
        disk: &str,
        label: &str,
        start_mib: u64,
        end_mib: u64,
    ) -> Result<()> {
        info!(disk, label, start_mib, end_mib, "creating partition");
        self.runner
            .run(&self.mkpart_argv(disk, label, start_mib, end_mib))
            .await?;
        Ok(())
    }

    pub async fn delete_partition(&self, disk: &str, number: u32) -> Result<()> {
        info!(disk, number, "deleting partition");
        self.runner.run(&self.rm_argv(disk, number)).await?;
        Ok(())
    }

    /// Erase every filesystem signature on a partition
    pub async fn wipe_signatures(&self, device_path: &str) -> Result<()> {
        info!(device_path, "wiping filesystem signatures");
        self.runner.run(&self.wipefs_argv(device_path)).await?;
        Ok(())
    }
}
