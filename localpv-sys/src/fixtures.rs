// SPDX-License-Identifier: GPL-3.0-only

//! Simulated host for exercising the engine without touching real disks
//!
//! [`Host`] keeps an in-memory set of disks and answers the exact command
//! lines the engine issues (`lsblk`, `parted`, `fdisk`, `wipefs`) the way the
//! real tools print them. Mutating commands change the simulated tables, and
//! individual failures can be injected through [`Faults`].

use std::sync::{Arc, Mutex};

use localpv_types::{DeviceType, MIB, partition_device_path, partition_number_from_path};

use crate::config::ToolPaths;
use crate::error::Result;
use crate::runner::{BoxedRunner, FakeRunner, execution_error};
use crate::tools::DiskTools;

/// First usable byte of a GPT disk with 512 byte sectors
pub const GPT_FIRST_USABLE: u64 = 34 * 512;

/// Bytes reserved for the backup GPT at the end of the disk
pub const GPT_BACKUP_BYTES: u64 = 33 * 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimPartition {
    pub number: u32,
    pub begin: u64,
    /// Inclusive
    pub end: u64,
    pub fs_type: String,
    pub name: String,
    pub flags: String,
    pub mountpoints: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SimDisk {
    pub name: String,
    pub size_bytes: u64,
    pub device_type: DeviceType,
    /// `None` for a disk without a partition table
    pub table: Option<&'static str>,
    pub partitions: Vec<SimPartition>,
}

impl SimDisk {
    pub fn gpt(name: &str, size_bytes: u64) -> Self {
        Self {
            name: name.to_string(),
            size_bytes,
            device_type: DeviceType::Disk,
            table: Some("gpt"),
            partitions: Vec::new(),
        }
    }

    pub fn msdos(name: &str, size_bytes: u64) -> Self {
        Self {
            table: Some("msdos"),
            ..Self::gpt(name, size_bytes)
        }
    }

    pub fn unlabeled(name: &str, size_bytes: u64) -> Self {
        Self {
            table: None,
            ..Self::gpt(name, size_bytes)
        }
    }

    pub fn loop_device(name: &str, size_bytes: u64) -> Self {
        Self {
            device_type: DeviceType::Loop,
            ..Self::gpt(name, size_bytes)
        }
    }

    /// Add the meta partition at [1 MiB, 10 MiB).
    pub fn meta(self, label: &str) -> Self {
        self.partition(1, 10, "", label, "")
    }

    /// Add a partition spanning [start_mib, end_mib).
    pub fn partition(
        mut self,
        start_mib: u64,
        end_mib: u64,
        fs_type: &str,
        name: &str,
        flags: &str,
    ) -> Self {
        let number = self.next_number();
        self.partitions.push(SimPartition {
            number,
            begin: start_mib * MIB,
            end: end_mib * MIB - 1,
            fs_type: fs_type.to_string(),
            name: name.to_string(),
            flags: flags.to_string(),
            mountpoints: Vec::new(),
        });
        self
    }

    /// Mount the most recently added partition at `points`.
    pub fn mounted(mut self, points: &[&str]) -> Self {
        if let Some(part) = self.partitions.last_mut() {
            part.mountpoints = points.iter().map(|p| p.to_string()).collect();
        }
        self
    }

    fn next_number(&self) -> u32 {
        (1..)
            .find(|n| self.partitions.iter().all(|p| p.number != *n))
            .unwrap_or(1)
    }

    fn usable_last(&self) -> u64 {
        self.size_bytes - GPT_BACKUP_BYTES - 1
    }

    /// Unallocated (begin, end) ranges, end inclusive
    pub fn free_gaps(&self) -> Vec<(u64, u64)> {
        let mut parts: Vec<&SimPartition> = self.partitions.iter().collect();
        parts.sort_by_key(|p| p.begin);

        let mut gaps = Vec::new();
        let mut cursor = GPT_FIRST_USABLE;
        for part in parts {
            if part.begin > cursor {
                gaps.push((cursor, part.begin - 1));
            }
            cursor = cursor.max(part.end + 1);
        }
        if cursor <= self.usable_last() {
            gaps.push((cursor, self.usable_last()));
        }
        gaps
    }
}

/// Failures to inject into the simulated tools
#[derive(Debug, Clone, Default)]
pub struct Faults {
    pub fail_lsblk: bool,
    pub fail_mkpart: bool,
    pub fail_rm: bool,
    pub fail_wipe: bool,
    /// `mkpart` reports success without creating anything
    pub hide_created: bool,
    /// Number of `parted print` calls failing right after a successful `mkpart`
    pub fail_print_after_mkpart: u32,
}

struct HostState {
    disks: Vec<SimDisk>,
    faults: Faults,
    /// Armed by `mkpart` from [`Faults::fail_print_after_mkpart`]
    failing_prints: u32,
}

/// A simulated host answering partitioning tool invocations
#[derive(Clone)]
pub struct Host {
    state: Arc<Mutex<HostState>>,
    fake: Arc<FakeRunner>,
}

impl Host {
    pub fn new(disks: Vec<SimDisk>) -> Self {
        let state = Arc::new(Mutex::new(HostState {
            disks,
            faults: Faults::default(),
            failing_prints: 0,
        }));
        let handler_state = state.clone();
        let fake = FakeRunner::new(move |argv| {
            handler_state
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .respond(argv)
        });
        Self { state, fake }
    }

    /// sda: OS disk without meta partition, root on a btrfs partition
    /// sdb: HDD-JBOD-1 with volume pvc-1
    /// sdc: msdos disk
    /// sdd: blank GPT disk
    /// nvme0n1: SSD-1 with volume pvc-9
    pub fn standard() -> Self {
        Self::new(vec![
            SimDisk::gpt("sda", 20 * 1024 * MIB)
                .partition(1, 513, "fat32", "", "boot, esp")
                .mounted(&["/boot/efi"])
                .partition(513, 20 * 1024 - 1, "btrfs", "", "")
                .mounted(&["/home", "/var/lib/docker/btrfs", "/"]),
            SimDisk::gpt("sdb", 16 * 1024 * MIB)
                .meta("HDD-JBOD-1")
                .partition(10, 110, "ext4", "pvc-1", ""),
            SimDisk::msdos("sdc", 8 * 1024 * MIB),
            SimDisk::gpt("sdd", 4 * 1024 * MIB),
            SimDisk::gpt("nvme0n1", 8 * 1024 * MIB)
                .meta("SSD-1")
                .partition(10, 1034, "xfs", "pvc-9", ""),
        ])
    }

    pub fn runner(&self) -> BoxedRunner {
        self.fake.clone().as_runner()
    }

    /// The recording runner behind this host
    pub fn fake(&self) -> &FakeRunner {
        &self.fake
    }

    pub fn set_faults(&self, faults: Faults) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.faults = faults;
        state.failing_prints = 0;
    }

    pub fn disk(&self, name: &str) -> Option<SimDisk> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .disks
            .iter()
            .find(|d| d.name == name)
            .cloned()
    }

    /// (disk, partition number) of every partition named `name`
    pub fn partitions_named(&self, name: &str) -> Vec<(String, u32)> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .disks
            .iter()
            .flat_map(|d| {
                d.partitions
                    .iter()
                    .filter(|p| p.name == name)
                    .map(|p| (d.name.clone(), p.number))
            })
            .collect()
    }

    /// Add a partition behind the engine's back.
    pub fn insert_partition(&self, disk: &str, start_mib: u64, end_mib: u64, name: &str) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(index) = state.disks.iter().position(|d| d.name == disk) {
            let updated = state.disks[index]
                .clone()
                .partition(start_mib, end_mib, "", name, "");
            state.disks[index] = updated;
        }
    }
}

/// Engine tools wired to a simulated host
pub fn tools_for(host: &Host) -> DiskTools {
    DiskTools::new(host.runner(), ToolPaths::default())
}

fn fail(argv: &[String], output: impl Into<String>) -> Result<String> {
    Err(execution_error(argv, "status 1", output))
}

impl HostState {
    fn respond(&mut self, argv: &[String]) -> Result<String> {
        let args: Vec<&str> = argv.iter().map(String::as_str).collect();
        match args.as_slice() {
            ["lsblk", "-b"] => self.lsblk(argv),
            ["parted", dev, "unit", "b", "print", "free", "--script", "-m"] => {
                self.print(argv, dev, true)
            }
            ["parted", dev, "unit", "b", "print", "--script", "-m"] => self.print(argv, dev, false),
            ["parted", dev, "mkpart", name, start, end, "--script"] => {
                self.mkpart(argv, dev, name, start, end)
            }
            ["parted", dev, "rm", number, "--script"] => self.rm(argv, dev, number),
            ["fdisk", "-l", dev] => self.fdisk(argv, dev),
            ["wipefs", "--force", "-a", device] => self.wipefs(argv, device),
            _ => Err(execution_error(argv, "status 127", "command not simulated")),
        }
    }

    fn disk_index(&self, argv: &[String], dev: &str) -> Result<usize> {
        let name = dev.strip_prefix("/dev/").unwrap_or(dev);
        self.disks.iter().position(|d| d.name == name).ok_or_else(|| {
            execution_error(
                argv,
                "status 1",
                format!("Error: Could not stat device {dev} - No such file or directory."),
            )
        })
    }

    fn lsblk(&self, argv: &[String]) -> Result<String> {
        if self.faults.fail_lsblk {
            return fail(argv, "lsblk: failed to access sysfs directory: /sys/dev/block");
        }

        let mut out = String::from("NAME MAJ:MIN RM SIZE RO TYPE MOUNTPOINTS\n");
        for (index, disk) in self.disks.iter().enumerate() {
            let kind = match disk.device_type {
                DeviceType::Disk => "disk",
                DeviceType::Loop => "loop",
            };
            out.push_str(&format!(
                "{} 8:{} 0 {} 0 {}\n",
                disk.name,
                index * 16,
                disk.size_bytes,
                kind
            ));
            for part in &disk.partitions {
                let path = partition_device_path(&disk.name, part.number);
                let mut points = part.mountpoints.iter();
                out.push_str(&format!(
                    "└─{} 8:{} 0 {} 0 part {}\n",
                    path.trim_start_matches("/dev/"),
                    index * 16 + part.number as usize,
                    part.end - part.begin + 1,
                    points.next().map(String::as_str).unwrap_or("")
                ));
                // util-linux prints further mountpoints alone on their own lines
                for point in points {
                    out.push_str(&format!("{:>40}\n", point));
                }
            }
        }
        Ok(out)
    }

    fn print(&mut self, argv: &[String], dev: &str, free: bool) -> Result<String> {
        let index = self.disk_index(argv, dev)?;
        if self.failing_prints > 0 {
            self.failing_prints -= 1;
            return fail(argv, format!("Error: Error opening {dev}: Device or resource busy"));
        }

        let disk = &self.disks[index];
        let Some(table) = disk.table else {
            return fail(
                argv,
                format!(
                    "BYT;\n{dev}:{}B:scsi:512:512:unknown:SIM DISK:;\nError: {dev}: unrecognised disk label\n",
                    disk.size_bytes
                ),
            );
        };

        let mut out = format!(
            "BYT;\n{dev}:{}B:scsi:512:512:{table}:SIM DISK:;\n",
            disk.size_bytes
        );
        if table != "gpt" {
            return Ok(out);
        }

        let mut rows: Vec<(u64, String)> = disk
            .partitions
            .iter()
            .map(|p| {
                (
                    p.begin,
                    format!(
                        "{}:{}B:{}B:{}B:{}:{}:{};",
                        p.number,
                        p.begin,
                        p.end,
                        p.end - p.begin + 1,
                        p.fs_type,
                        p.name,
                        p.flags
                    ),
                )
            })
            .collect();
        if free {
            rows.extend(disk.free_gaps().into_iter().map(|(begin, end)| {
                (begin, format!("1:{begin}B:{end}B:{}B:free;", end - begin + 1))
            }));
        }
        rows.sort_by_key(|(begin, _)| *begin);

        for (_, row) in rows {
            out.push_str(&row);
            out.push('\n');
        }
        Ok(out)
    }

    fn mkpart(
        &mut self,
        argv: &[String],
        dev: &str,
        name: &str,
        start: &str,
        end: &str,
    ) -> Result<String> {
        let index = self.disk_index(argv, dev)?;
        if self.faults.fail_mkpart {
            return fail(argv, "Error: Partition(s) on /dev are being used.");
        }

        let parse_mib = |field: &str| field.strip_suffix("MiB").and_then(|v| v.parse::<u64>().ok());
        let (Some(start_mib), Some(end_mib)) = (parse_mib(start), parse_mib(end)) else {
            return fail(argv, format!("Error: Invalid number: {start} {end}"));
        };

        let disk = &self.disks[index];
        let begin = start_mib * MIB;
        let last = end_mib * MIB - 1;
        let fits = begin >= GPT_FIRST_USABLE
            && end_mib > start_mib
            && last <= disk.usable_last()
            && disk.partitions.iter().all(|p| last < p.begin || begin > p.end);
        if !fits {
            return fail(
                argv,
                "Error: You requested a partition from outside the free space.",
            );
        }

        if self.faults.hide_created {
            return Ok(String::new());
        }

        let updated = disk.clone().partition(start_mib, end_mib, "", name, "");
        self.disks[index] = updated;
        self.failing_prints = self.faults.fail_print_after_mkpart;
        Ok(String::new())
    }

    fn rm(&mut self, argv: &[String], dev: &str, number: &str) -> Result<String> {
        let index = self.disk_index(argv, dev)?;
        if self.faults.fail_rm {
            return fail(argv, "Error: Partition /dev is being used.");
        }

        let disk = &mut self.disks[index];
        let before = disk.partitions.len();
        disk.partitions
            .retain(|p| number.parse::<u32>().ok() != Some(p.number));
        if disk.partitions.len() == before {
            return fail(argv, "Error: Partition doesn't exist.");
        }
        Ok(String::new())
    }

    fn fdisk(&self, argv: &[String], dev: &str) -> Result<String> {
        let index = self.disk_index(argv, dev)?;
        let disk = &self.disks[index];

        let mut out = format!(
            "Disk {dev}: {} bytes, {} sectors\nUnits: sectors of 1 * 512 = 512 bytes\n",
            disk.size_bytes,
            disk.size_bytes / 512
        );
        match disk.table {
            Some("gpt") => out.push_str(&format!(
                "Disklabel type: gpt\nDisk identifier: {:08X}-E291-4DFD-81AC-{:012X}\n",
                index + 1,
                disk.size_bytes
            )),
            Some(_) => out.push_str(&format!(
                "Disklabel type: dos\nDisk identifier: 0x{:08x}\n",
                index + 1
            )),
            None => {}
        }
        Ok(out)
    }

    fn wipefs(&mut self, argv: &[String], device: &str) -> Result<String> {
        if self.faults.fail_wipe {
            return fail(
                argv,
                format!("wipefs: error: {device}: probing initialization failed: Device or resource busy"),
            );
        }

        for disk in &mut self.disks {
            let Some(number) = partition_number_from_path(&disk.name, device) else {
                continue;
            };
            if let Some(part) = disk.partitions.iter_mut().find(|p| p.number == number) {
                part.fs_type.clear();
                return Ok(String::new());
            }
        }

        fail(
            argv,
            format!("wipefs: error: {device}: probing initialization failed: No such file or directory"),
        )
    }
}
