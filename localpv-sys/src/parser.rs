// SPDX-License-Identifier: GPL-3.0-only

//! Parsers for `lsblk`, `parted -m` and `fdisk -l` output
//!
//! Output that does not have the known shape is an error, never skipped.

use localpv_types::{DeviceType, DiskDetail, PartitionRow, PartitionSlot, PartitionTableType};
use uuid::Uuid;

use crate::error::{Result, SysError};

// `lsblk -b` columns: NAME MAJ:MIN RM SIZE RO TYPE MOUNTPOINTS
const LSBLK_NAME: usize = 0;
const LSBLK_MAJ_MIN: usize = 1;
const LSBLK_SIZE: usize = 3;
const LSBLK_TYPE: usize = 5;

// `parted -m` disk line: path:size:transport:logical:physical:table:model:flags
const DISK_LINE_PATH: usize = 0;
const DISK_LINE_SIZE: usize = 1;
const DISK_LINE_TABLE: usize = 5;
const DISK_LINE_MIN_FIELDS: usize = 6;

// `parted -m` partition rows: number:begin:end:size[:fs:name:flags | :free]
const ROW_NUMBER: usize = 0;
const ROW_BEGIN: usize = 1;
const ROW_END: usize = 2;
const ROW_SIZE: usize = 3;
const ROW_FS: usize = 4;
const ROW_NAME: usize = 5;
const ROW_FLAGS: usize = 6;
const USED_ROW_FIELDS: usize = 7;
const FREE_ROW_FIELDS: usize = 5;

const FREE_SLOT_FS: &str = "free";
const BYTE_UNITS_MARKER: &str = "BYT;";

fn is_maj_min(field: &str) -> bool {
    field.split_once(':').is_some_and(|(major, minor)| {
        !major.is_empty()
            && !minor.is_empty()
            && major.bytes().all(|b| b.is_ascii_digit())
            && minor.bytes().all(|b| b.is_ascii_digit())
    })
}

/// Parse `lsblk -b` output into disk and loop devices.
///
/// A device with several mountpoints lists the extra ones on continuation
/// lines holding only a path. Those carry no MAJ:MIN column and are skipped.
pub fn parse_disk_list(raw: &str) -> Result<Vec<DiskDetail>> {
    let mut disks = Vec::new();

    for line in raw.lines() {
        let cols: Vec<&str> = line.split_whitespace().collect();
        if cols.is_empty() {
            continue;
        }
        if cols.len() <= LSBLK_TYPE {
            if cols.get(LSBLK_MAJ_MIN).is_some_and(|c| is_maj_min(c)) {
                return Err(SysError::parse("lsblk", line));
            }
            continue;
        }

        let Some(device_type) = DeviceType::parse(cols[LSBLK_TYPE]) else {
            continue;
        };

        let size_bytes = cols[LSBLK_SIZE]
            .parse::<u64>()
            .map_err(|_| SysError::parse("lsblk", line))?;
        let path = cols[LSBLK_NAME]
            .trim_start_matches(|c: char| !c.is_ascii_alphanumeric())
            .to_string();

        disks.push(DiskDetail {
            path,
            size_bytes,
            device_type,
        });
    }

    Ok(disks)
}

/// Strip the single unit suffix parted appends in `unit b` mode (`1048576B`).
fn parse_bytes(field: &str, line: &str) -> Result<u64> {
    field
        .strip_suffix('B')
        .unwrap_or(field)
        .parse::<u64>()
        .map_err(|_| SysError::parse("parted partition row", line))
}

/// Parse one `parted -m` partition row.
///
/// Seven fields describe an allocated partition, five fields a free slot.
/// parted emits no other shape in machine mode.
pub fn parse_partition_row(raw: &str) -> Result<PartitionRow> {
    let line = raw.trim();
    let body = line.strip_suffix(';').unwrap_or(line);
    let fields: Vec<&str> = body.split(':').collect();

    let slot = match fields.len() {
        USED_ROW_FIELDS => PartitionSlot::Used {
            fs_type: fields[ROW_FS].to_string(),
            name: fields[ROW_NAME].to_string(),
            flags: fields[ROW_FLAGS].to_string(),
        },
        FREE_ROW_FIELDS if fields[ROW_FS] == FREE_SLOT_FS => PartitionSlot::Free,
        _ => return Err(SysError::parse("parted partition row", line)),
    };

    let number = fields[ROW_NUMBER]
        .parse::<u32>()
        .map_err(|_| SysError::parse("parted partition row", line))?;

    Ok(PartitionRow {
        number,
        begin_bytes: parse_bytes(fields[ROW_BEGIN], line)?,
        end_bytes: parse_bytes(fields[ROW_END], line)?,
        size_bytes: parse_bytes(fields[ROW_SIZE], line)?,
        slot,
    })
}

/// Disk line of a `parted -m` listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartedDisk {
    pub path: String,
    pub size_bytes: u64,
    pub table_type: PartitionTableType,
}

/// A validated `parted -m` listing of a GPT disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionTable {
    pub disk: PartedDisk,
    pub rows: Vec<PartitionRow>,
}

/// Parse `parted <dev> unit b print [free] --script -m` output.
///
/// The listing must start with `BYT;` and declare a GPT table. Lines that do
/// not end in `;` are diagnostics parted writes to stderr and are ignored.
pub fn parse_partition_table(disk: &str, raw: &str) -> Result<PartitionTable> {
    let mut lines = raw
        .lines()
        .map(str::trim)
        .filter(|line| line.ends_with(';'));

    match lines.next() {
        Some(BYTE_UNITS_MARKER) => {}
        Some(other) => return Err(SysError::parse("parted header", other)),
        None => return Err(SysError::parse("parted header", raw.trim())),
    }

    let disk_line = lines
        .next()
        .ok_or_else(|| SysError::parse("parted disk line", raw.trim()))?;
    let fields: Vec<&str> = disk_line.trim_end_matches(';').split(':').collect();
    if fields.len() < DISK_LINE_MIN_FIELDS {
        return Err(SysError::parse("parted disk line", disk_line));
    }

    let found = fields[DISK_LINE_TABLE];
    let table_type = match PartitionTableType::parse(found) {
        Some(PartitionTableType::Gpt) => PartitionTableType::Gpt,
        _ => {
            return Err(SysError::WrongPartitionTable {
                disk: disk.to_string(),
                found: found.to_string(),
            });
        }
    };

    let parted_disk = PartedDisk {
        path: fields[DISK_LINE_PATH].to_string(),
        size_bytes: fields[DISK_LINE_SIZE]
            .strip_suffix('B')
            .unwrap_or(fields[DISK_LINE_SIZE])
            .parse()
            .map_err(|_| SysError::parse("parted disk line", disk_line))?,
        table_type,
    };

    let rows = lines.map(parse_partition_row).collect::<Result<Vec<_>>>()?;

    Ok(PartitionTable {
        disk: parted_disk,
        rows,
    })
}

fn value_of<'a>(raw: &'a str, key: &str) -> Option<&'a str> {
    raw.lines()
        .find_map(|line| line.trim().strip_prefix(key).map(str::trim))
}

/// Extract the GPT disk identifier from `fdisk -l <dev>` output.
pub fn parse_disk_identifier(disk: &str, raw: &str) -> Result<String> {
    match value_of(raw, "Disklabel type:") {
        Some("gpt") => {}
        found => {
            return Err(SysError::WrongPartitionTable {
                disk: disk.to_string(),
                found: found.unwrap_or("none").to_string(),
            });
        }
    }

    let identifier = value_of(raw, "Disk identifier:")
        .ok_or_else(|| SysError::DiskIdentifierNotFound(disk.to_string()))?;
    let uuid = Uuid::parse_str(identifier)
        .map_err(|_| SysError::parse("fdisk disk identifier", identifier))?;

    Ok(uuid.hyphenated().to_string())
}
