// SPDX-License-Identifier: GPL-3.0-only

//! Disk inventory and partition listings

use localpv_types::{META_PARTITION_NUMBER, MetaPartition, PartitionRow, UsedPartition};
use regex::Regex;
use tracing::{debug, warn};

use crate::error::{Result, SysError};
use crate::tools::{DiskTools, PrintMode};

/// Pattern selecting a disk family by its meta partition label.
///
/// An empty pattern matches every label, so family lookups select every
/// prepared disk. Matching is unanchored, so callers wanting an exact label
/// write `^label$`.
#[derive(Debug, Clone, Default)]
pub struct DiskPattern {
    regex: Option<Regex>,
}

impl DiskPattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = if pattern.is_empty() {
            None
        } else {
            Some(Regex::new(pattern)?)
        };
        Ok(Self { regex })
    }

    /// Pattern accepting every label
    pub fn any() -> Self {
        Self::default()
    }

    pub fn is_any(&self) -> bool {
        self.regex.is_none()
    }

    pub fn matches(&self, label: &str) -> bool {
        self.regex.as_ref().is_none_or(|regex| regex.is_match(label))
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_ref().map(Regex::as_str).unwrap_or_default()
    }
}

/// Partition rows of one GPT disk.
///
/// With a non-empty pattern the disk's partition 1 must exist and its name
/// must match, otherwise the listing fails with [`SysError::WrongMetaName`].
pub async fn list_partitions(
    tools: &DiskTools,
    disk: &str,
    mode: PrintMode,
    pattern: &DiskPattern,
) -> Result<Vec<PartitionRow>> {
    let table = tools.print_partitions(disk, mode).await?;

    if !pattern.is_any() {
        let meta_name = table
            .rows
            .iter()
            .filter(|row| row.number == META_PARTITION_NUMBER)
            .find_map(PartitionRow::name);

        if !meta_name.is_some_and(|name| pattern.matches(name)) {
            return Err(SysError::WrongMetaName {
                disk: disk.to_string(),
                expected: pattern.as_str().to_string(),
                found: meta_name.map(str::to_string),
            });
        }
    }

    Ok(table.rows)
}

/// Partition rows of `disk` if it belongs to the family selected by `pattern`.
///
/// Unlike [`list_partitions`] this also requires a valid meta partition when
/// the pattern is empty, so unprepared disks (the OS disk among them) are
/// never searched or allocated from.
pub async fn family_partitions(
    tools: &DiskTools,
    disk: &str,
    mode: PrintMode,
    pattern: &DiskPattern,
) -> Result<Vec<PartitionRow>> {
    let rows = list_partitions(tools, disk, mode, pattern).await?;
    if !rows.iter().any(|row| MetaPartition::from_row(disk, row).is_some()) {
        return Err(SysError::MetaPartitionNotFound(disk.to_string()));
    }
    Ok(rows)
}

/// Volume partitions labelled `label` on every prepared disk selected by
/// `pattern`.
///
/// Disks that cannot be listed are skipped.
pub async fn find_used_partitions(
    tools: &DiskTools,
    label: &str,
    pattern: &DiskPattern,
) -> Result<Vec<UsedPartition>> {
    let mut found = Vec::new();

    for disk in tools.list_disks().await? {
        let rows = match family_partitions(tools, &disk.path, PrintMode::Used, pattern).await {
            Ok(rows) => rows,
            Err(e) => {
                debug!("Skipping disk {} while looking for {:?}: {}", disk.path, label, e);
                continue;
            }
        };

        found.extend(
            rows.iter()
                .filter(|row| row.number != META_PARTITION_NUMBER && row.name() == Some(label))
                .filter_map(|row| UsedPartition::from_row(&disk.path, row)),
        );
    }

    debug!("Found {} partitions labelled {:?}", found.len(), label);
    Ok(found)
}

/// Every volume partition on prepared disks (disks with a meta partition).
pub async fn list_used_partitions(tools: &DiskTools) -> Result<Vec<UsedPartition>> {
    let mut used = Vec::new();

    for disk in tools.list_disks().await? {
        let rows = match family_partitions(tools, &disk.path, PrintMode::Used, &DiskPattern::any()).await {
            Ok(rows) => rows,
            Err(SysError::MetaPartitionNotFound(_)) => {
                debug!("Disk {} has no meta partition", disk.path);
                continue;
            }
            Err(e) => {
                warn!("Skipping disk {}: {}", disk.path, e);
                continue;
            }
        };

        used.extend(
            rows.iter()
                .filter(|row| row.number != META_PARTITION_NUMBER)
                .filter_map(|row| UsedPartition::from_row(&disk.path, row)),
        );
    }

    Ok(used)
}
