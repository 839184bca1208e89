// SPDX-License-Identifier: GPL-3.0-only

//! Best-fit extent selection
//!
//! Candidates are ordered by size, then disk path, then start offset, and the
//! first one large enough wins.

use localpv_types::FreeExtent;
use tracing::debug;

use crate::error::{Result, SysError};
use crate::extents::list_free_extents;
use crate::inventory::DiskPattern;
use crate::tools::DiskTools;

/// Sort candidates into allocation order.
pub fn sort_extents(extents: &mut [FreeExtent]) {
    extents.sort_by(|a, b| {
        a.size_mib
            .cmp(&b.size_mib)
            .then_with(|| a.disk_path.cmp(&b.disk_path))
            .then_with(|| a.start_mib.cmp(&b.start_mib))
    });
}

/// Pick the smallest extent holding at least `requested_mib`.
pub fn select_best_extent(mut extents: Vec<FreeExtent>, requested_mib: u64) -> Result<FreeExtent> {
    sort_extents(&mut extents);

    let largest_mib = extents.last().map(|e| e.size_mib).unwrap_or(0);
    extents
        .into_iter()
        .find(|e| e.size_mib >= requested_mib)
        .ok_or(SysError::InsufficientCapacity {
            requested_mib,
            largest_mib,
        })
}

/// Best free extent across every disk matching `pattern`
pub async fn find_best_extent(
    tools: &DiskTools,
    pattern: &DiskPattern,
    requested_mib: u64,
) -> Result<FreeExtent> {
    let extents = list_free_extents(tools, pattern).await?;
    let best = select_best_extent(extents, requested_mib)?;
    debug!(
        "Best fit for {} MiB: {} at {} MiB ({} MiB free)",
        requested_mib, best.disk_path, best.start_mib, best.size_mib
    );
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{Host, SimDisk, tools_for};
    use localpv_types::MIB;

    fn extent(disk: &str, start_mib: u64, size_mib: u64) -> FreeExtent {
        FreeExtent {
            disk_path: disk.to_string(),
            start_mib,
            end_mib: start_mib + size_mib,
            size_mib,
        }
    }

    #[test]
    fn picks_smallest_adequate_extent() {
        let extents = vec![extent("sdb", 10, 50), extent("sdb", 100, 200), extent("sdc", 10, 80)];
        let best = select_best_extent(extents, 60).unwrap();
        assert_eq!(best, extent("sdc", 10, 80));
    }

    #[test]
    fn exact_fit_is_accepted() {
        let extents = vec![extent("sdb", 10, 200), extent("sdb", 300, 80)];
        assert_eq!(select_best_extent(extents, 80).unwrap().start_mib, 300);
    }

    #[test]
    fn ties_break_on_disk_then_offset() {
        let extents = vec![
            extent("sdc", 500, 80),
            extent("sdb", 900, 80),
            extent("sdb", 400, 80),
        ];
        let best = select_best_extent(extents, 60).unwrap();
        assert_eq!(best, extent("sdb", 400, 80));
    }

    #[test]
    fn reports_largest_extent_when_nothing_fits() {
        let extents = vec![extent("sdb", 10, 50), extent("sdc", 10, 80)];
        let err = select_best_extent(extents, 81).unwrap_err();
        assert!(matches!(
            err,
            SysError::InsufficientCapacity {
                requested_mib: 81,
                largest_mib: 80
            }
        ));

        assert!(select_best_extent(Vec::new(), 1).unwrap_err().is_insufficient_capacity());
    }

    #[tokio::test]
    async fn best_fit_across_disks() {
        let host = Host::new(vec![
            SimDisk::gpt("sdb", 391 * MIB)
                .meta("HDD-1")
                .partition(60, 100, "", "pvc-a", "")
                .partition(300, 310, "", "pvc-b", ""),
            SimDisk::gpt("sdc", 1024 * MIB).meta("SSD-1"),
        ]);
        let tools = tools_for(&host);

        let best = find_best_extent(&tools, &DiskPattern::new("HDD").unwrap(), 60)
            .await
            .unwrap();
        assert_eq!((best.disk_path.as_str(), best.start_mib, best.size_mib), ("sdb", 310, 80));

        let err = find_best_extent(&tools, &DiskPattern::new("HDD").unwrap(), 201)
            .await
            .unwrap_err();
        assert!(err.is_insufficient_capacity());
        assert_eq!(host.fake().count_matching("mkpart"), 0);
    }
}
