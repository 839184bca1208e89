// SPDX-License-Identifier: GPL-3.0-only

//! Partition engine for node-local volumes
//!
//! Every fact comes from running the host partitioning tools and parsing what
//! they print; nothing is cached between calls. The layers, bottom up:
//!
//! - [`runner`]: spawns one tool invocation (argv in, merged output out)
//! - [`parser`]: turns `lsblk`, `parted -m` and `fdisk -l` output into types
//! - [`tools`]: the exact command lines, paired with their parsers
//! - [`inventory`], [`meta`]: disks, partition listings and meta labels
//! - [`extents`], [`allocator`]: free space and best-fit selection
//! - [`manager`]: create, destroy and resolve volume partitions
//!
//! These operations modify partition tables and must run as root.

pub mod allocator;
pub mod config;
pub mod error;
pub mod extents;
pub mod inventory;
pub mod manager;
pub mod meta;
pub mod parser;
pub mod provisioner;
pub mod runner;
pub mod tools;

#[cfg(any(test, feature = "testing"))]
pub mod fixtures;

pub use config::{Config, NODE_ID_ENV, ToolPaths};
pub use error::{Result, SysError};
pub use inventory::DiskPattern;
pub use manager::PartitionManager;
pub use provisioner::provision;
pub use runner::{BoxedRunner, CommandRunner, FakeRunner, HostRunner};
pub use tools::{DiskTools, PrintMode};
