// SPDX-License-Identifier: GPL-3.0-only

pub mod discovery;
pub mod volume;

pub use discovery::DiskDiscovery;
pub use volume::VolumeProvisioner;
