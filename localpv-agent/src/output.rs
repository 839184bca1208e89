// SPDX-License-Identifier: GPL-3.0-only

use anyhow::Result;
use localpv_types::{Device, DiskDetail, UsedPartition, bytes_to_pretty};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Text,
    Json,
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn disk_lines(disks: &[DiskDetail]) -> Vec<String> {
    disks
        .iter()
        .map(|d| {
            format!(
                "{:<12} {:<5} {}",
                d.dev_node(),
                d.device_type.as_str(),
                bytes_to_pretty(&d.size_bytes, false)
            )
        })
        .collect()
}

pub fn inventory_lines(devices: &[Device]) -> Vec<String> {
    devices
        .iter()
        .map(|d| {
            format!(
                "{:<20} {}  size {}  largest free {}",
                d.name,
                d.uuid,
                bytes_to_pretty(&d.size, false),
                bytes_to_pretty(&d.free, false)
            )
        })
        .collect()
}

pub fn volume_lines(volumes: &[UsedPartition]) -> Vec<String> {
    volumes
        .iter()
        .map(|v| {
            format!(
                "{:<24} {:<16} {}",
                v.name,
                v.device_path,
                bytes_to_pretty(&v.size_bytes, false)
            )
        })
        .collect()
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{line}");
    }
}

pub fn print_disks(format: Format, disks: &[DiskDetail]) -> Result<()> {
    match format {
        Format::Json => print_json(disks),
        Format::Text => {
            print_lines(disk_lines(disks));
            Ok(())
        }
    }
}

pub fn print_inventory(format: Format, devices: &[Device]) -> Result<()> {
    match format {
        Format::Json => print_json(devices),
        Format::Text => {
            print_lines(inventory_lines(devices));
            Ok(())
        }
    }
}

pub fn print_volumes(format: Format, volumes: &[UsedPartition]) -> Result<()> {
    match format {
        Format::Json => print_json(volumes),
        Format::Text => {
            print_lines(volume_lines(volumes));
            Ok(())
        }
    }
}

#[derive(Serialize)]
struct VolumePath<'a> {
    name: &'a str,
    device_path: &'a str,
}

pub fn print_path(format: Format, name: &str, device_path: &str) -> Result<()> {
    match format {
        Format::Json => print_json(&VolumePath { name, device_path }),
        Format::Text => {
            println!("{device_path}");
            Ok(())
        }
    }
}
