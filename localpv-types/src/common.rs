//! Common utility types shared across models

use anyhow::Result;
use num_format::{Locale, ToFormattedString};

/// One mebibyte. Every extent handed to the partitioning tool is aligned to it.
pub const MIB: u64 = 1024 * 1024;

/// Round a byte count down to whole MiB.
pub fn bytes_to_mib_floor(bytes: u64) -> u64 {
    bytes / MIB
}

/// Round a byte offset up to the next MiB boundary.
pub fn bytes_to_mib_ceil(bytes: u64) -> u64 {
    bytes.div_ceil(MIB)
}

/// Convert a MiB count back to bytes, saturating on overflow.
pub fn mib_to_bytes(mib: u64) -> u64 {
    mib.saturating_mul(MIB)
}

/// Format utilities for converting between bytes and human-readable strings
/// Convert bytes to human-readable format (e.g., "1.50 GiB")
pub fn bytes_to_pretty(bytes: &u64, add_bytes: bool) -> String {
    let mut steps = 0;
    let mut val: f64 = *bytes as f64;

    while val >= 1024. && steps < 6 {
        val /= 1024.;
        steps += 1;
    }

    let unit = match steps {
        0 => "B",
        1 => "KiB",
        2 => "MiB",
        3 => "GiB",
        4 => "TiB",
        5 => "PiB",
        _ => "EiB",
    };

    if add_bytes {
        let bytes_str = bytes.to_formatted_string(&Locale::en);
        format!("{:.2} {} ({} bytes)", val, unit, bytes_str)
    } else {
        format!("{:.2} {}", val, unit)
    }
}

/// Parse human-readable format to bytes (e.g., "1.5 GiB" or "512MiB" -> bytes)
pub fn pretty_to_bytes(pretty: &str) -> Result<u64> {
    let trimmed = pretty.trim();
    let split_at = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split_at);

    if number.is_empty() {
        return Err(anyhow::anyhow!("Invalid size: {:?}", pretty));
    }

    let val: f64 = number.parse()?;
    let steps = match unit.trim() {
        "" | "B" => 0,
        "K" | "KiB" | "KB" => 1,
        "M" | "MiB" | "MB" => 2,
        "G" | "GiB" | "GB" => 3,
        "T" | "TiB" | "TB" => 4,
        "P" | "PiB" | "PB" => 5,
        other => return Err(anyhow::anyhow!("Invalid unit: {}", other)),
    };

    Ok((val * 1024_f64.powi(steps)) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mib_rounding() {
        assert_eq!(bytes_to_mib_floor(10 * MIB + 1), 10);
        assert_eq!(bytes_to_mib_ceil(10 * MIB + 1), 11);
        assert_eq!(bytes_to_mib_ceil(10 * MIB), 10);
        assert_eq!(bytes_to_mib_floor(MIB - 1), 0);
    }

    #[test]
    fn pretty_roundtrip_units() {
        assert_eq!(pretty_to_bytes("512MiB").unwrap(), 512 * MIB);
        assert_eq!(pretty_to_bytes("1.5 GiB").unwrap(), 1536 * MIB);
        assert_eq!(pretty_to_bytes("4096").unwrap(), 4096);
        assert!(pretty_to_bytes("ten GiB").is_err());
        assert!(pretty_to_bytes("10 parsecs").is_err());
    }

    #[test]
    fn pretty_formatting() {
        assert_eq!(bytes_to_pretty(&(10 * MIB), false), "10.00 MiB");
        assert_eq!(bytes_to_pretty(&1024, true), "1.00 KiB (1,024 bytes)");
    }
}
