//! Human-readable byte sizes for command line flags (`512KiB`, `2MB`, `1.5M`).
//!
//! Units are binary throughout: `K`, `KB` and `KiB` all mean 1024 bytes.

use crate::{Error, Result};

const UNITS: &[(&str, u64)] = &[
    ("", 1),
    ("b", 1),
    ("k", 1 << 10),
    ("kb", 1 << 10),
    ("kib", 1 << 10),
    ("m", 1 << 20),
    ("mb", 1 << 20),
    ("mib", 1 << 20),
    ("g", 1 << 30),
    ("gb", 1 << 30),
    ("gib", 1 << 30),
];

/// Parse a byte size such as `2MiB` into a number of bytes.
pub fn parse_byte_size(input: &str) -> Result<u64> {
    let input = input.trim();
    let split = input
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(input.len());
    let (number, unit) = input.split_at(split);

    let number: f64 = number
        .parse()
        .map_err(|_| Error::config(format!("invalid byte size `{input}`")))?;
    let unit = unit.trim().to_ascii_lowercase();
    let multiplier = UNITS
        .iter()
        .find(|(name, _)| *name == unit)
        .map(|(_, m)| *m)
        .ok_or_else(|| Error::config(format!("unknown size unit in `{input}`")))?;

    let bytes = number * multiplier as f64;
    if !bytes.is_finite() || bytes > u64::MAX as f64 {
        return Err(Error::config(format!("byte size `{input}` is out of range")));
    }
    Ok(bytes.round() as u64)
}
