//! Address sample files for `typekey measure`.
//!
//! One address per line, hex (`0x` prefix) or decimal. `#` starts a comment.

use anyhow::{anyhow, Result};
use typekey_core::TypeIdentityPtr;

/// Maximum sample file size in bytes (1MB)
pub const MAX_SAMPLE_SIZE: usize = 1_000_000;

pub fn parse_samples(text: &str) -> Result<Vec<TypeIdentityPtr>> {
    if text.len() > MAX_SAMPLE_SIZE {
        return Err(anyhow!(
            "sample file exceeds {}MB limit ({} bytes)",
            MAX_SAMPLE_SIZE / 1_000_000,
            text.len()
        ));
    }
    let mut samples = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let addr = parse_addr(line)
            .ok_or_else(|| anyhow!("line {}: '{}' is not an address", lineno + 1, line))?;
        samples.push(TypeIdentityPtr::from_addr(addr));
    }
    Ok(samples)
}

pub fn parse_addr(text: &str) -> Option<u64> {
    let text = text.trim().replace('_', "");
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}
