use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("serialise JSON output")?;
    println!("{text}");
    Ok(())
}

/// Read an XML document from disk.
pub fn read_xml(path: &Path) -> Result<String> {
    let text =
        fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    debug!(path = %path.display(), bytes = text.len(), "loaded xml");
    Ok(text)
}

/// `value` or a dash for absent fields in text output.
pub fn or_dash(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

pub fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
