use std::fs;
use std::ops::Range;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, SecondsFormat, Utc};

pub fn now_utc_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn utc_compact_string(ts: DateTime<Utc>) -> String {
    ts.format("%Y%m%dT%H%M%SZ").to_string()
}

pub fn ensure_directory(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .with_context(|| format!("failed to create directory: {}", path.display()))
}

pub fn ensure_parent_directory(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_directory(parent),
        _ => Ok(()),
    }
}

pub fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

/// Parses `"a-b"` (inclusive) or `"n"` into a half-open range.
pub fn parse_section_range(raw: &str) -> Result<Range<u32>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        bail!("section range is empty");
    }

    if let Some((start, end)) = trimmed.split_once('-') {
        let start = start
            .trim()
            .parse::<u32>()
            .with_context(|| format!("invalid section range start: {raw}"))?;
        let end = end
            .trim()
            .parse::<u32>()
            .with_context(|| format!("invalid section range end: {raw}"))?;
        if end < start {
            bail!("section range end precedes start: {raw}");
        }
        let stop = end
            .checked_add(1)
            .with_context(|| format!("section range end too large: {raw}"))?;
        return Ok(start..stop);
    }

    let section = trimmed
        .parse::<u32>()
        .with_context(|| format!("invalid section number: {raw}"))?;
    let stop = section
        .checked_add(1)
        .with_context(|| format!("section number too large: {raw}"))?;
    Ok(section..stop)
}

/// Substitutes `{n}` in a file name pattern with the section number.
pub fn section_file_name(pattern: &str, section_number: u32) -> String {
    pattern.replace("{n}", &section_number.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_section_range_treats_end_as_inclusive() {
        assert_eq!(parse_section_range("1-5").unwrap(), 1..6);
        assert_eq!(parse_section_range(" 3 ").unwrap(), 3..4);
        assert_eq!(parse_section_range("2 - 4").unwrap(), 2..5);
    }

    #[test]
    fn parse_section_range_rejects_garbage() {
        assert!(parse_section_range("").is_err());
        assert!(parse_section_range("a-b").is_err());
        assert!(parse_section_range("5-1").is_err());
    }

    #[test]
    fn parse_section_range_rejects_bounds_past_u32_max() {
        let max = u32::MAX.to_string();
        assert!(parse_section_range(&max).is_err());
        assert!(parse_section_range(&format!("1-{max}")).is_err());
        assert_eq!(
            parse_section_range(&format!("1-{}", u32::MAX - 1)).unwrap(),
            1..u32::MAX
        );
    }

    #[test]
    fn section_file_name_substitutes_number() {
        assert_eq!(section_file_name("odd{n}.yaml", 4), "odd4.yaml");
        assert_eq!(
            section_file_name("ODD_Section_{n}_short.md", 12),
            "ODD_Section_12_short.md"
        );
    }
}
