use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{info, warn};

use super::{merged_columns, read_reports, report_record};
use crate::util::ensure_parent_directory;

#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    Merged {
        path: PathBuf,
        files: usize,
        rows: usize,
    },
    NothingToMerge,
}

fn file_pattern(pattern: &str) -> Result<Regex> {
    let (prefix, suffix) = pattern.split_once("{n}").unwrap_or((pattern, ""));
    Regex::new(&format!(
        r"^{}(\d+){}$",
        regex::escape(prefix),
        regex::escape(suffix)
    ))
    .with_context(|| format!("invalid report file pattern: {pattern}"))
}

/// Per-section report files in `dir`, ascending by section number no matter
/// what order the directory listing returns them in. A missing directory
/// holds no reports.
pub(super) fn discover_section_reports(dir: &Path, pattern: &str) -> Result<Vec<(u32, PathBuf)>> {
    let matcher = file_pattern(pattern)?;
    let mut found = Vec::new();

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            warn!(dir = %dir.display(), "report directory does not exist");
            return Ok(found);
        }
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", dir.display()));
        }
    };
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read entry in {}", dir.display()))?;
        let path = entry.path();

        if !entry
            .file_type()
            .with_context(|| format!("failed to inspect file type: {}", path.display()))?
            .is_file()
        {
            continue;
        }

        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        let Some(number) = matcher
            .captures(name)
            .and_then(|captures| captures.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok())
        else {
            continue;
        };

        found.push((number, path));
    }

    found.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    Ok(found)
}

/// Concatenates the given per-section tables under a leading Section Number
/// column. Unreadable files are logged and left out.
pub fn merge_section_reports(entries: &[(u32, PathBuf)], output: &Path) -> Result<MergeOutcome> {
    let mut ordered: Vec<&(u32, PathBuf)> = entries.iter().collect();
    ordered.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

    let mut merged_rows: Vec<Vec<String>> = Vec::new();
    let mut files = 0;

    for (section_number, path) in ordered {
        match read_reports(path) {
            Ok(reports) => {
                files += 1;
                for report in &reports {
                    let mut record = vec![section_number.to_string()];
                    record.extend(report_record(report));
                    merged_rows.push(record);
                }
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping unreadable report");
            }
        }
    }

    if files == 0 {
        warn!(output = %output.display(), "no valid reports to merge");
        return Ok(MergeOutcome::NothingToMerge);
    }

    ensure_parent_directory(output)?;
    let mut writer = csv::Writer::from_path(output)
        .with_context(|| format!("failed to create merged report {}", output.display()))?;
    writer
        .write_record(merged_columns())
        .with_context(|| format!("failed to write header to {}", output.display()))?;
    for record in &merged_rows {
        writer
            .write_record(record)
            .with_context(|| format!("failed to write row to {}", output.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("failed to flush {}", output.display()))?;

    info!(
        path = %output.display(),
        files,
        rows = merged_rows.len(),
        "merged report saved"
    );

    Ok(MergeOutcome::Merged {
        path: output.to_path_buf(),
        files,
        rows: merged_rows.len(),
    })
}

pub fn merge_directory(dir: &Path, pattern: &str, output: &Path) -> Result<MergeOutcome> {
    let entries = discover_section_reports(dir, pattern)?;
    if entries.is_empty() {
        warn!(dir = %dir.display(), pattern, "no section reports found to merge");
        return Ok(MergeOutcome::NothingToMerge);
    }
    merge_section_reports(&entries, output)
}
