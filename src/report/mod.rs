use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{Context, Result, bail};
use csv::StringRecord;
use tracing::info;

use crate::model::{DocumentSection, EvaluationMetric, MetricVerdict, SectionReport};
use crate::util::ensure_parent_directory;

mod merge;
mod summary;
#[cfg(test)]
mod tests;

pub use merge::{MergeOutcome, merge_directory, merge_section_reports};
pub use summary::{MetricSummary, ReportSummary, WeakestRow, score_band, summarize};

pub const SECTION_NUMBER_COLUMN: &str = "Section Number";
const SECTION_ID_COLUMN: &str = "Section ID";
const SECTION_TITLE_COLUMN: &str = "Section Title";
const CONTENT_COLUMN: &str = "Content";
const REQUIREMENTS_COLUMN: &str = "Requirements";
const AVERAGE_COLUMN: &str = "Average Score";

/// Fixed column order of a per-section report.
pub fn report_columns() -> Vec<&'static str> {
    let mut columns = vec![
        SECTION_ID_COLUMN,
        SECTION_TITLE_COLUMN,
        CONTENT_COLUMN,
        REQUIREMENTS_COLUMN,
    ];
    for metric in EvaluationMetric::ALL {
        columns.push(metric.score_column());
        columns.push(metric.comment_column());
    }
    columns.push(AVERAGE_COLUMN);
    columns
}

pub fn merged_columns() -> Vec<&'static str> {
    let mut columns = vec![SECTION_NUMBER_COLUMN];
    columns.extend(report_columns());
    columns
}

/// A report row read back from a merged table.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRow {
    pub section_number: u32,
    pub report: SectionReport,
}

/// Header name to position, so tables are read by name rather than order.
struct ColumnIndex {
    positions: HashMap<String, usize>,
}

impl ColumnIndex {
    fn new(headers: &StringRecord, required: &[&str]) -> Result<Self> {
        let positions: HashMap<String, usize> = headers
            .iter()
            .enumerate()
            .map(|(index, name)| (name.trim().to_string(), index))
            .collect();

        for name in required {
            if !positions.contains_key(*name) {
                bail!("report is missing column '{name}'");
            }
        }

        Ok(Self { positions })
    }

    fn get<'r>(&self, record: &'r StringRecord, name: &str) -> Result<&'r str> {
        let index = self
            .positions
            .get(name)
            .with_context(|| format!("unknown column '{name}'"))?;
        Ok(record.get(*index).unwrap_or_default())
    }

    fn score(&self, record: &StringRecord, name: &str) -> Result<f64> {
        let raw = self.get(record, name)?.trim();
        if raw.is_empty() {
            return Ok(0.0);
        }
        raw.parse::<f64>()
            .with_context(|| format!("invalid score '{raw}' in column '{name}'"))
    }
}

fn report_record(report: &SectionReport) -> Vec<String> {
    let mut record = vec![
        report.section.id.clone(),
        report.section.title.clone(),
        report.section.content.clone(),
        report.section.requirements_text(),
    ];
    for metric in EvaluationMetric::ALL {
        match report.verdict(metric) {
            Some(verdict) => {
                record.push(verdict.score.to_string());
                record.push(verdict.comment.clone());
            }
            None => {
                record.push(String::new());
                record.push(String::new());
            }
        }
    }
    record.push(report.average_score.to_string());
    record
}

fn parse_report(record: &StringRecord, columns: &ColumnIndex) -> Result<SectionReport> {
    // Every written row was evaluated, so an empty cell is an empty list.
    // Requirements are newline-joined; one containing a newline reads back
    // as several.
    let requirements_raw = columns.get(record, REQUIREMENTS_COLUMN)?;
    let requirements = if requirements_raw.is_empty() {
        Vec::new()
    } else {
        requirements_raw.split('\n').map(ToOwned::to_owned).collect()
    };

    let section = DocumentSection {
        id: columns.get(record, SECTION_ID_COLUMN)?.to_string(),
        title: columns.get(record, SECTION_TITLE_COLUMN)?.to_string(),
        content: columns.get(record, CONTENT_COLUMN)?.to_string(),
        requirements: Some(requirements),
    };

    let mut metrics = BTreeMap::new();
    for metric in EvaluationMetric::ALL {
        let score = columns.score(record, metric.score_column())?;
        let comment = columns.get(record, metric.comment_column())?;
        metrics.insert(metric, MetricVerdict::new(score, comment));
    }

    Ok(SectionReport {
        section,
        metrics,
        average_score: columns.score(record, AVERAGE_COLUMN)?,
    })
}

/// Writes one row per report. Every report must already carry four verdicts.
pub fn write_reports(reports: &[SectionReport], path: &Path) -> Result<()> {
    for report in reports {
        if report.metrics.len() != EvaluationMetric::ALL.len() {
            bail!(
                "refusing to write section {} with {} of {} verdicts",
                report.section.id,
                report.metrics.len(),
                EvaluationMetric::ALL.len()
            );
        }
    }

    ensure_parent_directory(path)?;
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create report {}", path.display()))?;

    writer
        .write_record(report_columns())
        .with_context(|| format!("failed to write header to {}", path.display()))?;
    for report in reports {
        writer
            .write_record(report_record(report))
            .with_context(|| format!("failed to write row to {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("failed to flush {}", path.display()))?;

    info!(path = %path.display(), rows = reports.len(), "report saved");
    Ok(())
}

pub fn read_reports(path: &Path) -> Result<Vec<SectionReport>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open report {}", path.display()))?;
    let headers = reader
        .headers()
        .with_context(|| format!("failed to read header of {}", path.display()))?
        .clone();
    let columns = ColumnIndex::new(&headers, &report_columns())
        .with_context(|| format!("unexpected layout in {}", path.display()))?;

    let mut reports = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record =
            record.with_context(|| format!("failed to read row {} of {}", row + 1, path.display()))?;
        reports.push(
            parse_report(&record, &columns)
                .with_context(|| format!("invalid row {} in {}", row + 1, path.display()))?,
        );
    }
    Ok(reports)
}

pub fn read_merged(path: &Path) -> Result<Vec<MergedRow>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open merged report {}", path.display()))?;
    let headers = reader
        .headers()
        .with_context(|| format!("failed to read header of {}", path.display()))?
        .clone();
    let columns = ColumnIndex::new(&headers, &merged_columns())
        .with_context(|| format!("unexpected layout in {}", path.display()))?;

    let mut rows = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record =
            record.with_context(|| format!("failed to read row {} of {}", row + 1, path.display()))?;
        let raw_number = columns.get(&record, SECTION_NUMBER_COLUMN)?.trim();
        let section_number = raw_number
            .parse::<u32>()
            .with_context(|| format!("invalid section number '{raw_number}' in {}", path.display()))?;
        rows.push(MergedRow {
            section_number,
            report: parse_report(&record, &columns)
                .with_context(|| format!("invalid row {} in {}", row + 1, path.display()))?,
        });
    }
    Ok(rows)
}
