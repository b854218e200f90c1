use std::collections::BTreeSet;

use serde::Serialize;

use super::MergedRow;
use crate::model::{EvaluationMetric, average_of};

#[derive(Debug, Clone, Serialize)]
pub struct WeakestRow {
    pub section_number: u32,
    pub section_title: String,
    pub score: f64,
    pub comment: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricSummary {
    pub metric: EvaluationMetric,
    pub label: &'static str,
    pub mean_raw: f64,
    pub display_mean: f64,
    pub band: &'static str,
    pub lower_is_better: bool,
    pub weakest: Option<WeakestRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    pub rows: usize,
    pub sections: usize,
    pub mean_average_score: f64,
    pub overall_display: f64,
    pub overall_band: &'static str,
    pub metrics: Vec<MetricSummary>,
}

pub fn score_band(score: f64) -> &'static str {
    if score > 0.8 {
        "excellent"
    } else if score > 0.6 {
        "good"
    } else if score > 0.4 {
        "fair"
    } else if score > 0.2 {
        "weak"
    } else {
        "poor"
    }
}

/// Per-metric means with hallucination inverted for display only; the stored
/// row averages stay raw.
pub fn summarize(rows: &[MergedRow]) -> Option<ReportSummary> {
    if rows.is_empty() {
        return None;
    }

    let metrics: Vec<MetricSummary> = EvaluationMetric::ALL
        .into_iter()
        .map(|metric| summarize_metric(rows, metric))
        .collect();

    let overall_display = average_of(metrics.iter().map(|summary| summary.display_mean));
    let sections: BTreeSet<u32> = rows.iter().map(|row| row.section_number).collect();

    Some(ReportSummary {
        rows: rows.len(),
        sections: sections.len(),
        mean_average_score: average_of(rows.iter().map(|row| row.report.average_score)),
        overall_display,
        overall_band: score_band(overall_display),
        metrics,
    })
}

fn summarize_metric(rows: &[MergedRow], metric: EvaluationMetric) -> MetricSummary {
    let scored: Vec<(&MergedRow, f64)> = rows
        .iter()
        .filter_map(|row| {
            row.report
                .verdict(metric)
                .map(|verdict| (row, verdict.score))
        })
        .collect();

    let mean_raw = average_of(scored.iter().map(|(_, score)| *score));
    let display_mean = metric.display_score(mean_raw);

    let mut weakest: Option<(&MergedRow, f64)> = None;
    for (row, score) in &scored {
        let worse = match weakest {
            None => true,
            Some((_, current)) if metric.lower_is_better() => *score > current,
            Some((_, current)) => *score < current,
        };
        if worse {
            weakest = Some((*row, *score));
        }
    }

    MetricSummary {
        metric,
        label: metric.display_label(),
        mean_raw,
        display_mean,
        band: score_band(display_mean),
        lower_is_better: metric.lower_is_better(),
        weakest: weakest.map(|(row, score)| WeakestRow {
            section_number: row.section_number,
            section_title: row.report.section.title.clone(),
            score,
            comment: row
                .report
                .verdict(metric)
                .map(|verdict| verdict.comment.clone())
                .unwrap_or_default(),
        }),
    }
}
