use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    #[serde(rename = "section", default)]
    pub section_title: String,
    #[serde(rename = "prompt", default)]
    pub prompt_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSection {
    pub id: String,
    pub title: String,
    pub content: String,
    pub requirements: Option<Vec<String>>,
}

impl DocumentSection {
    pub fn requirements_text(&self) -> String {
        self.requirements
            .as_ref()
            .map(|items| items.join("\n"))
            .unwrap_or_default()
    }

    pub fn needs_requirements(&self) -> bool {
        self.requirements.is_none()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationMetric {
    Coherence,
    Quality,
    Capture,
    Hallucination,
}

impl EvaluationMetric {
    pub const ALL: [EvaluationMetric; 4] = [
        Self::Coherence,
        Self::Quality,
        Self::Capture,
        Self::Hallucination,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Coherence => "coherence",
            Self::Quality => "quality",
            Self::Capture => "capture",
            Self::Hallucination => "hallucination",
        }
    }

    /// Hallucination is the only metric where a lower raw score is better.
    pub fn lower_is_better(self) -> bool {
        matches!(self, Self::Hallucination)
    }

    /// Coherence looks at the content alone; the rest compare it against requirements.
    pub fn uses_requirements(self) -> bool {
        !matches!(self, Self::Coherence)
    }

    /// Score as a reader should see it: higher is always better.
    pub fn display_score(self, raw: f64) -> f64 {
        if self.lower_is_better() {
            1.0 - raw
        } else {
            raw
        }
    }

    pub fn score_column(self) -> &'static str {
        match self {
            Self::Coherence => "Coherence Score",
            Self::Quality => "Quality Score",
            Self::Capture => "Capture Rate",
            Self::Hallucination => "Hallucination Score",
        }
    }

    pub fn comment_column(self) -> &'static str {
        match self {
            Self::Coherence => "Coherence Comment",
            Self::Quality => "Quality Comment",
            Self::Capture => "Capture Comment",
            Self::Hallucination => "Hallucination Comment",
        }
    }

    pub fn display_label(self) -> &'static str {
        match self {
            Self::Coherence => "coherence",
            Self::Quality => "quality",
            Self::Capture => "capture",
            Self::Hallucination => "accuracy",
        }
    }
}

impl fmt::Display for EvaluationMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvaluationMetric {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "coherence" => Ok(Self::Coherence),
            "quality" => Ok(Self::Quality),
            "capture" | "capture_rate" => Ok(Self::Capture),
            "hallucination" => Ok(Self::Hallucination),
            _ => bail!("unknown evaluation metric: {raw}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricVerdict {
    pub score: f64,
    pub comment: String,
}

impl MetricVerdict {
    pub fn new(score: f64, comment: impl Into<String>) -> Self {
        Self {
            score: clamp_score(score),
            comment: comment.into(),
        }
    }

    pub fn zero(comment: impl Into<String>) -> Self {
        Self::new(0.0, comment)
    }
}

pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        return 0.0;
    }
    score.clamp(0.0, 1.0)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionReport {
    pub section: DocumentSection,
    pub metrics: BTreeMap<EvaluationMetric, MetricVerdict>,
    pub average_score: f64,
}

impl SectionReport {
    /// Builds a report once all four verdicts are present. The average uses
    /// raw scores, so hallucination is not inverted here.
    pub fn new(
        section: DocumentSection,
        metrics: BTreeMap<EvaluationMetric, MetricVerdict>,
    ) -> Result<Self> {
        for metric in EvaluationMetric::ALL {
            if !metrics.contains_key(&metric) {
                bail!(
                    "section {} is missing a verdict for {}",
                    section.id,
                    metric
                );
            }
        }

        let average_score = average_of(metrics.values().map(|verdict| verdict.score));
        Ok(Self {
            section,
            metrics,
            average_score,
        })
    }

    pub fn verdict(&self, metric: EvaluationMetric) -> Option<&MetricVerdict> {
        self.metrics.get(&metric)
    }
}

pub fn average_of(scores: impl Iterator<Item = f64>) -> f64 {
    let (total, count) = scores.fold((0.0_f64, 0_usize), |(total, count), score| {
        (total + score, count + 1)
    });
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Running,
    Partial,
    Complete,
    Terminal,
}

impl RunState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Partial => "partial",
            Self::Complete => "complete",
            Self::Terminal => "terminal",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SectionOutcome {
    Produced {
        reports: usize,
        path: PathBuf,
        /// Requirement titles with no matching heading in the document.
        unmatched: Vec<String>,
    },
    Skipped { reason: String },
    Failed { error: String },
}

impl SectionOutcome {
    pub fn is_produced(&self) -> bool {
        matches!(self, Self::Produced { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SectionRun {
    pub section_number: u32,
    pub outcome: SectionOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: String,
    pub state: RunState,
    pub sections: Vec<SectionRun>,
    pub merged_report: Option<PathBuf>,
}

impl RunSummary {
    pub fn produced_count(&self) -> usize {
        self.sections
            .iter()
            .filter(|run| run.outcome.is_produced())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section() -> DocumentSection {
        DocumentSection {
            id: "section_1".to_string(),
            title: "Intro".to_string(),
            content: "Body".to_string(),
            requirements: Some(vec!["Describe the scope".to_string()]),
        }
    }

    #[test]
    fn average_keeps_raw_hallucination_score() {
        let metrics = BTreeMap::from([
            (EvaluationMetric::Coherence, MetricVerdict::new(0.8, "a")),
            (EvaluationMetric::Quality, MetricVerdict::new(0.6, "b")),
            (EvaluationMetric::Capture, MetricVerdict::new(0.9, "c")),
            (EvaluationMetric::Hallucination, MetricVerdict::new(0.3, "d")),
        ]);

        let report = SectionReport::new(section(), metrics).expect("four verdicts");
        assert!((report.average_score - 0.65).abs() < 1e-9);
    }

    #[test]
    fn report_requires_all_four_verdicts() {
        let metrics = BTreeMap::from([(EvaluationMetric::Coherence, MetricVerdict::new(1.0, "a"))]);
        assert!(SectionReport::new(section(), metrics).is_err());
    }

    #[test]
    fn verdict_scores_are_clamped() {
        assert_eq!(MetricVerdict::new(1.7, "").score, 1.0);
        assert_eq!(MetricVerdict::new(-0.2, "").score, 0.0);
        assert_eq!(MetricVerdict::new(f64::NAN, "").score, 0.0);
    }

    #[test]
    fn display_score_inverts_only_hallucination() {
        assert_eq!(EvaluationMetric::Quality.display_score(0.3), 0.3);
        assert!((EvaluationMetric::Hallucination.display_score(0.3) - 0.7).abs() < 1e-9);
    }

    #[test]
    fn metric_names_parse_case_insensitively() {
        assert_eq!(
            "Hallucination".parse::<EvaluationMetric>().unwrap(),
            EvaluationMetric::Hallucination
        );
        assert!("style".parse::<EvaluationMetric>().is_err());
    }
}
