use std::fs;
use std::io;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::config::{AppConfig, SectionLayout};
use crate::evaluator::Evaluator;
use crate::generation::{GenerationAdapter, GenerationParams, RetryPolicy, TextGenerator};
use crate::matcher::{log_skipped, match_sections};
use crate::model::{Requirement, RunState, RunSummary, SectionOutcome, SectionRun};
use crate::prompts::PromptSet;
use crate::report::{MergeOutcome, merge_section_reports, write_reports};
use crate::util::{
    ensure_directory, now_utc_string, parse_section_range, read_text, utc_compact_string,
};
use crate::workers::{panic_message, run_bounded};


/// Reads a per-section requirement file: a YAML list of `{section, prompt}`
/// records. An empty file holds no requirements.
pub fn load_requirements(path: &Path) -> Result<Vec<Requirement>> {
    let raw = read_text(path)?;
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_yaml_bw::from_str(&raw)
        .with_context(|| format!("failed to parse requirement file {}", path.display()))
}

/// Checks the configuration, then evaluates its section range with
/// `generator`. A bad range or an unusable prompt file fails here, before any
/// section starts; the merged report in the summary is absent when nothing
/// was produced.
pub fn run_configured(config: &AppConfig, generator: Arc<dyn TextGenerator>) -> Result<RunSummary> {
    let sections = parse_section_range(&config.section_range)?;
    let prompts = match &config.prompt_file {
        Some(path) => PromptSet::load(path)?,
        None => PromptSet::builtin()?,
    };
    for metric in prompts.missing_metrics() {
        warn!(metric = %metric, "no prompt template configured, metric will score zero");
    }

    let params = &config.model_params;
    let adapter = GenerationAdapter::new(generator, RetryPolicy::from_params(params));
    info!(
        backend = adapter.backend(),
        start = sections.start,
        end = sections.end,
        max_workers = params.max_workers,
        retry_count = params.retry_count,
        "pipeline configured"
    );

    let evaluator = Evaluator::new(adapter, prompts, GenerationParams::from(params))?
        .with_metric_workers(params.max_workers);
    PipelineRunner::new(evaluator, config.layout.clone(), params.max_workers).run(sections)
}

#[derive(Debug, Clone)]
pub struct PipelineRunner {
    evaluator: Evaluator,
    layout: SectionLayout,
    max_workers: usize,
}

impl PipelineRunner {
    pub fn new(evaluator: Evaluator, layout: SectionLayout, max_workers: usize) -> Self {
        Self {
            evaluator,
            layout,
            max_workers: max_workers.max(1),
        }
    }

    /// Evaluates every section number in `sections` and merges whatever was
    /// produced. Per-section failures end up in the summary; only output
    /// directory setup can fail the whole call.
    pub fn run(&self, sections: Range<u32>) -> Result<RunSummary> {
        let started_ts = Utc::now();
        let run_id = format!("run-{}", utc_compact_string(started_ts));
        let mut summary = RunSummary {
            run_id,
            started_at: now_utc_string(),
            state: RunState::Pending,
            sections: Vec::new(),
            merged_report: None,
        };
        log_state(&summary);

        if sections.is_empty() {
            warn!(
                start = sections.start,
                end = sections.end,
                "section range is empty, nothing to evaluate"
            );
            self.discard_stale_merge()?;
            summary.state = RunState::Terminal;
            log_state(&summary);
            return Ok(summary);
        }

        ensure_directory(&self.layout.output_dir)?;

        let numbers: Vec<u32> = sections.collect();
        let workers = self.max_workers.min(numbers.len());
        summary.state = RunState::Running;
        info!(
            run_id = %summary.run_id,
            sections = numbers.len(),
            workers,
            output_dir = %self.layout.output_dir.display(),
            "starting evaluation run"
        );
        log_state(&summary);

        let results = run_bounded(&numbers, workers, |_, section_number| {
            self.process_section(*section_number)
        })?;

        for (section_number, result) in numbers.iter().copied().zip(results) {
            let outcome = match result {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(err)) => {
                    let message = format!("{err:#}");
                    error!(section = section_number, error = %message, "section failed");
                    SectionOutcome::Failed { error: message }
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(section = section_number, error = %message, "section panicked");
                    SectionOutcome::Failed { error: message }
                }
            };
            summary.sections.push(SectionRun {
                section_number,
                outcome,
            });
        }

        summary.state = if summary.produced_count() == numbers.len() {
            RunState::Complete
        } else {
            RunState::Partial
        };
        log_state(&summary);

        summary.merged_report = self.merge_produced(&summary.sections);
        if summary.merged_report.is_none() {
            self.discard_stale_merge()?;
        }
        summary.state = RunState::Terminal;
        log_state(&summary);

        match &summary.merged_report {
            Some(path) => info!(
                run_id = %summary.run_id,
                produced = summary.produced_count(),
                merged = %path.display(),
                "evaluation run finished"
            ),
            None => error!(
                run_id = %summary.run_id,
                "evaluation run produced no reports"
            ),
        }

        Ok(summary)
    }

    /// Runs one section end to end. Missing inputs skip the section; any
    /// other problem comes back as an error for the caller to record.
    pub fn process_section(&self, section_number: u32) -> Result<SectionOutcome> {
        let requirement_path = self.layout.requirement_path(section_number);
        let document_path = self.layout.document_path(section_number);

        for path in [&requirement_path, &document_path] {
            if !path.is_file() {
                warn!(section = section_number, path = %path.display(), "input file not found, skipping section");
                return Ok(SectionOutcome::Skipped {
                    reason: format!("missing input file {}", path.display()),
                });
            }
        }

        let requirements = load_requirements(&requirement_path)?;
        let document = read_text(&document_path)?;

        let matched = match_sections(&document, &requirements);
        log_skipped(section_number, &matched.skipped);
        debug!(
            section = section_number,
            resolved = matched.sections.len(),
            skipped = matched.skipped.len(),
            "matched document sections"
        );

        if matched.sections.is_empty() {
            warn!(section = section_number, "no requirement matched document content");
            return Ok(SectionOutcome::Skipped {
                reason: "no requirement matched document content".to_string(),
            });
        }

        let mut reports = Vec::with_capacity(matched.sections.len());
        for section in matched.sections {
            let section = self.evaluator.ensure_requirements(section);
            let report = self
                .evaluator
                .report(section)
                .with_context(|| format!("failed to evaluate section {section_number}"))?;
            info!(
                section = section_number,
                section_id = %report.section.id,
                average = report.average_score,
                "section evaluated"
            );
            reports.push(report);
        }

        let path = self.layout.report_path(section_number);
        write_reports(&reports, &path)?;

        Ok(SectionOutcome::Produced {
            reports: reports.len(),
            path,
            unmatched: matched.skipped,
        })
    }

    fn merge_produced(&self, sections: &[SectionRun]) -> Option<PathBuf> {
        let produced: Vec<(u32, PathBuf)> = sections
            .iter()
            .filter_map(|run| match &run.outcome {
                SectionOutcome::Produced { path, .. } => Some((run.section_number, path.clone())),
                _ => None,
            })
            .collect();

        if produced.is_empty() {
            return None;
        }

        match merge_section_reports(&produced, &self.layout.merged_path()) {
            Ok(MergeOutcome::Merged { path, .. }) => Some(path),
            Ok(MergeOutcome::NothingToMerge) => None,
            Err(err) => {
                error!(error = %err, "failed to merge section reports");
                None
            }
        }
    }

    /// Removes a merged report left behind by an earlier run.
    fn discard_stale_merge(&self) -> Result<()> {
        let path = self.layout.merged_path();
        match fs::remove_file(&path) {
            Ok(()) => {
                warn!(path = %path.display(), "removed merged report from an earlier run");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err)
                .with_context(|| format!("failed to remove stale merged report {}", path.display())),
        }
    }
}

fn log_state(summary: &RunSummary) {
    info!(
        run_id = %summary.run_id,
        state = summary.state.as_str(),
        "run state"
    );
}
