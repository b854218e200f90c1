use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::info;

use crate::cli::{Backend, RunArgs};
use crate::commands::resolve_config;
use crate::config::AppConfig;
use crate::generation::{HttpGenerator, OfflineGenerator, TextGenerator};
use crate::model::{RunSummary, SectionOutcome};
use crate::pipeline::run_configured;

pub fn run(args: RunArgs) -> Result<()> {
    let mut config = resolve_config(&args.layout)?;
    apply_overrides(&mut config, &args);

    let generator: Arc<dyn TextGenerator> = match args.backend {
        Backend::Http => {
            let generator = HttpGenerator::from_env(config.model_params.timeout())?;
            info!(endpoint = generator.endpoint(), "using http generation backend");
            Arc::new(generator)
        }
        Backend::Offline => Arc::new(OfflineGenerator::default()),
    };

    info!(
        backend = args.backend.as_str(),
        section_range = %config.section_range,
        yaml_dir = %config.layout.yaml_dir.display(),
        md_dir = %config.layout.md_dir.display(),
        output_dir = %config.layout.output_dir.display(),
        "starting run command"
    );

    let summary = run_configured(&config, generator)?;

    if args.json {
        write_json_summary(&summary)?;
    } else {
        write_text_summary(&summary)?;
    }

    if summary.merged_report.is_none() && !summary.sections.is_empty() {
        bail!("no section produced a report in run {}", summary.run_id);
    }
    Ok(())
}

fn apply_overrides(config: &mut AppConfig, args: &RunArgs) {
    if let Some(prompt_file) = &args.prompt_file {
        config.prompt_file = Some(prompt_file.clone());
    }
    if let Some(section_range) = &args.section_range {
        config.section_range = section_range.clone();
    }
    if let Some(model) = &args.model {
        config.model_params.model = Some(model.clone());
    }
    if let Some(temperature) = args.temperature {
        config.model_params.temperature = temperature;
    }
    if let Some(max_workers) = args.max_workers {
        config.model_params.max_workers = max_workers;
    }
    if let Some(retry_count) = args.retry_count {
        config.model_params.retry_count = retry_count;
    }
}

fn write_json_summary(summary: &RunSummary) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, summary)
        .context("failed to serialize run summary json")?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}

fn write_text_summary(summary: &RunSummary) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());

    writeln!(output, "Run: {} ({})", summary.run_id, summary.state.as_str())?;
    writeln!(output, "Started: {}", summary.started_at)?;
    writeln!(
        output,
        "Sections: {} requested, {} produced",
        summary.sections.len(),
        summary.produced_count()
    )?;

    for run in &summary.sections {
        match &run.outcome {
            SectionOutcome::Produced {
                reports,
                path,
                unmatched,
            } => {
                writeln!(
                    output,
                    "\t{}\tproduced\t{} rows\t{}",
                    run.section_number,
                    reports,
                    path.display()
                )?;
                for title in unmatched {
                    writeln!(output, "\t\tunmatched\t{title}")?;
                }
            }
            SectionOutcome::Skipped { reason } => {
                writeln!(output, "\t{}\tskipped\t{}", run.section_number, reason)?
            }
            SectionOutcome::Failed { error } => {
                writeln!(output, "\t{}\tfailed\t{}", run.section_number, error)?
            }
        }
    }

    match &summary.merged_report {
        Some(path) => writeln!(output, "Merged report: {}", path.display())?,
        None => writeln!(output, "Merged report: none")?,
    }

    output.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::cli::LayoutArgs;

    #[test]
    fn cli_flags_take_precedence_over_config_values() {
        let mut config = AppConfig::from_yaml(
            "section_range: \"2-3\"\nmodel_params:\n  max_workers: 8\n  temperature: 0.4\n",
        )
        .unwrap();
        let args = RunArgs {
            layout: LayoutArgs::default(),
            prompt_file: Some(PathBuf::from("prompts.yaml")),
            section_range: None,
            model: Some("local-model".to_string()),
            temperature: None,
            max_workers: Some(2),
            retry_count: Some(0),
            backend: Backend::Offline,
            json: false,
        };

        apply_overrides(&mut config, &args);

        assert_eq!(config.section_range, "2-3");
        assert_eq!(config.prompt_file, Some(PathBuf::from("prompts.yaml")));
        assert_eq!(config.model_params.model.as_deref(), Some("local-model"));
        assert!((config.model_params.temperature - 0.4).abs() < f32::EPSILON);
        assert_eq!(config.model_params.max_workers, 2);
        assert_eq!(config.model_params.retry_count, 0);
    }
}
