use std::io::{self, Write};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::SummaryArgs;
use crate::report::{ReportSummary, read_merged, summarize};

pub fn run(args: SummaryArgs) -> Result<()> {
    let rows = read_merged(&args.report)?;
    info!(path = %args.report.display(), rows = rows.len(), "loaded merged report");

    let Some(summary) = summarize(&rows) else {
        warn!(path = %args.report.display(), "merged report has no rows");
        return Ok(());
    };

    if args.json {
        let mut output = io::BufWriter::new(io::stdout().lock());
        serde_json::to_writer_pretty(&mut output, &summary)
            .context("failed to serialize summary json")?;
        writeln!(output)?;
        output.flush()?;
        return Ok(());
    }

    write_text_summary(&summary)
}

fn write_text_summary(summary: &ReportSummary) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());

    writeln!(
        output,
        "Rows: {}\tSections: {}",
        summary.rows, summary.sections
    )?;
    writeln!(
        output,
        "Overall: {:.3} ({})\tmean average score: {:.3}",
        summary.overall_display, summary.overall_band, summary.mean_average_score
    )?;

    for metric in &summary.metrics {
        writeln!(
            output,
            "{:<14}display={:.3} ({})\traw mean={:.3}{}",
            metric.label,
            metric.display_mean,
            metric.band,
            metric.mean_raw,
            if metric.lower_is_better {
                " (lower is better)"
            } else {
                ""
            }
        )?;
        if let Some(weakest) = &metric.weakest {
            writeln!(
                output,
                "\tweakest: section {} \"{}\" score={:.3}",
                weakest.section_number, weakest.section_title, weakest.score
            )?;
        }
    }

    output.flush()?;
    Ok(())
}
