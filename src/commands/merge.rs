use std::io::{self, Write};

use anyhow::Result;
use tracing::{info, warn};

use crate::cli::MergeArgs;
use crate::config::AppConfig;
use crate::report::{MergeOutcome, merge_directory};

pub fn run(args: MergeArgs) -> Result<()> {
    let mut config = AppConfig::load_or_default(args.config.as_deref())?;
    if let Some(output_dir) = args.output_dir {
        config.layout.output_dir = output_dir;
    }
    if let Some(merged_name) = args.merged_name {
        config.layout.merged_name = merged_name;
    }

    let layout = &config.layout;
    let merged_path = layout.merged_path();
    info!(
        dir = %layout.output_dir.display(),
        pattern = %layout.report_pattern,
        output = %merged_path.display(),
        "merging section reports"
    );

    let outcome = merge_directory(&layout.output_dir, &layout.report_pattern, &merged_path)?;

    let mut output = io::BufWriter::new(io::stdout().lock());
    match outcome {
        MergeOutcome::Merged { path, files, rows } => {
            writeln!(
                output,
                "Merged {files} reports ({rows} rows) into {}",
                path.display()
            )?;
        }
        MergeOutcome::NothingToMerge => {
            warn!(dir = %layout.output_dir.display(), "nothing to merge");
            writeln!(
                output,
                "Nothing to merge in {}",
                layout.output_dir.display()
            )?;
        }
    }
    output.flush()?;
    Ok(())
}
