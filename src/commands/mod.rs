pub mod merge;
pub mod run;
pub mod sections;
pub mod summary;

use anyhow::Result;

use crate::cli::LayoutArgs;
use crate::config::AppConfig;

/// Defaults, then the config file, then any directory flags given.
fn resolve_config(args: &LayoutArgs) -> Result<AppConfig> {
    let mut config = AppConfig::load_or_default(args.config.as_deref())?;

    if let Some(yaml_dir) = &args.yaml_dir {
        config.layout.yaml_dir = yaml_dir.clone();
    }
    if let Some(md_dir) = &args.md_dir {
        config.layout.md_dir = md_dir.clone();
    }
    if let Some(output_dir) = &args.output_dir {
        config.layout.output_dir = output_dir.clone();
    }

    Ok(config)
}
