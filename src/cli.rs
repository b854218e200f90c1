use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "doceval",
    version,
    about = "Score documentation sections against requirement prompts with an LLM"
)]
pub struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Evaluate a range of sections and merge the per-section reports.
    Run(RunArgs),
    /// Merge existing per-section reports from an output directory.
    Merge(MergeArgs),
    /// Summarize a merged report per metric.
    Summary(SummaryArgs),
    /// Show which requirement titles resolve against a section's document.
    Sections(SectionsArgs),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum Backend {
    Http,
    Offline,
}

impl Backend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Offline => "offline",
        }
    }
}

/// Directory and file options shared by commands that read section inputs.
#[derive(Args, Debug, Clone, Default)]
pub struct LayoutArgs {
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub yaml_dir: Option<PathBuf>,

    #[arg(long)]
    pub md_dir: Option<PathBuf>,

    #[arg(long)]
    pub output_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub layout: LayoutArgs,

    #[arg(long)]
    pub prompt_file: Option<PathBuf>,

    /// Inclusive range such as "1-5", or a single section number.
    #[arg(long)]
    pub section_range: Option<String>,

    #[arg(long)]
    pub model: Option<String>,

    #[arg(long)]
    pub temperature: Option<f32>,

    #[arg(long)]
    pub max_workers: Option<usize>,

    #[arg(long)]
    pub retry_count: Option<u32>,

    #[arg(long, value_enum, default_value_t = Backend::Http)]
    pub backend: Backend,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct MergeArgs {
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    #[arg(long)]
    pub merged_name: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct SummaryArgs {
    #[arg(long)]
    pub report: PathBuf,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SectionsArgs {
    #[command(flatten)]
    pub layout: LayoutArgs,

    #[arg(long)]
    pub section: u32,
}
