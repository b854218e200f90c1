use std::io::{self, Write};

use anyhow::{Result, bail};
use tracing::info;

use crate::cli::SectionsArgs;
use crate::commands::resolve_config;
use crate::matcher::{HeadingIndex, log_skipped, match_sections};
use crate::pipeline::load_requirements;
use crate::util::read_text;

pub fn run(args: SectionsArgs) -> Result<()> {
    let config = resolve_config(&args.layout)?;
    let requirement_path = config.layout.requirement_path(args.section);
    let document_path = config.layout.document_path(args.section);

    for path in [&requirement_path, &document_path] {
        if !path.is_file() {
            bail!("section {} input not found: {}", args.section, path.display());
        }
    }

    let requirements = load_requirements(&requirement_path)?;
    let document = read_text(&document_path)?;
    let index = HeadingIndex::parse(&document);
    let headings: Vec<&str> = index.titles().collect();
    let matched = match_sections(&document, &requirements);
    log_skipped(args.section, &matched.skipped);

    info!(
        section = args.section,
        headings = headings.len(),
        requirements = requirements.len(),
        resolved = matched.sections.len(),
        skipped = matched.skipped.len(),
        "matched section document"
    );

    let mut output = io::BufWriter::new(io::stdout().lock());
    writeln!(output, "Requirements: {}", requirement_path.display())?;
    writeln!(output, "Document: {}", document_path.display())?;
    writeln!(output, "Headings: {}", headings.join(" | "))?;

    for section in &matched.sections {
        let requirements = match &section.requirements {
            Some(items) => format!("{} given", items.len()),
            None => "to generate".to_string(),
        };
        writeln!(
            output,
            "resolved\t{}\t{}\t{} chars\trequirements {}",
            section.id,
            section.title,
            section.content.chars().count(),
            requirements
        )?;
    }
    for title in &matched.skipped {
        writeln!(output, "skipped\t\t{title}")?;
    }

    output.flush()?;
    Ok(())
}
