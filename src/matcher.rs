use std::collections::HashMap;

use tracing::warn;

use crate::model::{DocumentSection, Requirement};

/// Heading text and body of every `## ` block, in document order.
///
/// A repeated heading keeps the position of its first occurrence but takes
/// the body of its last one.
#[derive(Debug, Clone, Default)]
pub struct HeadingIndex<'a> {
    entries: Vec<(&'a str, &'a str)>,
}

impl<'a> HeadingIndex<'a> {
    pub fn parse(document: &'a str) -> Self {
        let mut entries: Vec<(&'a str, &'a str)> = Vec::new();
        let mut positions: HashMap<&'a str, usize> = HashMap::new();
        let mut open: Option<(&'a str, usize)> = None;
        let mut offset = 0;

        for line in document.split_inclusive('\n') {
            let line_start = offset;
            offset += line.len();

            let Some(title) = heading_title(line) else {
                continue;
            };

            if let Some((previous, body_start)) = open.take() {
                push_entry(
                    &mut entries,
                    &mut positions,
                    previous,
                    document[body_start..line_start].trim(),
                );
            }
            open = Some((title, offset));
        }

        if let Some((previous, body_start)) = open {
            push_entry(
                &mut entries,
                &mut positions,
                previous,
                document[body_start..].trim(),
            );
        }

        Self { entries }
    }

    pub fn titles(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.entries.iter().map(|(title, _)| *title)
    }

    fn exact(&self, title: &str) -> Option<&'a str> {
        self.entries
            .iter()
            .find(|(heading, _)| *heading == title)
            .map(|(_, body)| *body)
    }

    fn containing(&self, title: &str) -> Option<&'a str> {
        self.entries
            .iter()
            .filter(|(heading, _)| !heading.is_empty())
            .find(|(heading, _)| heading.contains(title) || title.contains(*heading))
            .map(|(_, body)| *body)
    }

    /// Exact title first, then the first heading that contains the title or
    /// is contained by it.
    pub fn resolve(&self, title: &str) -> Option<&'a str> {
        let title = title.trim();
        if title.is_empty() {
            return None;
        }
        self.exact(title).or_else(|| self.containing(title))
    }
}

fn push_entry<'a>(
    entries: &mut Vec<(&'a str, &'a str)>,
    positions: &mut HashMap<&'a str, usize>,
    title: &'a str,
    body: &'a str,
) {
    match positions.get(title) {
        Some(&index) => entries[index].1 = body,
        None => {
            positions.insert(title, entries.len());
            entries.push((title, body));
        }
    }
}

fn heading_title(line: &str) -> Option<&str> {
    let line = line.trim_end_matches(['\n', '\r']);
    let rest = line.strip_prefix("## ")?;
    Some(rest.trim())
}

#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    pub sections: Vec<DocumentSection>,
    pub skipped: Vec<String>,
}

/// Pairs requirement entries with document content. Unresolved titles land in
/// `skipped`; nothing is ever invented for them.
pub fn match_sections(document: &str, requirements: &[Requirement]) -> MatchOutcome {
    let index = HeadingIndex::parse(document);
    let mut outcome = MatchOutcome::default();

    for requirement in requirements {
        let title = requirement.section_title.trim();
        let Some(content) = index.resolve(title) else {
            outcome.skipped.push(requirement.section_title.clone());
            continue;
        };

        let prompt = requirement.prompt_text.trim();
        outcome.sections.push(DocumentSection {
            id: format!("section_{}", outcome.sections.len() + 1),
            title: title.to_string(),
            content: content.to_string(),
            requirements: if prompt.is_empty() {
                None
            } else {
                Some(vec![prompt.to_string()])
            },
        });
    }

    outcome
}

pub fn log_skipped(section_number: u32, skipped: &[String]) {
    for title in skipped {
        warn!(
            section = section_number,
            title = %title,
            "no document content matched requirement"
        );
    }
}
