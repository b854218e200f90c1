use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result, bail};
use regex::Regex;
use serde::Deserialize;
use tracing::{info, warn};

use crate::model::EvaluationMetric;
use crate::util::read_text;

const COHERENCE_PROMPT: &str = "Evaluate the following output for coherence and clarity:

Output: {content}

Criteria:
- Does the output maintain a clear logical flow?
- Is it easy to understand?
- Is terminology used consistently?

Provide:
- Score: A number between 0.0 and 1.0
- Brief explanation for your score";

const QUALITY_PROMPT: &str = "Evaluate the quality of the following output:

Output: {content}
Requirements: {requirements}

Criteria:
- Does the output address all requirements?
- Is the information accurate and relevant?
- Is the content sufficiently detailed?

Provide:
- Score: A number between 0.0 and 1.0
- Brief explanation for your score";

const CAPTURE_PROMPT: &str = "Evaluate the capture rate of the following output:

Output: {content}
Requirements: {requirements}

Calculate what percentage of the requirements are addressed.

Provide:
- Score: A decimal between 0.0 and 1.0 representing the capture rate
- Brief explanation listing which requirements were captured";

const HALLUCINATION_PROMPT: &str = "Evaluate the following output for hallucinations:

Output: {content}
Requirements: {requirements}

Check if the output contains fabricated or unsubstantiated information.

Provide:
- Score: A number between 0.0 and 1.0 (0.0 = no hallucinations)
- Brief explanation identifying specific hallucinations if any";

const REQUIREMENTS_PROMPT: &str = "Generate specific requirements for documentation about:

Title: {title}

The documentation should be evaluated on:
- Coherence and clarity
- Completeness of information
- Relevance to the topic
- Absence of fabricated information

List 3-5 specific requirements that should be met, separated by newlines.";

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{|\}\}|\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid placeholder regex")
});

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Variable {
    Content,
    Requirements,
    Title,
}

impl Variable {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "content" => Some(Self::Content),
            "requirements" => Some(Self::Requirements),
            "title" => Some(Self::Title),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Requirements => "requirements",
            Self::Title => "title",
        }
    }
}

/// What a template is for, which fixes the placeholders it must and may use.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TemplateKind {
    Metric(EvaluationMetric),
    Requirements,
}

impl TemplateKind {
    fn required(self) -> &'static [Variable] {
        match self {
            Self::Metric(metric) if metric.uses_requirements() => {
                &[Variable::Content, Variable::Requirements]
            }
            Self::Metric(_) => &[Variable::Content],
            Self::Requirements => &[Variable::Title],
        }
    }

    fn allowed(self) -> &'static [Variable] {
        match self {
            Self::Metric(_) => &[Variable::Content, Variable::Requirements, Variable::Title],
            Self::Requirements => &[Variable::Title, Variable::Content],
        }
    }

    fn label(self) -> String {
        match self {
            Self::Metric(metric) => format!("{metric} prompt"),
            Self::Requirements => "requirements prompt".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Slot(Variable),
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateVars<'a> {
    pub content: &'a str,
    pub requirements: &'a str,
    pub title: &'a str,
}

impl TemplateVars<'_> {
    fn value(&self, variable: Variable) -> &str {
        match variable {
            Variable::Content => self.content,
            Variable::Requirements => self.requirements,
            Variable::Title => self.title,
        }
    }
}

/// A template checked at load time and pre-split into literal and slot
/// segments, so rendering cannot fail.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
}

impl PromptTemplate {
    /// `{{` and `}}` stand for literal braces; `{name}` is a placeholder.
    pub fn parse(kind: TemplateKind, text: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut seen = Vec::<Variable>::new();
        let mut literal = String::new();
        let mut cursor = 0;

        for captures in PLACEHOLDER.captures_iter(text) {
            let whole = captures.get(0).context("missing placeholder match")?;
            literal.push_str(&text[cursor..whole.start()]);
            cursor = whole.end();

            let Some(name) = captures.get(1).map(|m| m.as_str()) else {
                literal.push_str(&whole.as_str()[..1]);
                continue;
            };
            let Some(variable) = Variable::from_name(name) else {
                bail!("{} uses unknown placeholder {{{name}}}", kind.label());
            };
            if !kind.allowed().contains(&variable) {
                bail!(
                    "{} may not use placeholder {{{}}}",
                    kind.label(),
                    variable.name()
                );
            }

            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Slot(variable));
            seen.push(variable);
        }

        literal.push_str(&text[cursor..]);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        for variable in kind.required() {
            if !seen.contains(variable) {
                bail!(
                    "{} is missing required placeholder {{{}}}",
                    kind.label(),
                    variable.name()
                );
            }
        }

        Ok(Self { segments })
    }

    pub fn render(&self, vars: &TemplateVars<'_>) -> String {
        let mut rendered = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => rendered.push_str(text),
                Segment::Slot(variable) => rendered.push_str(vars.value(*variable)),
            }
        }
        rendered
    }
}

#[derive(Debug, Deserialize)]
struct PromptFile {
    #[serde(default)]
    evaluation_prompts: Vec<PromptEntry>,
    #[serde(default)]
    requirements_prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PromptEntry {
    #[serde(alias = "section")]
    metric: String,
    prompt: String,
}

#[derive(Debug, Clone)]
pub struct PromptSet {
    metrics: BTreeMap<EvaluationMetric, PromptTemplate>,
    requirements: PromptTemplate,
}

impl PromptSet {
    pub fn builtin() -> Result<Self> {
        let metrics = BTreeMap::from([
            (
                EvaluationMetric::Coherence,
                PromptTemplate::parse(
                    TemplateKind::Metric(EvaluationMetric::Coherence),
                    COHERENCE_PROMPT,
                )?,
            ),
            (
                EvaluationMetric::Quality,
                PromptTemplate::parse(
                    TemplateKind::Metric(EvaluationMetric::Quality),
                    QUALITY_PROMPT,
                )?,
            ),
            (
                EvaluationMetric::Capture,
                PromptTemplate::parse(
                    TemplateKind::Metric(EvaluationMetric::Capture),
                    CAPTURE_PROMPT,
                )?,
            ),
            (
                EvaluationMetric::Hallucination,
                PromptTemplate::parse(
                    TemplateKind::Metric(EvaluationMetric::Hallucination),
                    HALLUCINATION_PROMPT,
                )?,
            ),
        ]);

        Ok(Self {
            metrics,
            requirements: PromptTemplate::parse(TemplateKind::Requirements, REQUIREMENTS_PROMPT)?,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = read_text(path)?;
        let set = Self::from_yaml(&raw)
            .with_context(|| format!("invalid prompt file {}", path.display()))?;
        info!(
            path = %path.display(),
            metrics = set.metrics.len(),
            "loaded prompt templates"
        );
        Ok(set)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        let file: PromptFile =
            serde_yaml_bw::from_str(raw).context("failed to parse prompt yaml")?;

        let mut metrics = BTreeMap::new();
        for entry in file.evaluation_prompts {
            let metric = entry.metric.parse::<EvaluationMetric>()?;
            let template = PromptTemplate::parse(TemplateKind::Metric(metric), &entry.prompt)?;
            if metrics.insert(metric, template).is_some() {
                warn!(metric = %metric, "duplicate prompt template, last one wins");
            }
        }

        if metrics.is_empty() {
            bail!("prompt file defines no evaluation prompts");
        }

        let requirements = match file.requirements_prompt {
            Some(text) => PromptTemplate::parse(TemplateKind::Requirements, &text)?,
            None => PromptTemplate::parse(TemplateKind::Requirements, REQUIREMENTS_PROMPT)?,
        };

        Ok(Self {
            metrics,
            requirements,
        })
    }

    pub fn metric(&self, metric: EvaluationMetric) -> Option<&PromptTemplate> {
        self.metrics.get(&metric)
    }

    pub fn requirements(&self) -> &PromptTemplate {
        &self.requirements
    }

    pub fn missing_metrics(&self) -> Vec<EvaluationMetric> {
        EvaluationMetric::ALL
            .into_iter()
            .filter(|metric| !self.metrics.contains_key(metric))
            .collect()
    }
}
