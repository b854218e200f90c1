use std::collections::BTreeMap;

use anyhow::Result;
use tracing::{debug, warn};

use crate::generation::{GenerationAdapter, GenerationParams, is_error_marker};
use crate::model::{DocumentSection, EvaluationMetric, MetricVerdict, SectionReport};
use crate::parser::ResponseParser;
use crate::prompts::{PromptSet, TemplateVars};

/// Scores one section on every metric through the generation adapter.
#[derive(Debug, Clone)]
pub struct Evaluator {
    adapter: GenerationAdapter,
    prompts: PromptSet,
    parser: ResponseParser,
    params: GenerationParams,
    metric_workers: usize,
}

impl Evaluator {
    pub fn new(
        adapter: GenerationAdapter,
        prompts: PromptSet,
        params: GenerationParams,
    ) -> Result<Self> {
        Ok(Self {
            adapter,
            prompts,
            parser: ResponseParser::new()?,
            params,
            metric_workers: EvaluationMetric::ALL.len(),
        })
    }

    /// Limits how many metric calls for one section run at once; 1 means
    /// sequential.
    pub fn with_metric_workers(mut self, metric_workers: usize) -> Self {
        self.metric_workers = metric_workers.max(1);
        self
    }

    /// Always yields one verdict per metric. A metric without a template gets
    /// a zero score explaining why.
    pub fn evaluate(&self, section: &DocumentSection) -> BTreeMap<EvaluationMetric, MetricVerdict> {
        let requirements = section.requirements_text();
        let vars = TemplateVars {
            content: &section.content,
            requirements: &requirements,
            title: &section.title,
        };

        let mut verdicts = BTreeMap::new();
        let mut pending = Vec::new();
        let mut prompts = Vec::new();

        for metric in EvaluationMetric::ALL {
            match self.prompts.metric(metric) {
                Some(template) => {
                    pending.push(metric);
                    prompts.push(template.render(&vars));
                }
                None => {
                    warn!(
                        section_id = %section.id,
                        metric = %metric,
                        "no prompt template for metric, scoring zero"
                    );
                    verdicts.insert(
                        metric,
                        MetricVerdict::zero(format!(
                            "No prompt template configured for metric '{metric}'"
                        )),
                    );
                }
            }
        }

        let responses = self.adapter.batch(&prompts, self.metric_workers, &self.params);

        for (metric, response) in pending.into_iter().zip(responses) {
            if is_error_marker(&response) {
                warn!(
                    section_id = %section.id,
                    metric = %metric,
                    "metric scored zero after generation failure"
                );
            }
            let verdict = self.parser.parse(&response);
            debug!(
                section_id = %section.id,
                metric = %metric,
                score = verdict.score,
                "metric evaluated"
            );
            verdicts.insert(metric, verdict);
        }

        verdicts
    }

    pub fn report(&self, section: DocumentSection) -> Result<SectionReport> {
        let metrics = self.evaluate(&section);
        SectionReport::new(section, metrics)
    }

    /// Asks the service for requirements when the section has none. A failed
    /// call leaves an empty list rather than turning the error into one.
    pub fn ensure_requirements(&self, mut section: DocumentSection) -> DocumentSection {
        if !section.needs_requirements() {
            return section;
        }

        let prompt = self.prompts.requirements().render(&TemplateVars {
            title: &section.title,
            content: &section.content,
            ..TemplateVars::default()
        });
        let response = self.adapter.call(&prompt, &self.params);

        let requirements = if is_error_marker(&response) {
            warn!(
                section_id = %section.id,
                title = %section.title,
                "requirement generation failed, continuing without requirements"
            );
            Vec::new()
        } else {
            self.parser.extract_requirements(&response)
        };

        debug!(section_id = %section.id, count = requirements.len(), "generated requirements");
        section.requirements = Some(requirements);
        section
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::bail;

    use super::*;
    use crate::generation::{OfflineGenerator, RetryPolicy};

    fn section(requirements: Option<Vec<&str>>) -> DocumentSection {
        DocumentSection {
            id: "section_1".to_string(),
            title: "Scope".to_string(),
            content: "The vehicle operates on highways.".to_string(),
            requirements: requirements
                .map(|items| items.into_iter().map(ToOwned::to_owned).collect()),
        }
    }

    fn evaluator(generator: OfflineGenerator, prompts: PromptSet) -> Evaluator {
        let adapter = GenerationAdapter::new(Arc::new(generator), RetryPolicy::without_delay(0));
        Evaluator::new(adapter, prompts, GenerationParams::default()).unwrap()
    }

    /// Answers with a score that depends on which metric prompt was sent.
    fn scoring_generator() -> OfflineGenerator {
        OfflineGenerator::from_fn(|prompt| {
            let score = if prompt.contains("coherence") {
                "0.8"
            } else if prompt.contains("quality") {
                "0.6"
            } else if prompt.contains("capture rate") {
                "0.9"
            } else {
                "0.3"
            };
            Ok(format!("Score: {score}\nReasoning."))
        })
    }

    #[test]
    fn evaluate_produces_all_four_verdicts() {
        let evaluator = evaluator(scoring_generator(), PromptSet::builtin().unwrap());
        let report = evaluator
            .report(section(Some(vec!["Name the roads"])))
            .unwrap();

        assert_eq!(report.metrics.len(), 4);
        assert_eq!(report.verdict(EvaluationMetric::Coherence).unwrap().score, 0.8);
        assert_eq!(report.verdict(EvaluationMetric::Quality).unwrap().score, 0.6);
        assert_eq!(report.verdict(EvaluationMetric::Capture).unwrap().score, 0.9);
        assert_eq!(report.verdict(EvaluationMetric::Hallucination).unwrap().score, 0.3);
        assert!((report.average_score - 0.65).abs() < 1e-9);
    }

    #[test]
    fn sequential_metric_calls_give_the_same_verdicts() {
        let parallel = evaluator(scoring_generator(), PromptSet::builtin().unwrap());
        let sequential = evaluator(scoring_generator(), PromptSet::builtin().unwrap())
            .with_metric_workers(1);
        let target = section(Some(vec!["Name the roads"]));

        assert_eq!(parallel.evaluate(&target), sequential.evaluate(&target));
    }

    #[test]
    fn missing_template_scores_zero_with_explanation() {
        let prompts = PromptSet::from_yaml(
            "evaluation_prompts:\n  - metric: coherence\n    prompt: \"Rate {content}\"\n",
        )
        .unwrap();
        let evaluator = evaluator(OfflineGenerator::fixed("Score: 0.9"), prompts);

        let verdicts = evaluator.evaluate(&section(Some(vec!["x"])));

        assert_eq!(verdicts.len(), 4);
        assert_eq!(verdicts[&EvaluationMetric::Coherence].score, 0.9);
        let quality = &verdicts[&EvaluationMetric::Quality];
        assert_eq!(quality.score, 0.0);
        assert!(quality.comment.contains("quality"));
    }

    #[test]
    fn requirements_are_joined_by_newline_in_prompts() {
        let evaluator = evaluator(
            OfflineGenerator::from_fn(|prompt| {
                if prompt.contains("Requirements: first\nsecond") || prompt.contains("coherence") {
                    Ok("1".to_string())
                } else {
                    Ok("0".to_string())
                }
            }),
            PromptSet::builtin().unwrap(),
        );

        let verdicts = evaluator.evaluate(&section(Some(vec!["first", "second"])));
        assert!(verdicts.values().all(|verdict| verdict.score == 1.0));
    }

    #[test]
    fn generation_failure_degrades_to_zero() {
        let evaluator = evaluator(
            OfflineGenerator::from_fn(|_| bail!("timeout")),
            PromptSet::builtin().unwrap(),
        );

        let verdicts = evaluator.evaluate(&section(Some(vec!["x"])));
        assert!(verdicts.values().all(|verdict| verdict.score == 0.0));
        assert!(verdicts.values().all(|verdict| is_error_marker(&verdict.comment)));
    }

    #[test]
    fn ensure_requirements_generates_only_when_absent() {
        let evaluator = evaluator(
            OfflineGenerator::fixed("- Mention speed limits\n- Mention weather"),
            PromptSet::builtin().unwrap(),
        );

        let generated = evaluator.ensure_requirements(section(None));
        assert_eq!(
            generated.requirements,
            Some(vec![
                "Mention speed limits".to_string(),
                "Mention weather".to_string()
            ])
        );

        let kept = evaluator.ensure_requirements(section(Some(vec!["Keep me"])));
        assert_eq!(kept.requirements, Some(vec!["Keep me".to_string()]));
    }

    #[test]
    fn ensure_requirements_does_not_keep_error_text() {
        let evaluator = evaluator(
            OfflineGenerator::from_fn(|_| bail!("down")),
            PromptSet::builtin().unwrap(),
        );

        let section = evaluator.ensure_requirements(section(None));
        assert_eq!(section.requirements, Some(Vec::new()));
    }
}
