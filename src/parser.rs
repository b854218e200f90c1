use anyhow::{Context, Result};
use regex::Regex;

use crate::generation::is_error_marker;
use crate::model::MetricVerdict;

/// Lenient extraction of scores and requirement lists from free text.
#[derive(Debug, Clone)]
pub struct ResponseParser {
    score: Regex,
    bullet: Regex,
}

impl ResponseParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            score: Regex::new(r"\b(0(?:\.\d+)?|1(?:\.0+)?)\b")
                .context("failed to compile score regex")?,
            bullet: Regex::new(r"^\s*(?:[-*•]|\d+\.)\s*(?P<body>.+?)\s*$")
                .context("failed to compile bullet regex")?,
        })
    }

    /// First standalone 0..1 token wins; no token, or an error marker, scores 0.
    /// The trimmed input is kept verbatim as the comment.
    pub fn parse(&self, raw: &str) -> MetricVerdict {
        let comment = raw.trim();
        if is_error_marker(comment) {
            return MetricVerdict::zero(comment);
        }

        let score = self
            .score
            .captures(comment)
            .and_then(|captures| captures.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .unwrap_or(0.0);

        MetricVerdict::new(score, comment)
    }

    /// Bullet and numbered lines become requirements; without any markers
    /// every non-empty line does.
    pub fn extract_requirements(&self, raw: &str) -> Vec<String> {
        let bullets: Vec<String> = raw
            .lines()
            .filter_map(|line| self.bullet.captures(line))
            .filter_map(|captures| captures.name("body"))
            .map(|body| body.as_str().to_string())
            .collect();

        if !bullets.is_empty() {
            return bullets;
        }

        raw.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(ToOwned::to_owned)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> ResponseParser {
        ResponseParser::new().expect("parser regexes compile")
    }

    #[test]
    fn parse_reads_score_and_keeps_full_comment() {
        let verdict = parser().parse("Score: 0.85\nGood clarity.");
        assert_eq!(verdict.score, 0.85);
        assert_eq!(verdict.comment, "Score: 0.85\nGood clarity.");
    }

    #[test]
    fn parse_without_number_scores_zero() {
        let text = "The section is vague and lacks structure.";
        let verdict = parser().parse(text);
        assert_eq!(verdict.score, 0.0);
        assert_eq!(verdict.comment, text);
    }

    #[test]
    fn parse_takes_first_token_not_highest() {
        let verdict = parser().parse("Initial 0.4, revised to 0.9 after review");
        assert_eq!(verdict.score, 0.4);
    }

    #[test]
    fn parse_accepts_integer_bounds_and_ignores_larger_numbers() {
        assert_eq!(parser().parse("Score: 1").score, 1.0);
        assert_eq!(parser().parse("Score: 1.00").score, 1.0);
        assert_eq!(parser().parse("Rated 10 of 12, then 0").score, 0.0);
        assert_eq!(parser().parse("Rated 10 of 12, final 0.5").score, 0.5);
    }

    #[test]
    fn parse_trims_surrounding_whitespace() {
        let verdict = parser().parse("\n  Score: 0.3  \n");
        assert_eq!(verdict.comment, "Score: 0.3");
    }

    #[test]
    fn parse_error_marker_scores_zero_even_with_digits() {
        let verdict = parser().parse("Error calling LLM: os error 1");
        assert_eq!(verdict.score, 0.0);
        assert_eq!(verdict.comment, "Error calling LLM: os error 1");
    }

    #[test]
    fn extract_requirements_prefers_bullets() {
        let raw = "Here are the requirements:\n- Define the scope\n* List actors\n2. Describe limits\n\nThanks";
        assert_eq!(
            parser().extract_requirements(raw),
            vec!["Define the scope", "List actors", "Describe limits"]
        );
    }

    #[test]
    fn extract_requirements_falls_back_to_lines() {
        let raw = "Define the scope\n\n  List actors  \n";
        assert_eq!(
            parser().extract_requirements(raw),
            vec!["Define the scope", "List actors"]
        );
    }
}
