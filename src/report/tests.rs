use std::collections::BTreeMap;
use std::fs;

use tempfile::TempDir;

use super::merge::discover_section_reports;
use super::*;
use crate::model::{DocumentSection, EvaluationMetric, MetricVerdict, SectionReport};

fn sample_report(id: &str, title: &str, scores: [f64; 4]) -> SectionReport {
    let section = DocumentSection {
        id: id.to_string(),
        title: title.to_string(),
        content: format!("Body of {title}, with a comma\nand a second \"quoted\" line."),
        requirements: Some(vec![
            "State the speed range".to_string(),
            "List weather limits".to_string(),
        ]),
    };
    let metrics = EvaluationMetric::ALL
        .into_iter()
        .zip(scores)
        .map(|(metric, score)| {
            (
                metric,
                MetricVerdict::new(score, format!("Score: {score}\n{metric} looks fine, mostly.")),
            )
        })
        .collect::<BTreeMap<_, _>>();
    SectionReport::new(section, metrics).unwrap()
}

#[test]
fn written_reports_read_back_with_identical_scores_and_comments() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("Section1_eval.csv");
    let reports = vec![
        sample_report("section_1", "Intro", [0.8, 0.6, 0.9, 0.3]),
        sample_report("section_2", "Scope", [0.123456789, 1.0, 0.0, 0.05]),
    ];

    write_reports(&reports, &path).unwrap();
    let restored = read_reports(&path).unwrap();

    assert_eq!(restored, reports);
}

#[test]
fn header_follows_fixed_column_order() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("Section1_eval.csv");
    write_reports(&[sample_report("section_1", "Intro", [0.5; 4])], &path).unwrap();

    let raw = fs::read_to_string(&path).unwrap();
    let header = raw.lines().next().unwrap();
    assert_eq!(
        header,
        "Section ID,Section Title,Content,Requirements,\
         Coherence Score,Coherence Comment,Quality Score,Quality Comment,\
         Capture Rate,Capture Comment,Hallucination Score,Hallucination Comment,\
         Average Score"
    );
}

#[test]
fn write_refuses_reports_without_four_verdicts() {
    let dir = TempDir::new().unwrap();
    let mut report = sample_report("section_1", "Intro", [0.5; 4]);
    report.metrics.remove(&EvaluationMetric::Capture);

    let err = write_reports(&[report], &dir.path().join("out.csv")).unwrap_err();
    assert!(err.to_string().contains("verdicts"));
}

#[test]
fn merge_orders_by_section_number_regardless_of_discovery_order() {
    let dir = TempDir::new().unwrap();
    for number in [3_u32, 1, 2] {
        let report = sample_report("section_1", &format!("Title {number}"), [0.5; 4]);
        write_reports(&[report], &dir.path().join(format!("Section{number}_eval.csv"))).unwrap();
    }
    fs::write(dir.path().join("notes.csv"), "unrelated\n").unwrap();

    let entries = vec![
        (3, dir.path().join("Section3_eval.csv")),
        (1, dir.path().join("Section1_eval.csv")),
        (2, dir.path().join("Section2_eval.csv")),
    ];
    let output = dir.path().join("merged_evaluation.csv");
    let outcome = merge_section_reports(&entries, &output).unwrap();

    assert_eq!(
        outcome,
        MergeOutcome::Merged {
            path: output.clone(),
            files: 3,
            rows: 3
        }
    );

    let rows = read_merged(&output).unwrap();
    let numbers: Vec<u32> = rows.iter().map(|row| row.section_number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    assert_eq!(rows[0].report.section.title, "Title 1");
    assert_eq!(rows[2].report.section.title, "Title 3");
}

#[test]
fn merge_directory_discovers_only_matching_files() {
    let dir = TempDir::new().unwrap();
    for number in [10_u32, 2] {
        let report = sample_report("section_1", &format!("T{number}"), [0.5; 4]);
        write_reports(&[report], &dir.path().join(format!("Section{number}_eval.csv"))).unwrap();
    }
    fs::write(dir.path().join("Section_x_eval.csv"), "junk\n").unwrap();

    let discovered = discover_section_reports(dir.path(), "Section{n}_eval.csv").unwrap();
    let numbers: Vec<u32> = discovered.iter().map(|(number, _)| *number).collect();
    assert_eq!(numbers, vec![2, 10]);

    let output = dir.path().join("merged_evaluation.csv");
    merge_directory(dir.path(), "Section{n}_eval.csv", &output).unwrap();
    let header = fs::read_to_string(&output).unwrap();
    assert!(header.starts_with("Section Number,Section ID,"));
}

#[test]
fn merge_of_empty_directory_reports_nothing_to_merge() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("merged_evaluation.csv");

    let outcome = merge_directory(dir.path(), "Section{n}_eval.csv", &output).unwrap();

    assert_eq!(outcome, MergeOutcome::NothingToMerge);
    assert!(!output.exists());
}

#[test]
fn merge_of_missing_directory_reports_nothing_to_merge() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("never-created");
    let output = dir.path().join("merged_evaluation.csv");

    let outcome = merge_directory(&missing, "Section{n}_eval.csv", &output).unwrap();

    assert_eq!(outcome, MergeOutcome::NothingToMerge);
    assert!(!output.exists());
}

#[test]
fn empty_requirement_list_reads_back_as_empty() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("Section1_eval.csv");
    let mut report = sample_report("section_1", "Scope", [0.5; 4]);
    report.section.requirements = Some(Vec::new());

    write_reports(&[report], &path).unwrap();
    let restored = read_reports(&path).unwrap();

    assert_eq!(restored[0].section.requirements, Some(Vec::new()));
}

#[test]
fn merge_skips_unreadable_files() {
    let dir = TempDir::new().unwrap();
    write_reports(
        &[sample_report("section_1", "Good", [0.5; 4])],
        &dir.path().join("Section1_eval.csv"),
    )
    .unwrap();
    fs::write(dir.path().join("Section2_eval.csv"), "Only,Two\na,b\n").unwrap();

    let output = dir.path().join("merged_evaluation.csv");
    let outcome = merge_directory(dir.path(), "Section{n}_eval.csv", &output).unwrap();

    assert_eq!(
        outcome,
        MergeOutcome::Merged {
            path: output,
            files: 1,
            rows: 1
        }
    );
}

#[test]
fn summary_inverts_hallucination_only_for_display() {
    let rows = vec![
        MergedRow {
            section_number: 1,
            report: sample_report("section_1", "Intro", [0.8, 0.6, 0.9, 0.3]),
        },
        MergedRow {
            section_number: 2,
            report: sample_report("section_1", "Scope", [0.4, 0.8, 0.7, 0.5]),
        },
    ];

    let summary = summarize(&rows).unwrap();
    assert_eq!(summary.rows, 2);
    assert_eq!(summary.sections, 2);

    let hallucination = summary
        .metrics
        .iter()
        .find(|m| m.metric == EvaluationMetric::Hallucination)
        .unwrap();
    assert!((hallucination.mean_raw - 0.4).abs() < 1e-9);
    assert!((hallucination.display_mean - 0.6).abs() < 1e-9);
    assert_eq!(hallucination.label, "accuracy");
    assert_eq!(hallucination.weakest.as_ref().unwrap().section_title, "Scope");

    let coherence = summary
        .metrics
        .iter()
        .find(|m| m.metric == EvaluationMetric::Coherence)
        .unwrap();
    assert_eq!(coherence.weakest.as_ref().unwrap().section_title, "Scope");
    assert!((coherence.display_mean - 0.6).abs() < 1e-9);

    // Row averages stay raw: (0.65 + 0.6) / 2.
    assert!((summary.mean_average_score - 0.625).abs() < 1e-9);
}

#[test]
fn summary_of_nothing_is_none() {
    assert!(summarize(&[]).is_none());
}

#[test]
fn score_band_thresholds() {
    assert_eq!(score_band(0.81), "excellent");
    assert_eq!(score_band(0.8), "good");
    assert_eq!(score_band(0.5), "fair");
    assert_eq!(score_band(0.3), "weak");
    assert_eq!(score_band(0.2), "poor");
}
