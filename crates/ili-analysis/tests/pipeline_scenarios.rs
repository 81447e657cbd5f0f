use std::collections::HashSet;

use chrono::NaiveDate;
use ili_analysis::{
    analyze_consecutive_pairs, analyze_runs, apply_correction, compute_drift_points,
    match_anchors, match_anomalies,
};
use ili_config::Settings;
use ili_core::{ConfidenceTier, ExceptionCategory, Feature, GrowthFlag, Run};

fn date(year: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, 6, 1).expect("valid date")
}

fn weld(id: &str, distance: f64, joint: i64) -> Feature {
    Feature::new(id, distance, "Girth Weld").with_joint(joint)
}

fn corrosion(id: &str, distance: f64, depth: f64, clock: f64) -> Feature {
    Feature::new(id, distance, "Metal Loss")
        .with_depth(depth)
        .with_length(20.0)
        .with_clock(clock)
}

fn run_2015() -> Run {
    Run::new("2015", "2015 MFL")
        .with_date(date(2015))
        .with_features(vec![
            weld("W10", 0.0, 10),
            corrosion("A1", 12.0, 20.0, 90.0),
            corrosion("A2", 48.0, 30.0, 180.0),
            weld("W20", 100.0, 20),
            corrosion("A3", 140.0, 15.0, 270.0),
            weld("W30", 200.0, 30),
            corrosion("A4", 260.0, 12.0, 0.0),
        ])
}

fn run_2020() -> Run {
    // Odometer reads +2 at the start growing to +4 by the third weld.
    Run::new("2020", "2020 MFL")
        .with_date(date(2020))
        .with_features(vec![
            weld("GW-10", 2.0, 10),
            corrosion("B1", 14.2, 21.0, 95.0),
            corrosion("B2", 51.0, 45.0, 180.0),
            weld("GW-20", 103.0, 20),
            corrosion("B3", 144.0, 16.0, 265.0),
            corrosion("B9", 170.0, 8.0, 30.0),
            weld("GW-30", 204.0, 30),
        ])
}

fn run_2023() -> Run {
    Run::new("2023", "2023 UT")
        .with_date(date(2023))
        .with_features(vec![
            weld("X10", 1.0, 10),
            corrosion("C1", 13.1, 22.0, 90.0),
            weld("X20", 101.0, 20),
            corrosion("C3", 141.0, 17.0, 270.0),
            weld("X30", 201.0, 30),
        ])
}

#[test]
fn two_anchor_drift_interpolates_midpoint() {
    let settings = Settings::default();
    let anchors_a = vec![weld("W1", 0.0, 1), weld("W2", 100.0, 2)];
    let anchors_b = vec![weld("W1", 2.0, 1), weld("W2", 103.0, 2)];

    let matches = match_anchors(&anchors_a, &anchors_b, &settings).expect("anchors");
    let points = compute_drift_points(&matches);

    assert_eq!(points.len(), 2);
    assert_eq!((points[0].distance, points[0].drift), (0.0, 2.0));
    assert_eq!((points[1].distance, points[1].drift), (100.0, 3.0));
    assert_eq!(apply_correction(50.0, &points), 47.5);
}

#[test]
fn compatible_label_pair_is_one_group() {
    let settings = Settings::default();
    let mut a = Feature::new("A1", 10.0, "Corrosion").with_depth(20.0);
    a.corrected_distance = Some(10.0);
    let mut b = Feature::new("B1", 11.0, "Metal Loss").with_depth(22.0);
    b.corrected_distance = Some(11.0);

    let outcome = match_anomalies(&[a], &[b], "a", "b", &settings).expect("match");

    assert_eq!(outcome.matched.len(), 1);
    let group = &outcome.matched[0];
    assert_eq!(group.components.type_match, 0.7);
    let expected = ConfidenceTier::from_score(group.score, 0.85, 0.70, 0.50);
    assert_eq!(group.confidence, expected);
}

#[test]
fn unmatched_baseline_anomaly_becomes_missing() {
    let settings = Settings::default();
    let runs = [
        Run::new("a", "a").with_features(vec![Feature::new("A500", 500.0, "Corrosion")]),
        Run::new("b", "b").with_features(vec![Feature::new("B10", 10.0, "Corrosion")]),
    ];

    let report = analyze_runs(&runs, &settings).expect("analysis");

    assert!(report.groups.is_empty());
    assert_eq!(report.unmatched["a"][0].id, "A500");
    let missing: Vec<_> = report
        .exceptions
        .iter()
        .filter(|exception| exception.category == ExceptionCategory::Missing)
        .map(|exception| exception.feature_id.as_str())
        .collect();
    assert_eq!(missing, vec!["A500"]);
    let new: Vec<_> = report
        .exceptions
        .iter()
        .filter(|exception| exception.category == ExceptionCategory::New)
        .map(|exception| exception.run_id.as_str())
        .collect();
    assert_eq!(new, vec!["b"]);
}

#[test]
fn two_run_analysis_aligns_matches_and_flags_growth() {
    let settings = Settings::default();
    // Deliberately pass the later run first.
    let report = analyze_runs(&[run_2020(), run_2015()], &settings).expect("analysis");

    assert_eq!(report.run_order, vec!["2015", "2020"]);
    assert_eq!(report.alignments.len(), 1);
    assert_eq!(report.alignments[0].anchor_matches.len(), 3);
    assert_eq!(report.alignments[0].quality.coverage, 1.0);

    let pairs: Vec<_> = report
        .groups
        .iter()
        .map(|group| {
            (
                group.feature("2015").map(|f| f.id.as_str()),
                group.feature("2020").map(|f| f.id.as_str()),
            )
        })
        .collect();
    assert_eq!(
        pairs,
        vec![
            (Some("A1"), Some("B1")),
            (Some("A2"), Some("B2")),
            (Some("A3"), Some("B3")),
        ]
    );

    let group_ids: Vec<_> = report.groups.iter().map(|g| g.group_id.as_str()).collect();
    assert_eq!(group_ids, vec!["G0001", "G0002", "G0003"]);

    let rapid = report
        .growth
        .iter()
        .find(|result| result.group_id == "G0002")
        .expect("growth for G0002");
    assert_eq!(rapid.depth_delta, Some(15.0));
    assert_eq!(rapid.flag, Some(GrowthFlag::RapidGrowth));
    assert!(rapid.depth_rate.is_some());

    let categories: Vec<_> = report
        .exceptions
        .iter()
        .map(|exception| (exception.category, exception.feature_id.as_str()))
        .collect();
    assert!(categories.contains(&(ExceptionCategory::Missing, "A4")));
    assert!(categories.contains(&(ExceptionCategory::New, "B9")));
    assert!(categories.contains(&(ExceptionCategory::RapidGrowth, "B2")));
    assert_eq!(report.summary.matched_groups, 3);
    assert_eq!(report.summary.new, 1);
    assert_eq!(report.summary.missing, 1);
}

#[test]
fn three_run_analysis_extends_groups_and_measures_end_to_end() {
    let settings = Settings::default();
    let report =
        analyze_runs(&[run_2015(), run_2020(), run_2023()], &settings).expect("analysis");

    assert_eq!(report.run_order, vec!["2015", "2020", "2023"]);
    assert_eq!(report.alignments.len(), 2);

    let first = &report.groups[0];
    assert_eq!(first.run_count(), 3);
    assert_eq!(first.feature("2023").map(|f| f.id.as_str()), Some("C1"));

    let second = &report.groups[1];
    assert_eq!(second.features.get("2023"), Some(&None));

    let growth = report
        .growth
        .iter()
        .find(|result| result.group_id == first.group_id)
        .expect("growth");
    assert_eq!(growth.from_run_id, "2015");
    assert_eq!(growth.to_run_id, "2023");
    assert_eq!(growth.depth_delta, Some(2.0));

    // G0002 is absent in 2023, so its growth spans the first two runs.
    let second_growth = report
        .growth
        .iter()
        .find(|result| result.group_id == second.group_id)
        .expect("growth");
    assert_eq!(second_growth.to_run_id, "2020");
}

#[test]
fn results_are_one_to_one_and_order_preserving() {
    let settings = Settings::default();
    let report = analyze_runs(&[run_2015(), run_2020()], &settings).expect("analysis");
    let baseline = run_2015().anomalies();
    let later = run_2020().anomalies();

    let mut seen_a = HashSet::new();
    let mut seen_b = HashSet::new();
    let mut last = None;
    for group in &report.groups {
        let a = group.feature("2015").expect("baseline feature");
        let b = group.feature("2020").expect("later feature");
        assert!(seen_a.insert(a.id.clone()));
        assert!(seen_b.insert(b.id.clone()));

        let ia = baseline.iter().position(|f| f.id == a.id).expect("index a");
        let ib = later.iter().position(|f| f.id == b.id).expect("index b");
        if let Some((pa, pb)) = last {
            assert!(ia > pa && ib > pb);
        }
        last = Some((ia, ib));
    }

    let anchor_b: Vec<_> = report.alignments[0]
        .anchor_matches
        .iter()
        .map(|m| m.anchor_b_id.clone())
        .collect();
    let unique: HashSet<_> = anchor_b.iter().collect();
    assert_eq!(unique.len(), anchor_b.len());
}

#[test]
fn repeated_analysis_is_byte_identical() {
    let settings = Settings::default();
    let runs = [run_2015(), run_2020(), run_2023()];

    let first = serde_json::to_string(&analyze_runs(&runs, &settings).expect("analysis"))
        .expect("serialize");
    let second = serde_json::to_string(&analyze_runs(&runs, &settings).expect("analysis"))
        .expect("serialize");

    assert_eq!(first, second);
}

#[test]
fn consecutive_pairs_run_independently_in_date_order() {
    let settings = Settings::default();
    let pairs =
        analyze_consecutive_pairs(&[run_2023(), run_2015(), run_2020()], &settings).expect("pairs");

    let spans: Vec<_> = pairs
        .iter()
        .map(|pair| (pair.from_run_id.as_str(), pair.to_run_id.as_str()))
        .collect();
    assert_eq!(spans, vec![("2015", "2020"), ("2020", "2023")]);

    let direct = analyze_runs(&[run_2020(), run_2023()], &settings).expect("analysis");
    assert_eq!(pairs[1].report, direct);
}
