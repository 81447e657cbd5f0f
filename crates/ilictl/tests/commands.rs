use std::error::Error;
use std::fs;
use std::path::Path;

use clap::Parser;
use ilictl::cli::Cli;
use tempfile::tempdir;

const RUN_2015: &str = r#"{
    "id": "2015",
    "name": "2015 MFL",
    "date": "2015-06-01",
    "features": [
        { "id": "W10", "distance": 0.0, "feature_type": "Girth Weld", "joint_number": 10 },
        { "id": "A1", "distance": 12.0, "feature_type": "Metal Loss", "clock": "03:00", "depth_pct": 20.0 },
        { "id": "W20", "distance": 100.0, "feature_type": "Girth Weld", "joint_number": 20 },
        { "id": "A2", "distance": 60.0, "feature_type": "Dent" }
    ]
}"#;

const RUN_2020: &str = r#"{
    "id": "2020",
    "name": "2020 MFL",
    "date": "2020-06-01",
    "features": [
        { "id": "GW10", "distance": 2.0, "feature_type": "Girth Weld", "joint_number": 10 },
        { "id": "B1", "distance": 14.1, "feature_type": "Corrosion", "clock": 92.0, "depth_pct": 36.0 },
        { "id": "GW20", "distance": 103.0, "feature_type": "Girth Weld", "joint_number": 20 }
    ]
}"#;

fn write_runs(dir: &Path) -> Result<(String, String), Box<dyn Error>> {
    let first = dir.join("run_2015.json");
    let second = dir.join("run_2020.json");
    fs::write(&first, RUN_2015)?;
    fs::write(&second, RUN_2020)?;
    Ok((
        first.to_string_lossy().into_owned(),
        second.to_string_lossy().into_owned(),
    ))
}

fn run(args: &[&str]) -> Result<(String, String), Box<dyn Error>> {
    let cli = Cli::try_parse_from(args)?;
    let mut out = Vec::new();
    let mut err = Vec::new();
    ilictl::run(cli, &mut out, &mut err)?;
    Ok((String::from_utf8(out)?, String::from_utf8(err)?))
}

#[test]
fn analyze_writes_json_report_and_creates_config() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let workspace = temp.path().to_string_lossy().into_owned();
    let (first, second) = write_runs(temp.path())?;

    let (out, err) = run(&[
        "ili",
        "analyze",
        &second,
        &first,
        "--output",
        "json",
        "--workspace",
        &workspace,
    ])?;

    assert!(temp.path().join(".ili/config.toml").exists());
    // Default config leaves ambiguity_epsilon unset.
    assert!(err.contains("uncalibrated_ambiguity_epsilon"));

    let report: serde_json::Value = serde_json::from_str(&out)?;
    assert_eq!(report["run_order"], serde_json::json!(["2015", "2020"]));
    assert_eq!(report["groups"][0]["group_id"], "G0001");
    assert_eq!(report["growth"][0]["flag"], "RAPID_GROWTH");
    let categories: Vec<_> = report["exceptions"]
        .as_array()
        .ok_or("exceptions array")?
        .iter()
        .map(|exception| exception["category"].as_str().unwrap_or_default().to_owned())
        .collect();
    assert_eq!(categories, vec!["MISSING", "RAPID_GROWTH"]);
    Ok(())
}

#[test]
fn pairs_writes_one_table_per_consecutive_pair() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let workspace = temp.path().to_string_lossy().into_owned();
    let (first, second) = write_runs(temp.path())?;

    let (out, _) = run(&["ili", "pairs", &first, &second, "--workspace", &workspace])?;

    assert!(out.contains("== 2015 -> 2020 =="));
    assert!(out.contains("2015:A1,2020:B1"));
    Ok(())
}

#[test]
fn check_config_reports_custom_values() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let workspace = temp.path().to_string_lossy().into_owned();
    fs::create_dir_all(temp.path().join(".ili"))?;
    fs::write(
        temp.path().join(".ili/config.toml"),
        "[matching]\ndist_tolerance = 2.5\nambiguity_epsilon = 0.02\n\n[weights]\ndistance = 0.7\n",
    )?;

    let (out, _) = run(&["ili", "check-config", "--workspace", &workspace])?;

    assert!(out.contains("dist_tolerance = 2.5"));
    assert!(out.contains("weights_not_normalized"));
    assert!(!out.contains("uncalibrated_ambiguity_epsilon"));
    Ok(())
}

#[test]
fn analyze_fails_with_context_for_single_run() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let workspace = temp.path().to_string_lossy().into_owned();
    let (first, _) = write_runs(temp.path())?;

    let error = run(&["ili", "analyze", &first, "--workspace", &workspace])
        .expect_err("one run cannot be analysed");

    assert!(error.to_string().contains("run analysis failed"));
    Ok(())
}
