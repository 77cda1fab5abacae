//! Integration tests for the enrolment analytics pipeline

use std::cell::Cell;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use enrolment_insights::config::{AnomalyStrategy, NamingScheme, PipelineConfig};
use enrolment_insights::geo::{Coordinates, Geocoder};
use enrolment_insights::{analyze, run_pipeline_with, ClusterName, IngestionError};
use tempfile::{tempdir, TempDir};

const HEADER: &str = "date,state,district,pincode,age_0_5,age_5_17,age_18_greater";

/// (district, pincode, base counts, scale)
const SCHOOL: [(&str, &str, [u64; 3], u64); 3] = [
    ("Pune", "411001", [5, 80, 15], 30),
    ("Satara", "415001", [6, 78, 16], 20),
    ("Sangli", "416401", [4, 82, 14], 10),
];
const BIRTH: [(&str, &str, [u64; 3], u64); 3] = [
    ("Nashik", "422001", [70, 10, 20], 12),
    ("Dhule", "424001", [72, 8, 20], 7),
    ("Jalgaon", "425001", [68, 12, 20], 4),
];
const BALANCED: [(&str, &str, [u64; 3], u64); 3] = [
    ("Nagpur", "440001", [30, 30, 40], 9),
    ("Wardha", "442001", [32, 28, 40], 3),
    ("Akola", "444001", [28, 32, 40], 2),
];

fn write_rows(path: &Path, rows: &[String]) {
    let mut file = File::create(path).unwrap();
    writeln!(file, "{HEADER}").unwrap();
    for row in rows {
        writeln!(file, "{row}").unwrap();
    }
}

fn district_rows(districts: &[(&str, &str, [u64; 3], u64)]) -> Vec<String> {
    let mut rows = Vec::new();
    for (district, pincode, counts, scale) in districts {
        for date in ["05-08-2025", "05-09-2025"] {
            rows.push(format!(
                "{date},Maharashtra,{district},{pincode},{},{},{}",
                counts[0] * scale,
                counts[1] * scale,
                counts[2] * scale
            ));
        }
    }
    rows
}

/// Two readable sources plus one path that does not exist
fn create_sources() -> (TempDir, Vec<PathBuf>) {
    let dir = tempdir().unwrap();

    let mut first = district_rows(&SCHOOL);
    first.extend(district_rows(&BIRTH));
    // Pune's overloaded pincode, same age mix as the rest of Pune
    first.push("12-09-2025,Maharashtra,Pune,411999,5000,80000,15000".to_string());

    let mut second = district_rows(&BALANCED);
    // exact duplicate of a row already in the first source
    second.push(first[0].clone());
    second.push("2025/10/01,Maharashtra,Akola,444001,28,32,40".to_string());

    let paths = vec![
        dir.path().join("enrolment_a.csv"),
        dir.path().join("enrolment_b.csv"),
        dir.path().join("enrolment_missing.csv"),
    ];
    write_rows(&paths[0], &first);
    write_rows(&paths[1], &second);

    (dir, paths)
}

fn config_for(paths: Vec<PathBuf>) -> PipelineConfig {
    PipelineConfig {
        inputs: paths,
        fallback_dir: None,
        dashboard: None,
        ..PipelineConfig::default()
    }
}

#[test]
fn test_end_to_end_with_one_missing_source() {
    let (_dir, paths) = create_sources();
    let report = analyze(&config_for(paths)).unwrap();

    assert_eq!(report.sources_loaded.len(), 2);
    assert_eq!(report.sources_skipped.len(), 1);
    assert!(report.sources_skipped[0].path.ends_with("enrolment_missing.csv"));

    // 18 district rows + overload row + 1 duplicate + 1 undated row
    assert_eq!(report.rows_read, 21);
    assert_eq!(report.records, 20);
    assert_eq!(report.districts.len(), 9);

    let months: Vec<&str> = report.monthly_trend.iter().map(|m| m.month.as_str()).collect();
    assert_eq!(months, vec!["2025-08", "2025-09"]);
}

#[test]
fn test_all_sources_missing_fails_with_ingestion_error() {
    let dir = tempdir().unwrap();
    let paths: Vec<PathBuf> = ["a.csv", "b.csv", "c.csv"]
        .iter()
        .map(|name| dir.path().join(name))
        .collect();

    let err = analyze(&config_for(paths)).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<IngestionError>(),
        Some(IngestionError::NoSourcesLoaded { attempted: 3 })
    ));
}

#[test]
fn test_too_few_distinct_profiles_still_completes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("enrolment.csv");
    write_rows(
        &path,
        &[
            "01-09-2025,Kerala,Idukki,685501,10,80,10".to_string(),
            "01-09-2025,Kerala,Wayanad,673121,20,160,20".to_string(),
            "01-09-2025,Kerala,Kollam,691001,70,10,20".to_string(),
            "01-09-2025,Kerala,Kannur,670001,140,20,40".to_string(),
        ],
    );

    let report = analyze(&config_for(vec![path])).unwrap();
    assert_eq!(report.districts.len(), 4);
    assert_eq!(report.groups.len(), 1);
    assert_eq!(report.groups[0].districts, 4);
    assert!(report
        .districts
        .iter()
        .all(|d| d.assignment.name == ClusterName::BalancedMixed));
    assert!(report.targets.is_empty());
}

#[test]
fn test_fallback_directory_is_searched() {
    let (dir, _) = create_sources();
    let config = PipelineConfig {
        inputs: vec![PathBuf::from("enrolment_a.csv"), PathBuf::from("enrolment_b.csv")],
        fallback_dir: Some(dir.path().to_path_buf()),
        dashboard: None,
        ..PipelineConfig::default()
    };

    let report = analyze(&config).unwrap();
    assert_eq!(report.sources_loaded.len(), 2);
    assert!(report.sources_skipped.is_empty());
}

#[test]
fn test_clusters_are_named_by_centroids() {
    let (_dir, paths) = create_sources();
    let report = analyze(&config_for(paths)).unwrap();

    let mut names: Vec<ClusterName> = report.groups.iter().map(|g| g.name).collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            ClusterName::SchoolHub,
            ClusterName::BirthingCenter,
            ClusterName::BalancedMixed
        ]
    );

    for district in &report.districts {
        let expected = match district.profile.district.as_str() {
            "Pune" | "Satara" | "Sangli" => ClusterName::SchoolHub,
            "Nashik" | "Dhule" | "Jalgaon" => ClusterName::BirthingCenter,
            _ => ClusterName::BalancedMixed,
        };
        assert_eq!(district.assignment.name, expected, "{}", district.profile.district);
    }
}

#[test]
fn test_two_way_naming() {
    let (_dir, paths) = create_sources();
    let config = PipelineConfig {
        naming: NamingScheme::TwoWay,
        ..config_for(paths)
    };
    let report = analyze(&config).unwrap();

    let hubs = report
        .groups
        .iter()
        .filter(|g| g.name == ClusterName::SchoolHub)
        .count();
    let general = report
        .groups
        .iter()
        .filter(|g| g.name == ClusterName::GeneralBirth)
        .count();
    assert_eq!((hubs, general), (1, 2));
}

#[test]
fn test_targets_and_vans() {
    let (_dir, paths) = create_sources();
    let report = analyze(&config_for(paths)).unwrap();

    let targets: Vec<(&str, u64)> = report
        .targets
        .iter()
        .map(|t| (t.district.as_str(), t.vans_required))
        .collect();
    // Pune: 2 * 3000 + 100000 = 106000 -> 3534 per day -> 71 vans
    // Satara: 2 * 2000 = 4000 -> 134 per day -> 3 vans
    // Sangli: 2 * 1000 = 2000 -> 67 per day -> 2 vans
    assert_eq!(targets, vec![("Pune", 71), ("Satara", 3), ("Sangli", 2)]);
}

#[test]
fn test_overloaded_pincode_is_top_anomaly() {
    let (_dir, paths) = create_sources();

    for strategy in [AnomalyStrategy::Isolation, AnomalyStrategy::Deviation] {
        let mut config = config_for(paths.clone());
        config.anomaly.strategy = strategy;
        // with ten pincodes the largest possible z-score is below 3
        config.anomaly.z_threshold = 2.5;

        let report = analyze(&config).unwrap();
        assert!(report.anomaly_count() >= 1, "{strategy:?}");
        assert_eq!(report.anomalies[0].pincode, "411999", "{strategy:?}");
        assert_eq!(report.anomalies[0].total_activity, 100_000);
    }
}

#[test]
fn test_benford_audit_covers_filtered_records() {
    let (_dir, paths) = create_sources();
    let report = analyze(&config_for(paths)).unwrap();

    // every record total is above 10
    assert_eq!(report.benford.sample_size, 20);
    assert_eq!(report.benford.observed().iter().sum::<u64>(), 20);
    let expected_total: f64 = report.benford.expected().iter().sum();
    assert!((expected_total - 20.0).abs() < 1e-6);
}

#[test]
fn test_repeated_runs_are_identical() {
    let (_dir, paths) = create_sources();
    let config = config_for(paths);

    let first = analyze(&config).unwrap();
    let second = analyze(&config).unwrap();
    assert_eq!(first.districts, second.districts);
    assert_eq!(first.pincodes, second.pincodes);
    assert_eq!(first.anomalies, second.anomalies);
    assert_eq!(first.targets, second.targets);
}

/// Resolves only Pune and counts lookups
struct StubGeocoder {
    calls: Cell<usize>,
}

impl Geocoder for StubGeocoder {
    fn geocode(&self, query: &str) -> enrolment_insights::Result<Option<Coordinates>> {
        self.calls.set(self.calls.get() + 1);
        if query.starts_with("Pune") {
            Ok(Some(Coordinates { lat: 18.52, lon: 73.85 }))
        } else {
            anyhow::bail!("timed out")
        }
    }
}

#[test]
fn test_geospatial_export_records_failed_lookups() {
    let (dir, paths) = create_sources();
    let mut config = config_for(paths);
    config.enable_geospatial_export = true;
    config.map.output = dir.path().join("deployment_map.html");

    let geocoder = StubGeocoder { calls: Cell::new(0) };
    let report = run_pipeline_with(&config, Some(&geocoder as &dyn Geocoder)).unwrap();

    let map = report.map.expect("map exported");
    assert_eq!(geocoder.calls.get(), 3);
    assert_eq!(map.geocoded(), 1);
    assert_eq!(map.failed(), vec!["Satara", "Sangli"]);

    let html = std::fs::read_to_string(&map.path).unwrap();
    assert!(html.contains("Pune"));
    assert!(!html.contains("Satara"));
}

#[test]
fn test_geospatial_export_disabled_makes_no_lookups() {
    let (dir, paths) = create_sources();
    let mut config = config_for(paths);
    config.map.output = dir.path().join("deployment_map.html");

    let geocoder = StubGeocoder { calls: Cell::new(0) };
    let report = run_pipeline_with(&config, Some(&geocoder as &dyn Geocoder)).unwrap();

    assert!(report.map.is_none());
    assert_eq!(geocoder.calls.get(), 0);
    assert!(!config.map.output.exists());
}

fn run_cli(dir: &Path, inputs: &[PathBuf]) -> std::process::ExitStatus {
    Command::new(env!("CARGO_BIN_EXE_enrolment-insights"))
        .current_dir(dir)
        .arg("--no-dashboard")
        .arg("--input")
        .args(inputs)
        .output()
        .unwrap()
        .status
}

#[test]
fn test_cli_exits_zero_when_a_source_loads() {
    let (dir, paths) = create_sources();
    assert!(run_cli(dir.path(), &paths).success());
}

#[test]
fn test_cli_exits_non_zero_when_no_source_loads() {
    let dir = tempdir().unwrap();
    let paths = vec![dir.path().join("a.csv"), dir.path().join("b.csv")];
    assert!(!run_cli(dir.path(), &paths).success());
}
