//! End-to-end run: load, derive, profile, cluster, detect, plan, audit, render

use std::path::PathBuf;
use std::time::Instant;

use tracing::{debug, info};

use crate::anomaly::{detect_anomalies, top_anomalies, PincodeProfile};
use crate::benford::{audit_leading_digits, BenfordAudit};
use crate::config::PipelineConfig;
use crate::data::{derive_features, load_records, SkippedSource};
use crate::geo::{geocode_targets, render_map_html, write_map, GeocodeOutcome, Geocoder, NominatimGeocoder};
use crate::model::{label_districts, partition_districts, share_features, ClusterName, LabeledDistrict};
use crate::profile::{
    activity_frame, monthly_trend, profile_districts, profile_pincodes, DistrictProfile, MonthlyActivity,
};
use crate::resources::{median_rule_priorities, select_targets, TargetDistrict};
use crate::viz::{render_dashboard, Dashboard};

const SILHOUETTE_SAMPLE: usize = 500;

/// Size and name of one fitted group
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSummary {
    pub cluster_id: usize,
    pub name: ClusterName,
    pub districts: usize,
    /// (birth_share, student_share) centre
    pub centroid: (f64, f64),
}

/// Result of the geospatial export
#[derive(Debug, Clone)]
pub struct MapExport {
    pub path: PathBuf,
    pub outcomes: Vec<GeocodeOutcome>,
}

impl MapExport {
    pub fn geocoded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.location.is_some()).count()
    }

    /// Districts recorded as not geocoded
    pub fn failed(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.location.is_none())
            .map(|o| o.district.as_str())
            .collect()
    }
}

/// Everything a run produced
#[derive(Debug)]
pub struct PipelineReport {
    pub sources_loaded: Vec<PathBuf>,
    pub sources_skipped: Vec<SkippedSource>,
    pub rows_read: usize,
    pub rows_rejected: usize,
    pub records: usize,
    pub monthly_trend: Vec<MonthlyActivity>,
    pub districts: Vec<LabeledDistrict>,
    pub groups: Vec<GroupSummary>,
    pub inertia: f64,
    pub silhouette: f64,
    pub targets: Vec<TargetDistrict>,
    pub priorities: Vec<DistrictProfile>,
    pub pincodes: Vec<PincodeProfile>,
    /// Flagged pincodes, highest activity first, truncated to the configured top-N
    pub anomalies: Vec<PincodeProfile>,
    pub benford: BenfordAudit,
    pub dashboard: Option<PathBuf>,
    pub map: Option<MapExport>,
}

impl PipelineReport {
    pub fn anomaly_count(&self) -> usize {
        self.pincodes.iter().filter(|p| p.is_anomaly).count()
    }
}

/// Run every analysis stage. No chart or map is produced.
pub fn analyze(config: &PipelineConfig) -> crate::Result<PipelineReport> {
    let load = load_records(&config.inputs, config.fallback_dir.as_deref())?;
    info!(
        sources = load.loaded.len(),
        skipped = load.skipped.len(),
        records = load.records.len(),
        "records loaded"
    );

    let records = derive_features(load.records);
    let activity = activity_frame(&records)?;
    let trend = monthly_trend(&activity)?;

    let profiles = profile_districts(&activity)?;
    let features = share_features(&profiles);
    let (clusters, names) = partition_districts(&features, &config.clustering, config.naming)?;
    let silhouette = clusters.silhouette_sample(&features, SILHOUETTE_SAMPLE);
    info!(
        districts = profiles.len(),
        inertia = clusters.inertia,
        silhouette,
        "districts clustered"
    );

    let groups: Vec<GroupSummary> = clusters
        .cluster_sizes()
        .into_iter()
        .enumerate()
        .map(|(cluster_id, districts)| GroupSummary {
            cluster_id,
            name: names[cluster_id],
            districts,
            centroid: (
                clusters.centroids[[cluster_id, 0]],
                clusters.centroids[[cluster_id, 1]],
            ),
        })
        .collect();

    let priorities = median_rule_priorities(&profiles, config.priority_share_threshold, config.top_targets);
    let districts = label_districts(profiles, &clusters.labels, &names)?;
    let targets = select_targets(&districts, &config.resources, config.top_targets);

    let pincodes = detect_anomalies(&profile_pincodes(&activity)?, &config.anomaly);
    let anomalies = top_anomalies(&pincodes, config.top_anomalies);

    let benford = audit_leading_digits(records.iter().map(|r| r.total_activity));
    debug!(sample_size = benford.sample_size, "leading-digit audit finished");

    Ok(PipelineReport {
        sources_loaded: load.loaded,
        sources_skipped: load.skipped,
        rows_read: load.rows_read,
        rows_rejected: load.rows_rejected,
        records: records.len(),
        monthly_trend: trend,
        districts,
        groups,
        inertia: clusters.inertia,
        silhouette,
        targets,
        priorities,
        pincodes,
        anomalies,
        benford,
        dashboard: None,
        map: None,
    })
}

/// Full run. Geocoding goes to the configured Nominatim endpoint when
/// geospatial export is enabled.
pub fn run_pipeline(config: &PipelineConfig) -> crate::Result<PipelineReport> {
    if config.enable_geospatial_export {
        let geocoder = NominatimGeocoder::new(&config.map)?;
        run_pipeline_with(config, Some(&geocoder as &dyn Geocoder))
    } else {
        run_pipeline_with(config, None)
    }
}

/// Full run with a caller-supplied geocoder. The map is only exported when
/// geospatial export is enabled and a geocoder is given.
pub fn run_pipeline_with(config: &PipelineConfig, geocoder: Option<&dyn Geocoder>) -> crate::Result<PipelineReport> {
    let mut report = analyze(config)?;

    if let Some(path) = &config.dashboard {
        let start = Instant::now();
        let data = Dashboard {
            monthly: &report.monthly_trend,
            districts: &report.districts,
            targets: &report.targets,
            anomalies: &report.anomalies,
            benford: &report.benford,
        };
        render_dashboard(&data, &config.theme, path)?;
        info!(path = %path.display(), elapsed_ms = start.elapsed().as_millis() as u64, "dashboard saved");
        report.dashboard = Some(path.clone());
    }

    match geocoder {
        Some(geocoder) if config.enable_geospatial_export => {
            let outcomes = geocode_targets(geocoder, &report.targets, &config.map.region);
            let html = render_map_html(&outcomes, &config.map)?;
            write_map(&config.map.output, &html)?;
            info!(path = %config.map.output.display(), "deployment map saved");
            report.map = Some(MapExport {
                path: config.map.output.clone(),
                outcomes,
            });
        }
        _ => debug!("geospatial export not requested"),
    }

    Ok(report)
}

/// Print the run summary to stdout
pub fn print_summary(report: &PipelineReport, verbose: bool) {
    println!("=== Data ===");
    println!(
        "Sources loaded: {} (skipped {})",
        report.sources_loaded.len(),
        report.sources_skipped.len()
    );
    for skipped in &report.sources_skipped {
        println!("  skipped {}: {}", skipped.path.display(), skipped.reason);
    }
    println!(
        "Records: {} unique of {} read ({} rejected)",
        report.records, report.rows_read, report.rows_rejected
    );

    println!("\n=== District Groups ===");
    println!("  Group | Name                 | Districts | Birth share | Student share");
    println!("  ------|----------------------|-----------|-------------|--------------");
    for group in &report.groups {
        println!(
            "  {:5} | {:20} | {:9} | {:11.3} | {:13.3}",
            group.cluster_id, group.name.as_str(), group.districts, group.centroid.0, group.centroid.1
        );
    }
    if verbose {
        println!("Within-cluster sum of squares: {:.4}", report.inertia);
        println!("Silhouette score (sample): {:.3}", report.silhouette);
    }

    println!("\n=== Resource Plan ===");
    for target in &report.targets {
        println!(
            "  {:<24} {:<20} activity {:>8}  student share {:>5.1}%  vans {}",
            target.district,
            target.state,
            target.total_activity,
            target.student_share * 100.0,
            target.vans_required
        );
    }
    if verbose && !report.priorities.is_empty() {
        println!("Median-rule priority districts:");
        for p in &report.priorities {
            println!("  {:<24} {:<20} activity {:>8}", p.district, p.state, p.total_activity);
        }
    }

    println!("\n=== Executive Summary ===");
    println!("1. Optimization: {} districts identified for deployment.", report.targets.len());
    match report.anomalies.first() {
        Some(top) => println!(
            "2. Security: {} anomalous pincodes detected (top: {} with activity {}).",
            report.anomaly_count(),
            top.pincode,
            top.total_activity
        ),
        None => println!("2. Security: no anomalous pincodes detected."),
    }
    println!(
        "3. Forensics: Benford's Law analysis completed over {} values.",
        report.benford.sample_size
    );
    if let Some(path) = &report.dashboard {
        println!("Dashboard saved to: {}", path.display());
    }
    match &report.map {
        Some(map) => {
            println!(
                "Map saved to: {} ({} of {} districts geocoded)",
                map.path.display(),
                map.geocoded(),
                map.outcomes.len()
            );
            for district in map.failed() {
                println!("  not geocoded: {district}");
            }
        }
        None => println!("Geospatial export skipped."),
    }
}
