//! Command-line interface definitions and argument parsing

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::config::{
    AnomalyParams, AnomalyStrategy, ClusterParams, MapConfig, NamingScheme, PipelineConfig, ResourcePolicy,
    DEFAULT_FALLBACK_DIR, DEFAULT_INPUT_FILES,
};

/// District segmentation, pincode anomaly detection and resource planning for enrolment data
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Input CSV files (defaults to the three standard enrolment extracts)
    #[arg(short, long = "input", num_args = 1..)]
    pub inputs: Vec<PathBuf>,

    /// Directory searched when an input file is not found as given
    #[arg(long, default_value = DEFAULT_FALLBACK_DIR)]
    pub fallback_dir: PathBuf,

    /// Output path for the dashboard image
    #[arg(short, long, default_value = "dashboard_combined.png")]
    pub output: PathBuf,

    /// Skip rendering the dashboard
    #[arg(long)]
    pub no_dashboard: bool,

    /// Geocode target districts and export the deployment map
    #[arg(long)]
    pub map: bool,

    /// Output path for the deployment map
    #[arg(long, default_value = "deployment_map.html")]
    pub map_output: PathBuf,

    /// Per-request geocoding timeout in seconds
    #[arg(long, default_value = "10")]
    pub geocode_timeout: u64,

    /// Group naming scheme
    #[arg(long, value_enum, default_value_t = NamingScheme::ThreeWay)]
    pub naming: NamingScheme,

    /// Random seed for clustering and the isolation forest
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Maximum iterations for K-Means
    #[arg(long, default_value = "300")]
    pub max_iters: u64,

    /// Tolerance for K-Means convergence
    #[arg(long, default_value = "1e-4")]
    pub tolerance: f64,

    /// Outlier model for pincode activity
    #[arg(long, value_enum, default_value_t = AnomalyStrategy::Isolation)]
    pub anomaly_strategy: AnomalyStrategy,

    /// Expected outlier fraction for the isolation forest
    #[arg(long, default_value = "0.001")]
    pub contamination: f64,

    /// Z-score cut-off for the deviation strategy
    #[arg(long, default_value = "15.0")]
    pub z_threshold: f64,

    /// Number of anomalous pincodes to report
    #[arg(long, default_value = "5")]
    pub top_anomalies: usize,

    /// Number of target districts to plan for
    #[arg(long, default_value = "10")]
    pub top_targets: usize,

    /// Days in one planning period
    #[arg(long, default_value = "30")]
    pub days_per_period: u64,

    /// Enrolments one van handles per day
    #[arg(long, default_value = "50")]
    pub capacity_per_van: u64,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Validate the arguments and build the run configuration
    pub fn into_config(self) -> crate::Result<PipelineConfig> {
        if !(self.contamination > 0.0 && self.contamination <= 0.5) {
            anyhow::bail!("Contamination must be in (0, 0.5], got {}", self.contamination);
        }
        if self.geocode_timeout == 0 {
            anyhow::bail!("Geocoding timeout must be at least one second");
        }

        let resources = ResourcePolicy::new(self.days_per_period, self.capacity_per_van)?;

        let inputs = if self.inputs.is_empty() {
            DEFAULT_INPUT_FILES.iter().map(PathBuf::from).collect()
        } else {
            self.inputs
        };

        let defaults = PipelineConfig::default();
        Ok(PipelineConfig {
            inputs,
            fallback_dir: Some(self.fallback_dir),
            clustering: ClusterParams {
                seed: self.seed,
                max_iters: self.max_iters,
                tolerance: self.tolerance,
                ..ClusterParams::default()
            },
            naming: self.naming,
            anomaly: AnomalyParams {
                strategy: self.anomaly_strategy,
                contamination: self.contamination,
                z_threshold: self.z_threshold,
                seed: self.seed,
                ..AnomalyParams::default()
            },
            top_anomalies: self.top_anomalies,
            top_targets: self.top_targets,
            resources,
            dashboard: (!self.no_dashboard).then_some(self.output),
            map: MapConfig {
                output: self.map_output,
                timeout: Duration::from_secs(self.geocode_timeout),
                ..MapConfig::default()
            },
            enable_geospatial_export: self.map,
            ..defaults
        })
    }
}
