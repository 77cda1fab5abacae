//! Run configuration: policy constants, model parameters and chart styling

use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;
use plotters::style::RGBColor;

/// Input file names searched for when none are given on the command line.
pub const DEFAULT_INPUT_FILES: [&str; 3] = [
    "api_data_aadhar_enrolment_0_500000.csv",
    "api_data_aadhar_enrolment_500000_1000000.csv",
    "api_data_aadhar_enrolment_1000000_1006029.csv",
];

/// Directory tried when an input file is not found at its given path.
pub const DEFAULT_FALLBACK_DIR: &str = "data";

/// District clustering always partitions into this many groups.
pub const N_GROUPS: usize = 3;

/// Parameters for the k-means fit over district share features
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterParams {
    pub seed: u64,
    /// Independent initializations; the fit with the lowest inertia wins
    pub n_runs: usize,
    pub max_iters: u64,
    pub tolerance: f64,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            seed: 42,
            n_runs: 10,
            max_iters: 300,
            tolerance: 1e-4,
        }
    }
}

/// How semantic names are handed out to the fitted groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum NamingScheme {
    /// School Hub, Birthing Center, Balanced/Mixed
    #[default]
    ThreeWay,
    /// School Hub, with every other group named General/Birth
    TwoWay,
}

/// Outlier model used for pincode activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum AnomalyStrategy {
    /// Isolation forest over total activity with a contamination fraction
    #[default]
    Isolation,
    /// Standard score over total activity against a fixed threshold
    Deviation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyParams {
    pub strategy: AnomalyStrategy,
    /// Expected outlier fraction for the isolation forest
    pub contamination: f64,
    pub n_trees: usize,
    pub max_samples: usize,
    /// Standard-score cut-off for the deviation strategy
    pub z_threshold: f64,
    pub seed: u64,
}

impl Default for AnomalyParams {
    fn default() -> Self {
        Self {
            strategy: AnomalyStrategy::Isolation,
            contamination: 0.001,
            n_trees: 100,
            max_samples: 256,
            z_threshold: 15.0,
            seed: 42,
        }
    }
}

/// Mobile-unit sizing policy.
///
/// Both divisors are validated non-zero at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourcePolicy {
    days_per_period: u64,
    capacity_per_van: u64,
}

impl ResourcePolicy {
    pub fn new(days_per_period: u64, capacity_per_van: u64) -> crate::Result<Self> {
        if days_per_period == 0 || capacity_per_van == 0 {
            anyhow::bail!(
                "days per period ({days_per_period}) and capacity per van ({capacity_per_van}) must both be positive"
            );
        }
        Ok(Self {
            days_per_period,
            capacity_per_van,
        })
    }

    pub fn days_per_period(&self) -> u64 {
        self.days_per_period
    }

    pub fn capacity_per_van(&self) -> u64 {
        self.capacity_per_van
    }
}

impl Default for ResourcePolicy {
    fn default() -> Self {
        Self {
            days_per_period: 30,
            capacity_per_van: 50,
        }
    }
}

/// Styling handed to the dashboard renderer
#[derive(Debug, Clone)]
pub struct ChartTheme {
    pub size: (u32, u32),
    pub background: RGBColor,
    pub font_family: &'static str,
    pub caption_size: u32,
    pub label_size: u32,
    pub trend_color: RGBColor,
    /// Colours per cluster name, in `ClusterName::ALL` order
    pub cluster_palette: [RGBColor; 4],
    pub target_color: RGBColor,
    pub anomaly_color: RGBColor,
    pub vans_color: RGBColor,
    pub observed_color: RGBColor,
    pub expected_color: RGBColor,
}

impl Default for ChartTheme {
    fn default() -> Self {
        Self {
            size: (2000, 2400),
            background: RGBColor(255, 255, 255),
            font_family: "sans-serif",
            caption_size: 28,
            label_size: 15,
            trend_color: RGBColor(44, 62, 80),
            cluster_palette: [
                RGBColor(68, 1, 84),
                RGBColor(33, 145, 140),
                RGBColor(253, 231, 37),
                RGBColor(59, 82, 139),
            ],
            target_color: RGBColor(203, 24, 29),
            anomaly_color: RGBColor(250, 128, 114),
            vans_color: RGBColor(33, 113, 181),
            observed_color: RGBColor(70, 110, 220),
            expected_color: RGBColor(220, 20, 60),
        }
    }
}

/// Settings for the optional geocoding and map export
#[derive(Debug, Clone, PartialEq)]
pub struct MapConfig {
    pub output: PathBuf,
    pub endpoint: String,
    pub user_agent: String,
    /// Appended to each district name in the lookup query
    pub region: String,
    pub timeout: Duration,
    pub center: (f64, f64),
    pub zoom: u8,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from("deployment_map.html"),
            endpoint: "https://nominatim.openstreetmap.org/search".to_string(),
            user_agent: "enrolment-insights".to_string(),
            region: "India".to_string(),
            timeout: Duration::from_secs(10),
            center: (20.5937, 78.9629),
            zoom: 5,
        }
    }
}

/// Everything one pipeline run needs
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub inputs: Vec<PathBuf>,
    pub fallback_dir: Option<PathBuf>,
    pub clustering: ClusterParams,
    pub naming: NamingScheme,
    pub anomaly: AnomalyParams,
    pub top_anomalies: usize,
    pub top_targets: usize,
    /// Student share above which a high-volume district is a priority
    pub priority_share_threshold: f64,
    pub resources: ResourcePolicy,
    /// Dashboard image path; `None` skips rendering
    pub dashboard: Option<PathBuf>,
    pub theme: ChartTheme,
    pub map: MapConfig,
    pub enable_geospatial_export: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            inputs: DEFAULT_INPUT_FILES.iter().map(PathBuf::from).collect(),
            fallback_dir: Some(PathBuf::from(DEFAULT_FALLBACK_DIR)),
            clustering: ClusterParams::default(),
            naming: NamingScheme::default(),
            anomaly: AnomalyParams::default(),
            top_anomalies: 5,
            top_targets: 10,
            priority_share_threshold: 0.40,
            resources: ResourcePolicy::default(),
            dashboard: Some(PathBuf::from("dashboard_combined.png")),
            theme: ChartTheme::default(),
            map: MapConfig::default(),
            enable_geospatial_export: false,
        }
    }
}
