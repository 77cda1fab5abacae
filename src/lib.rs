//! Enrolment Insights: batch analytics over civil-registration enrolment records
//!
//! The pipeline loads and de-duplicates enrolment CSVs, profiles districts and
//! pincodes, clusters districts by age-band shares with K-Means, flags
//! anomalous pincodes, sizes mobile-unit deployments and audits leading
//! digits against Benford's Law. Results are rendered as a dashboard image and
//! an optional deployment map.

pub mod anomaly;
pub mod benford;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod geo;
pub mod model;
pub mod pipeline;
pub mod profile;
pub mod resources;
pub mod viz;

// Re-export public items for easier access
pub use cli::Args;
pub use config::PipelineConfig;
pub use data::{derive_features, load_records, Record};
pub use error::IngestionError;
pub use model::{fit_clusters, name_clusters, partition_districts, ClusterName};
pub use pipeline::{analyze, print_summary, run_pipeline, run_pipeline_with, PipelineReport};
pub use resources::calc_vans;

/// Common result type used throughout the application
pub type Result<T> = anyhow::Result<T>;
