//! K-Means clustering of districts over (birth_share, student_share) and
//! centroid-based naming of the resulting groups

use std::cmp::Ordering;
use std::fmt;

use linfa::prelude::*;
use linfa_clustering::KMeans;
use linfa_nn::distance::L2Dist;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::warn;

use crate::config::{ClusterParams, NamingScheme, N_GROUPS};
use crate::profile::DistrictProfile;

/// Column of `birth_share` in the feature matrix and in centroids
pub const BIRTH_AXIS: usize = 0;
/// Column of `student_share` in the feature matrix and in centroids
pub const STUDENT_AXIS: usize = 1;

/// Semantic name resolved for a fitted group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClusterName {
    SchoolHub,
    BirthingCenter,
    BalancedMixed,
    GeneralBirth,
}

impl ClusterName {
    pub const ALL: [ClusterName; 4] = [
        ClusterName::SchoolHub,
        ClusterName::BirthingCenter,
        ClusterName::BalancedMixed,
        ClusterName::GeneralBirth,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterName::SchoolHub => "School Hub (Target)",
            ClusterName::BirthingCenter => "Birthing Center",
            ClusterName::BalancedMixed => "Balanced/Mixed",
            ClusterName::GeneralBirth => "General/Birth",
        }
    }

    /// Position in `ALL`, used for palette lookup
    pub fn index(&self) -> usize {
        match self {
            ClusterName::SchoolHub => 0,
            ClusterName::BirthingCenter => 1,
            ClusterName::BalancedMixed => 2,
            ClusterName::GeneralBirth => 3,
        }
    }
}

impl fmt::Display for ClusterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterAssignment {
    pub cluster_id: usize,
    pub name: ClusterName,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabeledDistrict {
    pub profile: DistrictProfile,
    pub assignment: ClusterAssignment,
}

/// Fitted partition of the districts
#[derive(Debug)]
pub struct DistrictClusters {
    /// Group id per district, in profile order
    pub labels: Array1<usize>,
    /// (birth_share, student_share) centre per group id
    pub centroids: Array2<f64>,
    /// Within-cluster sum of squares
    pub inertia: f64,
}

impl DistrictClusters {
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.centroids.nrows()];
        for &label in self.labels.iter() {
            if let Some(size) = sizes.get_mut(label) {
                *size += 1;
            }
        }
        sizes
    }

    /// Mean silhouette coefficient over the first `sample_size` districts
    pub fn silhouette_sample(&self, features: &Array2<f64>, sample_size: usize) -> f64 {
        let n = features.nrows().min(sample_size).min(self.labels.len());
        if n < 2 {
            return 0.0;
        }

        let k = self.centroids.nrows();
        let total: f64 = (0..n)
            .map(|i| {
                let own = self.labels[i];
                let mut sums = vec![0.0; k];
                let mut counts = vec![0usize; k];
                for j in (0..n).filter(|&j| j != i) {
                    let label = self.labels[j];
                    if label < k {
                        sums[label] += euclidean_distance(&features.row(i), &features.row(j));
                        counts[label] += 1;
                    }
                }

                let a = if counts[own] == 0 {
                    0.0
                } else {
                    sums[own] / counts[own] as f64
                };
                let b = (0..k)
                    .filter(|&c| c != own && counts[c] > 0)
                    .map(|c| sums[c] / counts[c] as f64)
                    .fold(f64::INFINITY, f64::min);

                if b.is_infinite() || a.max(b) == 0.0 {
                    0.0
                } else {
                    (b - a) / a.max(b)
                }
            })
            .sum();

        total / n as f64
    }
}

/// Build the (n_districts, 2) matrix of [birth_share, student_share]
pub fn share_features(profiles: &[DistrictProfile]) -> Array2<f64> {
    let mut features = Array2::zeros((profiles.len(), 2));
    for (mut row, profile) in features.outer_iter_mut().zip(profiles) {
        row[BIRTH_AXIS] = profile.birth_share;
        row[STUDENT_AXIS] = profile.student_share;
    }
    features
}

/// Fit K-Means with exactly `N_GROUPS` groups
///
/// # Arguments
/// * `features` - Share matrix from [`share_features`]
/// * `params` - Seed, number of runs and convergence settings
///
/// # Returns
/// * Fitted `DistrictClusters`; errors when fewer than `N_GROUPS`
///   distinct feature points exist
pub fn fit_clusters(features: &Array2<f64>, params: &ClusterParams) -> crate::Result<DistrictClusters> {
    if features.ncols() != 2 {
        anyhow::bail!("Share features must have exactly 2 columns, got {}", features.ncols());
    }

    let distinct = count_distinct_rows(features);
    if distinct < N_GROUPS {
        anyhow::bail!(
            "Clustering needs at least {} districts with distinct share profiles, found {}",
            N_GROUPS,
            distinct
        );
    }

    let n_samples = features.nrows();
    let targets: Array1<usize> = Array1::zeros(n_samples);
    let dataset = Dataset::new(features.clone(), targets);

    let model = KMeans::params_with(N_GROUPS, StdRng::seed_from_u64(params.seed), L2Dist)
        .n_runs(params.n_runs)
        .max_n_iterations(params.max_iters)
        .tolerance(params.tolerance)
        .fit(&dataset)?;

    let labels: Array1<usize> = model.predict(features);
    let centroids = model.centroids().clone();
    let inertia = compute_inertia(features, &labels, &centroids);

    Ok(DistrictClusters {
        labels,
        centroids,
        inertia,
    })
}

/// Every district in group 0, centred on the mean share point
pub fn single_group(features: &Array2<f64>) -> DistrictClusters {
    let labels = Array1::zeros(features.nrows());
    let centroid = features
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(features.ncols()));
    let centroids = centroid.insert_axis(Axis(0));
    let inertia = compute_inertia(features, &labels, &centroids);

    DistrictClusters {
        labels,
        centroids,
        inertia,
    }
}

/// Cluster and name districts.
///
/// With fewer than `N_GROUPS` distinct share points no meaningful split
/// exists: all districts go to one group carrying the scheme's residual
/// name, so no district is a School Hub.
pub fn partition_districts(
    features: &Array2<f64>,
    params: &ClusterParams,
    scheme: NamingScheme,
) -> crate::Result<(DistrictClusters, Vec<ClusterName>)> {
    let distinct = count_distinct_rows(features);
    if distinct < N_GROUPS {
        warn!(
            districts = features.nrows(),
            distinct,
            "too few distinct district profiles to cluster, using a single group"
        );
        return Ok((single_group(features), vec![residual_name(scheme)]));
    }

    let clusters = fit_clusters(features, params)?;
    let names = name_clusters(&clusters.centroids, scheme)?;
    Ok((clusters, names))
}

/// Name given to groups that are neither School Hub nor Birthing Center
fn residual_name(scheme: NamingScheme) -> ClusterName {
    match scheme {
        NamingScheme::ThreeWay => ClusterName::BalancedMixed,
        NamingScheme::TwoWay => ClusterName::GeneralBirth,
    }
}

/// Resolve a name for every group id from the fitted centres.
///
/// The group with the highest student share centre is always the School Hub.
/// Under `ThreeWay`, the highest birth share among the remaining groups is
/// the Birthing Center and the last one is Balanced/Mixed. Ties go to the
/// lower group id.
pub fn name_clusters(centroids: &Array2<f64>, scheme: NamingScheme) -> crate::Result<Vec<ClusterName>> {
    if centroids.nrows() != N_GROUPS || centroids.ncols() != 2 {
        anyhow::bail!(
            "Expected a {}x2 centroid matrix, got {:?}",
            N_GROUPS,
            centroids.shape()
        );
    }

    let mut names: Vec<Option<ClusterName>> = vec![None; N_GROUPS];

    let school = argmax_where(centroids.column(STUDENT_AXIS), |_| true)
        .ok_or_else(|| anyhow::anyhow!("No centroid available for School Hub"))?;
    names[school] = Some(ClusterName::SchoolHub);

    match scheme {
        NamingScheme::ThreeWay => {
            let birth = argmax_where(centroids.column(BIRTH_AXIS), |idx| idx != school)
                .ok_or_else(|| anyhow::anyhow!("No centroid available for Birthing Center"))?;
            names[birth] = Some(ClusterName::BirthingCenter);
        }
        NamingScheme::TwoWay => {}
    }

    let rest = residual_name(scheme);
    Ok(names.into_iter().map(|name| name.unwrap_or(rest)).collect())
}

/// Attach group id and resolved name to each district
pub fn label_districts(
    profiles: Vec<DistrictProfile>,
    labels: &Array1<usize>,
    names: &[ClusterName],
) -> crate::Result<Vec<LabeledDistrict>> {
    if profiles.len() != labels.len() {
        anyhow::bail!(
            "Got {} cluster labels for {} districts",
            labels.len(),
            profiles.len()
        );
    }

    profiles
        .into_iter()
        .zip(labels.iter())
        .map(|(profile, &cluster_id)| {
            let name = *names
                .get(cluster_id)
                .ok_or_else(|| anyhow::anyhow!("Cluster id {} has no name", cluster_id))?;
            Ok(LabeledDistrict {
                profile,
                assignment: ClusterAssignment { cluster_id, name },
            })
        })
        .collect()
}

/// Index of the largest value among indices accepted by `keep`; first wins on ties
fn argmax_where(values: ArrayView1<f64>, keep: impl Fn(usize) -> bool) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(idx, _)| keep(*idx))
        .fold(None, |best: Option<(usize, f64)>, (idx, &value)| match best {
            Some((_, top)) if value.total_cmp(&top) != Ordering::Greater => best,
            _ => Some((idx, value)),
        })
        .map(|(idx, _)| idx)
}

fn count_distinct_rows(features: &Array2<f64>) -> usize {
    let mut rows: Vec<Vec<u64>> = features
        .outer_iter()
        .map(|row| row.iter().map(|v| v.to_bits()).collect())
        .collect();
    rows.sort_unstable();
    rows.dedup();
    rows.len()
}

/// Compute within-cluster sum of squares (inertia)
fn compute_inertia(features: &Array2<f64>, labels: &Array1<usize>, centroids: &Array2<f64>) -> f64 {
    labels
        .iter()
        .enumerate()
        .filter(|&(_, &cluster)| cluster < centroids.nrows())
        .map(|(i, &cluster)| euclidean_distance(&features.row(i), &centroids.row(cluster)).powi(2))
        .sum()
}

fn euclidean_distance(a: &ArrayView1<f64>, b: &ArrayView1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}
