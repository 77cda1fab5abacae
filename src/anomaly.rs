//! Outlier detection over per-pincode activity
//!
//! Two detectors share one output shape:
//! * an isolation forest over the single `total_activity` feature, flagging
//!   roughly `contamination` of the pincodes (default)
//! * a standard-score detector flagging pincodes whose z-score exceeds a fixed
//!   threshold; only the upper tail counts

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use statrs::statistics::Statistics;
use tracing::debug;

use crate::config::{AnomalyParams, AnomalyStrategy};
use crate::profile::PincodeActivity;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Pincode activity with its outlier verdict
#[derive(Debug, Clone, PartialEq)]
pub struct PincodeProfile {
    pub pincode: String,
    pub total_activity: u64,
    /// Isolation anomaly score in (0, 1], or the z-score for the deviation detector
    pub score: f64,
    pub is_anomaly: bool,
}

/// Run the configured detector over every pincode
pub fn detect_anomalies(pincodes: &[PincodeActivity], params: &AnomalyParams) -> Vec<PincodeProfile> {
    let values: Vec<f64> = pincodes.iter().map(|p| p.total_activity as f64).collect();

    let (scores, flags) = match params.strategy {
        AnomalyStrategy::Isolation => isolation_flags(&values, params),
        AnomalyStrategy::Deviation => deviation_flags(&values, params.z_threshold),
    };

    let profiles: Vec<PincodeProfile> = pincodes
        .iter()
        .zip(scores.into_iter().zip(flags))
        .map(|(p, (score, is_anomaly))| PincodeProfile {
            pincode: p.pincode.clone(),
            total_activity: p.total_activity,
            score,
            is_anomaly,
        })
        .collect();

    debug!(
        strategy = ?params.strategy,
        pincodes = profiles.len(),
        flagged = profiles.iter().filter(|p| p.is_anomaly).count(),
        "anomaly detection finished"
    );
    profiles
}

/// Flagged pincodes, highest activity first.
///
/// The sort is stable so equal activity keeps input order.
pub fn top_anomalies(profiles: &[PincodeProfile], n: usize) -> Vec<PincodeProfile> {
    let mut flagged: Vec<PincodeProfile> = profiles.iter().filter(|p| p.is_anomaly).cloned().collect();
    flagged.sort_by(|a, b| b.total_activity.cmp(&a.total_activity));
    flagged.truncate(n);
    flagged
}

fn isolation_flags(values: &[f64], params: &AnomalyParams) -> (Vec<f64>, Vec<bool>) {
    if values.len() < 2 {
        return (vec![0.0; values.len()], vec![false; values.len()]);
    }

    let mut rng = StdRng::seed_from_u64(params.seed);
    let forest = IsolationForest::fit(values, params.n_trees, params.max_samples, &mut rng);
    let scores: Vec<f64> = values.iter().map(|&v| forest.score(v)).collect();

    let mut sorted = scores.clone();
    sorted.sort_by(f64::total_cmp);
    let cutoff = percentile(&sorted, 1.0 - params.contamination);

    let flags = scores.iter().map(|&s| s > cutoff).collect();
    (scores, flags)
}

fn deviation_flags(values: &[f64], threshold: f64) -> (Vec<f64>, Vec<bool>) {
    let mean = values.iter().mean();
    let std_dev = values.iter().std_dev();

    if !std_dev.is_finite() || std_dev == 0.0 {
        return (vec![0.0; values.len()], vec![false; values.len()]);
    }

    let scores: Vec<f64> = values.iter().map(|v| (v - mean) / std_dev).collect();
    let flags = scores.iter().map(|&z| z > threshold).collect();
    (scores, flags)
}

/// Linear-interpolated quantile of sorted data, `q` in [0, 1]
fn percentile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
        }
    }
}

/// Expected path length of an unsuccessful search in a binary search tree of `n` nodes
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

#[derive(Debug)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn grow(values: Vec<f64>, depth: usize, limit: usize, rng: &mut StdRng) -> Node {
        let (min, max) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));

        if depth >= limit || values.len() <= 1 || min >= max {
            return Node::Leaf { size: values.len() };
        }

        let threshold = rng.gen_range(min..max);
        let (left, right): (Vec<f64>, Vec<f64>) = values.into_iter().partition(|&v| v < threshold);

        Node::Split {
            threshold,
            left: Box::new(Node::grow(left, depth + 1, limit, rng)),
            right: Box::new(Node::grow(right, depth + 1, limit, rng)),
        }
    }

    fn path_length(&self, value: f64) -> f64 {
        let mut node = self;
        let mut depth = 0.0;
        loop {
            match node {
                Node::Leaf { size } => return depth + average_path_length(*size),
                Node::Split {
                    threshold,
                    left,
                    right,
                } => {
                    node = if value < *threshold { left } else { right };
                    depth += 1.0;
                }
            }
        }
    }
}

/// Isolation forest over a single feature
#[derive(Debug)]
pub struct IsolationForest {
    trees: Vec<Node>,
    sample_size: usize,
}

impl IsolationForest {
    /// Grow `n_trees` trees, each on a random sub-sample of at most `max_samples` values
    pub fn fit(values: &[f64], n_trees: usize, max_samples: usize, rng: &mut StdRng) -> Self {
        let sample_size = max_samples.clamp(1, values.len().max(1));
        let height_limit = (sample_size as f64).log2().ceil().max(1.0) as usize;

        let trees = (0..n_trees.max(1))
            .map(|_| {
                let sample: Vec<f64> = index::sample(rng, values.len(), sample_size)
                    .iter()
                    .map(|i| values[i])
                    .collect();
                Node::grow(sample, 0, height_limit, rng)
            })
            .collect();

        Self { trees, sample_size }
    }

    /// Anomaly score in (0, 1]; values near 1 isolate quickly
    pub fn score(&self, value: f64) -> f64 {
        let norm = average_path_length(self.sample_size);
        if norm == 0.0 {
            return 0.5;
        }
        let mean_path =
            self.trees.iter().map(|t| t.path_length(value)).sum::<f64>() / self.trees.len() as f64;
        2f64.powf(-mean_path / norm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pincodes(values: &[u64]) -> Vec<PincodeActivity> {
        values
            .iter()
            .enumerate()
            .map(|(i, &total_activity)| PincodeActivity {
                pincode: format!("{}", 400000 + i),
                total_activity,
            })
            .collect()
    }

    fn with_outlier() -> Vec<PincodeActivity> {
        let mut values: Vec<u64> = (0..1000).map(|i| 100 + i).collect();
        values.push(1_000_000);
        pincodes(&values)
    }

    #[test]
    fn test_isolation_flags_extreme_pincode() {
        let data = with_outlier();
        let profiles = detect_anomalies(&data, &AnomalyParams::default());

        assert_eq!(profiles.len(), data.len());
        let flagged: Vec<&PincodeProfile> = profiles.iter().filter(|p| p.is_anomaly).collect();
        assert!(!flagged.is_empty() && flagged.len() <= 2, "flagged {}", flagged.len());

        let top = top_anomalies(&profiles, 5);
        assert_eq!(top[0].total_activity, 1_000_000);
        assert_eq!(top[0].pincode, "401000");
    }

    #[test]
    fn test_isolation_is_reproducible() {
        let data = with_outlier();
        let first = detect_anomalies(&data, &AnomalyParams::default());
        let second = detect_anomalies(&data, &AnomalyParams::default());
        assert_eq!(first, second);
    }

    #[test]
    fn test_isolation_flags_nothing_for_constant_activity() {
        let data = pincodes(&[50; 40]);
        let profiles = detect_anomalies(&data, &AnomalyParams::default());
        assert!(profiles.iter().all(|p| !p.is_anomaly));
    }

    #[test]
    fn test_single_pincode_is_never_flagged() {
        let data = pincodes(&[9_999]);
        for strategy in [AnomalyStrategy::Isolation, AnomalyStrategy::Deviation] {
            let params = AnomalyParams {
                strategy,
                ..AnomalyParams::default()
            };
            assert!(!detect_anomalies(&data, &params)[0].is_anomaly);
        }
    }

    #[test]
    fn test_deviation_flags_only_upper_tail() {
        let mut values = vec![100u64; 1000];
        values[10] = 1_000_000;
        values[20] = 0;
        let params = AnomalyParams {
            strategy: AnomalyStrategy::Deviation,
            ..AnomalyParams::default()
        };

        let profiles = detect_anomalies(&pincodes(&values), &params);
        let flagged: Vec<usize> = profiles
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_anomaly)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(flagged, vec![10]);
        assert!(profiles[10].score > 15.0);
        assert!(profiles[20].score < 0.0);
    }

    #[test]
    fn test_top_anomalies_is_stable_descending() {
        let make = |pincode: &str, total_activity: u64, is_anomaly: bool| PincodeProfile {
            pincode: pincode.to_string(),
            total_activity,
            score: 0.0,
            is_anomaly,
        };
        let profiles = vec![
            make("a", 10, true),
            make("b", 30, true),
            make("c", 99, false),
            make("d", 10, true),
            make("e", 30, true),
        ];

        let top: Vec<String> = top_anomalies(&profiles, 3).into_iter().map(|p| p.pincode).collect();
        assert_eq!(top, vec!["b", "e", "a"]);
    }

    #[test]
    fn test_percentile_interpolates() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&sorted, 0.0), 1.0);
        assert_eq!(percentile(&sorted, 1.0), 4.0);
        assert!((percentile(&sorted, 0.5) - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        // 2 * (ln 255 + gamma) - 2 * 255 / 256
        assert!((average_path_length(256) - 10.244_770_920_116_851).abs() < 1e-6);
    }
}
