//! Isolation forest outlier detector.
//!
//! Each tree recursively partitions a random subsample with random
//! axis-aligned splits. Rows that are isolated after few splits get short
//! average path lengths and therefore high anomaly scores:
//!
//! `score(x) = 2^(-E[h(x)] / c(psi))`
//!
//! where `h(x)` is the path length in one tree, `psi` the subsample size and
//! `c(n)` the average path length of an unsuccessful BST search.

use super::OutlierDetector;
use crate::config::PipelineConfig;
use crate::features::FeatureMatrix;
use rand::prelude::*;
use rand::seq::index;
use tracing::debug;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Average path length of an unsuccessful search in a BST of `n` nodes.
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

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// One isolation tree stored as an arena of nodes; index 0 is the root.
#[derive(Debug, Clone)]
struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn build(features: &FeatureMatrix, sample: &[usize], max_depth: usize, rng: &mut StdRng) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow(features, sample.to_vec(), 0, max_depth, rng);
        tree
    }

    fn grow(
        &mut self,
        features: &FeatureMatrix,
        rows: Vec<usize>,
        depth: usize,
        max_depth: usize,
        rng: &mut StdRng,
    ) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { size: rows.len() });
        if depth >= max_depth || rows.len() <= 1 {
            return id;
        }

        // Only features that still vary within this node can split it.
        let splittable: Vec<(usize, f64, f64)> = (0..features.n_features())
            .filter_map(|j| {
                let (min, max) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                    let v = features.value(i, j);
                    (lo.min(v), hi.max(v))
                });
                (min < max).then_some((j, min, max))
            })
            .collect();
        if splittable.is_empty() {
            return id;
        }

        let (feature, min, max) = splittable[rng.gen_range(0..splittable.len())];
        let threshold = rng.gen_range(min..max);
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&i| features.value(i, feature) < threshold);

        let left = self.grow(features, left_rows, depth + 1, max_depth, rng);
        let right = self.grow(features, right_rows, depth + 1, max_depth, rng);
        self.nodes[id] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        id
    }

    fn path_length(&self, row: &[f64]) -> f64 {
        let mut node = 0;
        let mut depth = 0.0;
        loop {
            match &self.nodes[node] {
                Node::Leaf { size } => return depth + average_path_length(*size),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] < *threshold { *left } else { *right };
                    depth += 1.0;
                }
            }
        }
    }
}

/// Unsupervised isolation forest.
///
/// # Example
///
/// ```rust,ignore
/// use hemo_processing::scoring::{IsolationForest, OutlierDetector};
///
/// let labels = IsolationForest::default().fit_predict(&matrix, 0.01, 42)?;
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsolationForest {
    n_estimators: usize,
    max_samples: usize,
}

impl Default for IsolationForest {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_samples: 256,
        }
    }
}

impl IsolationForest {
    pub fn new(n_estimators: usize, max_samples: usize) -> Self {
        Self {
            n_estimators: n_estimators.max(1),
            max_samples: max_samples.max(2),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.n_estimators, config.max_samples)
    }

    pub fn n_estimators(&self) -> usize {
        self.n_estimators
    }

    pub fn max_samples(&self) -> usize {
        self.max_samples
    }
}

impl OutlierDetector for IsolationForest {
    fn name(&self) -> &str {
        "isolation_forest"
    }

    fn score(&self, features: &FeatureMatrix, seed: u64) -> Vec<f64> {
        let n = features.n_rows();
        if n == 0 {
            return Vec::new();
        }

        let psi = self.max_samples.min(n);
        let max_depth = (psi as f64).log2().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(seed);

        let trees: Vec<IsolationTree> = (0..self.n_estimators)
            .map(|_| {
                let sample = index::sample(&mut rng, n, psi).into_vec();
                IsolationTree::build(features, &sample, max_depth, &mut rng)
            })
            .collect();
        debug!(
            "Grew {} isolation trees over {} rows (psi={}, max_depth={})",
            trees.len(),
            n,
            psi,
            max_depth
        );

        let normalizer = average_path_length(psi);
        (0..n)
            .map(|i| {
                let row = features.row(i);
                let mean_path =
                    trees.iter().map(|t| t.path_length(row)).sum::<f64>() / trees.len() as f64;
                if normalizer > 0.0 {
                    2f64.powf(-mean_path / normalizer)
                } else {
                    0.5
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clustered_with_outliers() -> FeatureMatrix {
        // 990 grade-I patients aged 20-40, 10 grade-IV patients aged 91-100
        let mut grade = Vec::new();
        let mut age = Vec::new();
        for i in 0..990 {
            grade.push(0.0);
            age.push(20.0 + (i % 21) as f64);
        }
        for i in 0..10 {
            grade.push(1.0);
            age.push(91.0 + i as f64);
        }
        FeatureMatrix::from_columns(vec!["grade".into(), "age".into()], vec![grade, age]).unwrap()
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        let c256 = average_path_length(256);
        assert!((c256 - 10.24).abs() < 0.01, "c(256) = {c256}");
    }

    #[test]
    fn test_scores_are_deterministic_for_a_seed() {
        let matrix = clustered_with_outliers();
        let forest = IsolationForest::new(20, 64);
        assert_eq!(forest.score(&matrix, 7), forest.score(&matrix, 7));
    }

    #[test]
    fn test_outliers_score_higher() {
        let matrix = clustered_with_outliers();
        let scores = IsolationForest::default().score(&matrix, 42);

        let max_normal = scores[..990].iter().cloned().fold(f64::MIN, f64::max);
        let min_outlier = scores[990..].iter().cloned().fold(f64::MAX, f64::min);
        assert!(
            min_outlier > max_normal,
            "outliers should isolate faster: min outlier {min_outlier}, max normal {max_normal}"
        );
        assert!(scores.iter().all(|s| *s > 0.0 && *s <= 1.0));
    }

    #[test]
    fn test_fit_predict_flags_injected_outliers() {
        let matrix = clustered_with_outliers();
        let labels = IsolationForest::default()
            .fit_predict(&matrix, 0.01, 42)
            .unwrap();

        assert_eq!(labels.iter().filter(|&&l| l == 1).count(), 10);
        assert!(labels[990..].iter().all(|&l| l == 1));
    }

    #[test]
    fn test_small_subsample_than_rows() {
        let matrix = FeatureMatrix::from_columns(
            vec!["x".into()],
            vec![vec![1.0, 2.0, 3.0, 100.0]],
        )
        .unwrap();
        let scores = IsolationForest::new(50, 256).score(&matrix, 1);
        assert_eq!(scores.len(), 4);
        let top = scores
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(top, Some(3));
    }
}
