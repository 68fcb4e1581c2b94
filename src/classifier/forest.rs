//! Bagged decision-tree ensemble used for stress inference.
//!
//! A small CART implementation: axis-aligned splits chosen by Gini impurity,
//! bootstrap aggregation across trees, and random feature subsampling at each
//! split. Trees are immutable after fitting, so the ensemble can be shared
//! read-only across sessions.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Number of stress classes the ensemble votes over.
pub const NUM_CLASSES: usize = 5;

/// Dimensionality of the feature space.
pub const NUM_FEATURES: usize = 6;

/// Hyperparameters for fitting the ensemble.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    /// Features considered at each split (random subsample)
    pub features_per_split: usize,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 10,
            min_samples_split: 2,
            // ceil(sqrt(6))
            features_per_split: 3,
        }
    }
}

/// One node of a fitted decision tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
enum TreeNode {
    Leaf {
        counts: [u32; NUM_CLASSES],
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

/// A single fitted CART tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    root: TreeNode,
}

impl DecisionTree {
    fn fit(
        samples: &[[f64; NUM_FEATURES]],
        labels: &[usize],
        params: &ForestParams,
        rng: &mut StdRng,
    ) -> Self {
        let indices: Vec<usize> = (0..samples.len()).collect();
        Self {
            root: build_node(samples, labels, indices, 0, params, rng),
        }
    }

    /// Class distribution at the leaf this sample falls into.
    fn predict_proba(&self, x: &[f64; NUM_FEATURES]) -> [f64; NUM_CLASSES] {
        let mut node = &self.root;
        loop {
            match node {
                TreeNode::Leaf { counts } => return normalize(counts),
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if x[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }
}

/// Bootstrap-aggregated ensemble of decision trees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressForest {
    params: ForestParams,
    trees: Vec<DecisionTree>,
}

impl StressForest {
    /// Fit the ensemble on labeled samples. Deterministic for a given seed.
    pub fn fit(
        samples: &[[f64; NUM_FEATURES]],
        labels: &[usize],
        params: ForestParams,
        seed: u64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let n = samples.len();

        let trees = (0..params.n_trees)
            .map(|_| {
                // Bootstrap sample with replacement
                let mut boot_samples = Vec::with_capacity(n);
                let mut boot_labels = Vec::with_capacity(n);
                for _ in 0..n {
                    let i = rng.gen_range(0..n);
                    boot_samples.push(samples[i]);
                    boot_labels.push(labels[i]);
                }
                DecisionTree::fit(&boot_samples, &boot_labels, &params, &mut rng)
            })
            .collect();

        Self { params, trees }
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Average class distribution across all trees. Sums to 1.
    pub fn predict_proba(&self, x: &[f64; NUM_FEATURES]) -> [f64; NUM_CLASSES] {
        let mut probabilities = [0.0; NUM_CLASSES];
        for tree in &self.trees {
            let p = tree.predict_proba(x);
            for (acc, value) in probabilities.iter_mut().zip(p.iter()) {
                *acc += value;
            }
        }
        let n = self.trees.len().max(1) as f64;
        for p in &mut probabilities {
            *p /= n;
        }
        probabilities
    }
}

fn class_counts(labels: &[usize], indices: &[usize]) -> [u32; NUM_CLASSES] {
    let mut counts = [0u32; NUM_CLASSES];
    for &i in indices {
        counts[labels[i]] += 1;
    }
    counts
}

fn gini(counts: &[u32; NUM_CLASSES], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    1.0 - counts
        .iter()
        .map(|&c| {
            let p = c as f64 / total;
            p * p
        })
        .sum::<f64>()
}

fn is_pure(counts: &[u32; NUM_CLASSES]) -> bool {
    counts.iter().filter(|&&c| c > 0).count() <= 1
}

fn normalize(counts: &[u32; NUM_CLASSES]) -> [f64; NUM_CLASSES] {
    let total: u32 = counts.iter().sum();
    if total == 0 {
        return [1.0 / NUM_CLASSES as f64; NUM_CLASSES];
    }
    let mut probabilities = [0.0; NUM_CLASSES];
    for (p, &c) in probabilities.iter_mut().zip(counts.iter()) {
        *p = c as f64 / total as f64;
    }
    probabilities
}

fn build_node(
    samples: &[[f64; NUM_FEATURES]],
    labels: &[usize],
    indices: Vec<usize>,
    depth: usize,
    params: &ForestParams,
    rng: &mut StdRng,
) -> TreeNode {
    let counts = class_counts(labels, &indices);

    if depth >= params.max_depth || indices.len() < params.min_samples_split || is_pure(&counts) {
        return TreeNode::Leaf { counts };
    }

    match best_split(samples, labels, &indices, &counts, params, rng) {
        Some((feature, threshold)) => {
            let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
                .into_iter()
                .partition(|&i| samples[i][feature] <= threshold);

            // A degenerate partition means the chosen threshold separated
            // nothing; fall back to a leaf.
            if left_idx.is_empty() || right_idx.is_empty() {
                return TreeNode::Leaf { counts };
            }

            TreeNode::Split {
                feature,
                threshold,
                left: Box::new(build_node(samples, labels, left_idx, depth + 1, params, rng)),
                right: Box::new(build_node(samples, labels, right_idx, depth + 1, params, rng)),
            }
        }
        None => TreeNode::Leaf { counts },
    }
}

/// Pick the impurity-minimizing split over a random feature subsample.
///
/// Candidate thresholds are midpoints between consecutive distinct values;
/// left/right class counts are updated incrementally while sweeping the
/// sorted samples.
fn best_split(
    samples: &[[f64; NUM_FEATURES]],
    labels: &[usize],
    indices: &[usize],
    parent_counts: &[u32; NUM_CLASSES],
    params: &ForestParams,
    rng: &mut StdRng,
) -> Option<(usize, f64)> {
    let n = indices.len();
    let parent_gini = gini(parent_counts, n);

    let mut features: Vec<usize> = (0..NUM_FEATURES).collect();
    features.shuffle(rng);
    features.truncate(params.features_per_split.clamp(1, NUM_FEATURES));

    let mut best: Option<(f64, usize, f64)> = None;

    for &feature in &features {
        let mut pairs: Vec<(f64, usize)> = indices
            .iter()
            .map(|&i| (samples[i][feature], labels[i]))
            .collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut left = [0u32; NUM_CLASSES];
        let mut right = *parent_counts;

        for i in 0..n - 1 {
            left[pairs[i].1] += 1;
            right[pairs[i].1] -= 1;

            if pairs[i].0 == pairs[i + 1].0 {
                continue;
            }

            let n_left = i + 1;
            let n_right = n - n_left;
            let weighted = (n_left as f64 * gini(&left, n_left)
                + n_right as f64 * gini(&right, n_right))
                / n as f64;

            if best.map_or(true, |(b, _, _)| weighted < b) {
                let threshold = (pairs[i].0 + pairs[i + 1].0) / 2.0;
                best = Some((weighted, feature, threshold));
            }
        }
    }

    // Require strict impurity improvement over the parent
    best.filter(|&(impurity, _, _)| impurity + 1e-12 < parent_gini)
        .map(|(_, feature, threshold)| (feature, threshold))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable_corpus() -> (Vec<[f64; NUM_FEATURES]>, Vec<usize>) {
        // Classes cleanly separated along the first feature
        let mut samples = Vec::new();
        let mut labels = Vec::new();
        for class in 0..NUM_CLASSES {
            for j in 0..20 {
                let base = class as f64 * 10.0;
                samples.push([
                    base + (j % 5) as f64 * 0.1,
                    base * 0.01,
                    0.0,
                    0.0,
                    0.0,
                    0.0,
                ]);
                labels.push(class);
            }
        }
        (samples, labels)
    }

    fn small_params() -> ForestParams {
        ForestParams {
            n_trees: 15,
            max_depth: 6,
            min_samples_split: 2,
            features_per_split: 3,
        }
    }

    #[test]
    fn fit_is_deterministic_for_a_seed() {
        let (samples, labels) = separable_corpus();
        let a = StressForest::fit(&samples, &labels, small_params(), 7);
        let b = StressForest::fit(&samples, &labels, small_params(), 7);

        let x = [25.0, 0.25, 0.0, 0.0, 0.0, 0.0];
        assert_eq!(a.predict_proba(&x), b.predict_proba(&x));
    }

    #[test]
    fn predictions_recover_separable_classes() {
        let (samples, labels) = separable_corpus();
        let forest = StressForest::fit(&samples, &labels, small_params(), 42);

        for class in 0..NUM_CLASSES {
            let x = [class as f64 * 10.0 + 0.2, 0.0, 0.0, 0.0, 0.0, 0.0];
            let p = forest.predict_proba(&x);
            let argmax = p
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| i)
                .unwrap();
            assert_eq!(argmax, class, "distribution: {p:?}");
        }
    }

    #[test]
    fn probabilities_sum_to_one() {
        let (samples, labels) = separable_corpus();
        let forest = StressForest::fit(&samples, &labels, small_params(), 1);

        let p = forest.predict_proba(&[13.0, 0.0, 0.5, 2.0, 0.1, 9.0]);
        let sum: f64 = p.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(p.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn forest_survives_serde_round_trip() {
        let (samples, labels) = separable_corpus();
        let forest = StressForest::fit(&samples, &labels, small_params(), 3);

        let json = serde_json::to_string(&forest).expect("serialize");
        let restored: StressForest = serde_json::from_str(&json).expect("deserialize");

        let x = [42.0, 0.4, 0.0, 0.0, 0.0, 0.0];
        assert_eq!(forest.predict_proba(&x), restored.predict_proba(&x));
    }
}
