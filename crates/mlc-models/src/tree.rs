//! Weighted CART classification trees (Gini impurity) for the forest.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::node::{Arena, FeatureIndex, NodeIndex, Tree};

/// Stopping rules and feature subsampling for one tree.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TreeGrowth {
    pub(crate) max_depth: Option<usize>,
    pub(crate) min_samples_split: usize,
    pub(crate) min_samples_leaf: usize,
    pub(crate) max_features: usize,
}

/// Weighted class totals `[negative, positive]`.
type ClassWeight = [f64; 2];

/// Gini impurity `1 - Σ pᵢ²` of weighted class totals.
fn gini(w: ClassWeight) -> f64 {
    let total = w[0] + w[1];
    if total <= 0.0 {
        return 0.0;
    }
    let (p0, p1) = (w[0] / total, w[1] / total);
    1.0 - p0 * p0 - p1 * p1
}

struct SplitResult {
    feature: FeatureIndex,
    threshold: f64,
    left_indices: Vec<usize>,
    right_indices: Vec<usize>,
}

/// Grow a classification tree on `indices` (duplicates allowed, as in a
/// bootstrap sample). Leaves hold the weighted positive fraction.
///
/// `cols` is column-major: `cols[feature_idx][sample_idx]`.
pub(crate) fn grow_classifier(
    cols: &[Vec<f64>],
    labels: &[u8],
    weights: &[f64],
    indices: &[usize],
    growth: &TreeGrowth,
    rng: &mut ChaCha8Rng,
) -> Tree {
    let mut arena = Arena::default();
    build(cols, labels, weights, indices, growth, 0, rng, &mut arena);
    arena.finish()
}

#[allow(clippy::too_many_arguments)]
fn build(
    cols: &[Vec<f64>],
    labels: &[u8],
    weights: &[f64],
    indices: &[usize],
    growth: &TreeGrowth,
    depth: usize,
    rng: &mut ChaCha8Rng,
    arena: &mut Arena,
) -> NodeIndex {
    let n_samples = indices.len();
    let mut totals: ClassWeight = [0.0, 0.0];
    for &i in indices {
        totals[usize::from(labels[i])] += weights[i];
    }
    let leaf_value = {
        let total = totals[0] + totals[1];
        if total > 0.0 { totals[1] / total } else { 0.0 }
    };

    let depth_exceeded = growth.max_depth.is_some_and(|d| depth >= d);
    let too_few = n_samples < growth.min_samples_split;
    let pure = totals[0] == 0.0 || totals[1] == 0.0;
    if too_few || pure || depth_exceeded {
        return arena.leaf(leaf_value, n_samples);
    }

    let Some(split) = find_best_split(cols, labels, weights, indices, totals, growth, rng) else {
        return arena.leaf(leaf_value, n_samples);
    };

    let node = arena.reserve(n_samples);
    let left = build(cols, labels, weights, &split.left_indices, growth, depth + 1, rng, arena);
    let right = build(cols, labels, weights, &split.right_indices, growth, depth + 1, rng, arena);
    arena.set_split(node, split.feature, split.threshold, left, right);
    node
}

/// Best weighted-Gini split among `max_features` randomly drawn features.
///
/// Scans each feature's sorted values once with incremental class totals.
/// Returns `None` when no boundary respects `min_samples_leaf` or improves
/// on the parent.
fn find_best_split(
    cols: &[Vec<f64>],
    labels: &[u8],
    weights: &[f64],
    indices: &[usize],
    parent: ClassWeight,
    growth: &TreeGrowth,
    rng: &mut ChaCha8Rng,
) -> Option<SplitResult> {
    let n_features = cols.len();
    let n_samples = indices.len();
    let parent_total = parent[0] + parent[1];
    let parent_impurity = gini(parent);

    // Partial Fisher-Yates over feature order.
    let mut order: Vec<usize> = (0..n_features).collect();
    let take = growth.max_features.min(n_features);
    for i in 0..take {
        let j = rng.gen_range(i..n_features);
        order.swap(i, j);
    }

    let mut best_decrease = 0.0;
    let mut best: Option<(FeatureIndex, f64)> = None;
    let mut sorted: Vec<(f64, usize)> = Vec::with_capacity(n_samples);

    for &feat in &order[..take] {
        let col = &cols[feat];
        sorted.clear();
        sorted.extend(indices.iter().map(|&i| (col[i], i)));
        sorted.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

        let mut left: ClassWeight = [0.0, 0.0];
        for pos in 0..n_samples - 1 {
            let (value, i) = sorted[pos];
            left[usize::from(labels[i])] += weights[i];

            let next = sorted[pos + 1].0;
            if value == next {
                continue;
            }
            let n_left = pos + 1;
            if n_left < growth.min_samples_leaf || n_samples - n_left < growth.min_samples_leaf {
                continue;
            }
            let right = [parent[0] - left[0], parent[1] - left[1]];
            let (wl, wr) = (left[0] + left[1], right[0] + right[1]);
            let decrease = parent_total * parent_impurity - wl * gini(left) - wr * gini(right);
            if decrease > best_decrease {
                best_decrease = decrease;
                best = Some((FeatureIndex::new(feat), (value + next) / 2.0));
            }
        }
    }

    let (feature, threshold) = best?;
    let col = &cols[feature.index()];
    let (left_indices, right_indices) = indices.iter().partition(|&&i| col[i] <= threshold);
    Some(SplitResult {
        feature,
        threshold,
        left_indices,
        right_indices,
    })
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;

    fn growth(max_features: usize) -> TreeGrowth {
        TreeGrowth {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features,
        }
    }

    fn columns(rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        (0..rows[0].len())
            .map(|j| rows.iter().map(|r| r[j]).collect())
            .collect()
    }

    #[test]
    fn gini_values() {
        assert_eq!(gini([5.0, 0.0]), 0.0);
        assert!((gini([1.0, 1.0]) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn separable_data_one_split() {
        let rows = vec![
            vec![1.0, 0.0],
            vec![2.0, 0.0],
            vec![3.0, 0.0],
            vec![10.0, 0.0],
            vec![11.0, 0.0],
            vec![12.0, 0.0],
        ];
        let labels = [0, 0, 0, 1, 1, 1];
        let weights = [1.0; 6];
        let indices: Vec<usize> = (0..6).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let tree = grow_classifier(&columns(&rows), &labels, &weights, &indices, &growth(2), &mut rng);
        assert_eq!(tree.n_leaves(), 2);
        assert_eq!(tree.value(&[2.5, 0.0]), 0.0);
        assert_eq!(tree.value(&[9.0, 0.0]), 1.0);
    }

    #[test]
    fn pure_node_is_single_leaf() {
        let rows = vec![vec![1.0], vec![2.0]];
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let tree = grow_classifier(&columns(&rows), &[1, 1], &[1.0, 1.0], &[0, 1], &growth(1), &mut rng);
        assert_eq!(tree.n_nodes(), 1);
        assert_eq!(tree.value(&[5.0]), 1.0);
    }

    #[test]
    fn depth_limit_respected() {
        let rows: Vec<Vec<f64>> = (0..64).map(|i| vec![i as f64]).collect();
        let labels: Vec<u8> = (0..64).map(|i| u8::from(i % 2 == 0)).collect();
        let weights = vec![1.0; 64];
        let indices: Vec<usize> = (0..64).collect();
        let mut g = growth(1);
        g.max_depth = Some(3);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let tree = grow_classifier(&columns(&rows), &labels, &weights, &indices, &g, &mut rng);
        assert!(tree.depth() <= 3);
    }

    #[test]
    fn min_samples_leaf_respected() {
        let rows: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64]).collect();
        let labels: Vec<u8> = (0..20).map(|i| u8::from(i >= 18)).collect();
        let weights = vec![1.0; 20];
        let indices: Vec<usize> = (0..20).collect();
        let mut g = growth(1);
        g.min_samples_leaf = 5;
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let tree = grow_classifier(&columns(&rows), &labels, &weights, &indices, &g, &mut rng);
        assert!(tree.nodes.iter().filter(|n| n.is_leaf()).all(|n| n.n_samples() >= 5));
    }

    #[test]
    fn weights_shift_leaf_fraction() {
        // Constant feature: no split, leaf is the weighted positive share.
        let rows = vec![vec![0.0]; 4];
        let labels = [0, 0, 0, 1];
        let weights = [1.0, 1.0, 1.0, 3.0];
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let tree =
            grow_classifier(&columns(&rows), &labels, &weights, &[0, 1, 2, 3], &growth(1), &mut rng);
        assert!((tree.value(&[0.0]) - 0.5).abs() < 1e-12);
    }
}
