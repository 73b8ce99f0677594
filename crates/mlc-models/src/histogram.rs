//! Per-feature bin edges for histogram boosting.
//!
//! Features are binned once before boosting; every split search then works on
//! per-bin gradient sums instead of sorted raw values.

use rand::SeedableRng;
use rand::seq::index;
use rand_chacha::ChaCha8Rng;

/// Above this many rows, bin edges are computed from a seeded subsample.
const BINNING_SUBSAMPLE: usize = 200_000;

/// Bin edges for all features.
///
/// Values `<= edges[0]` go into bin 0, values in `(edges[i-1], edges[i]]`
/// into bin `i`. A constant feature has no edges and a single bin.
#[derive(Debug, Clone)]
pub(crate) struct FeatureBins {
    edges: Vec<Vec<f64>>,
}

impl FeatureBins {
    /// Build bin edges from column-major features with at most `max_bins` bins.
    ///
    /// A feature with at most `max_bins` distinct values gets one bin per
    /// value (edges at midpoints). Otherwise edges sit at interpolated
    /// quantiles, deduplicated and kept strictly inside `(min, max)`.
    pub(crate) fn build(cols: &[Vec<f64>], max_bins: usize, seed: u64) -> Self {
        let n_samples = cols.first().map_or(0, Vec::len);
        let subsample = (n_samples > BINNING_SUBSAMPLE).then(|| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let mut rows = index::sample(&mut rng, n_samples, BINNING_SUBSAMPLE).into_vec();
            rows.sort_unstable();
            rows
        });

        let edges = cols
            .iter()
            .map(|col| {
                let mut sorted: Vec<f64> = match &subsample {
                    Some(rows) => rows.iter().map(|&i| col[i]).collect(),
                    None => col.clone(),
                };
                sorted.sort_unstable_by(|a, b| a.total_cmp(b));
                feature_edges(&sorted, max_bins)
            })
            .collect();

        Self { edges }
    }

    /// Return the bin index for a value of a feature.
    pub(crate) fn bin_index(&self, feat_idx: usize, value: f64) -> usize {
        self.edges[feat_idx].partition_point(|&e| e < value)
    }

    /// Return the number of bins for a feature (1 for a constant feature).
    pub(crate) fn n_bins(&self, feat_idx: usize) -> usize {
        self.edges[feat_idx].len() + 1
    }

    /// Raw-value threshold equivalent to "bin <= `bin_idx` goes left".
    pub(crate) fn threshold(&self, feat_idx: usize, bin_idx: usize) -> f64 {
        self.edges[feat_idx][bin_idx]
    }

    /// Bin every value, keeping the column-major layout.
    pub(crate) fn bin_columns(&self, cols: &[Vec<f64>]) -> Vec<Vec<u8>> {
        cols.iter()
            .enumerate()
            .map(|(feat_idx, col)| {
                col.iter()
                    .map(|&v| u8::try_from(self.bin_index(feat_idx, v)).unwrap_or(u8::MAX))
                    .collect()
            })
            .collect()
    }
}

fn feature_edges(sorted: &[f64], max_bins: usize) -> Vec<f64> {
    let n = sorted.len();
    if n == 0 || sorted[0] == sorted[n - 1] {
        return Vec::new();
    }

    let mut distinct = sorted.to_vec();
    distinct.dedup();
    if distinct.len() <= max_bins {
        return distinct.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect();
    }

    let mut edges: Vec<f64> = (1..max_bins)
        .map(|k| {
            let pos = (k as f64 / max_bins as f64) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = (lo + 1).min(n - 1);
            let frac = pos - lo as f64;
            sorted[lo] + frac * (sorted[hi] - sorted[lo])
        })
        .collect();
    edges.dedup();
    edges.retain(|&e| e > sorted[0] && e < sorted[n - 1]);
    edges
}
