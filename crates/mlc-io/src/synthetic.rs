//! Seeded synthetic classification data: Gaussian clusters on hypercube vertices.

use mlc_eval::{Column, Table};
use rand::seq::{SliceRandom, index};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use tracing::{info, instrument};

use crate::dataset::Dataset;
use crate::error::IoError;

/// Name of the categorical quartile column derived from `x00`.
pub const CATEGORY_COLUMN: &str = "cat_bin";

/// Shape of a synthetic binary classification problem.
///
/// # Defaults
///
/// | Parameter              | Default        |
/// |------------------------|----------------|
/// | `n_samples`            | 5000           |
/// | `n_features`           | 20             |
/// | `n_informative`        | 5              |
/// | `n_redundant`          | 2              |
/// | `n_repeated`           | 0              |
/// | `n_classes`            | 2              |
/// | `weights`              | `[0.95, 0.05]` |
/// | `n_clusters_per_class` | 2              |
/// | `class_sep`            | 1.0            |
/// | `flip_y`               | 0.01           |
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SyntheticParams {
    pub n_samples: usize,
    pub n_features: usize,
    pub n_informative: usize,
    pub n_redundant: usize,
    pub n_repeated: usize,
    pub n_classes: usize,
    pub weights: Vec<f64>,
    pub n_clusters_per_class: usize,
    pub class_sep: f64,
    pub flip_y: f64,
}

impl Default for SyntheticParams {
    fn default() -> Self {
        Self {
            n_samples: 5000,
            n_features: 20,
            n_informative: 5,
            n_redundant: 2,
            n_repeated: 0,
            n_classes: 2,
            weights: vec![0.95, 0.05],
            n_clusters_per_class: 2,
            class_sep: 1.0,
            flip_y: 0.01,
        }
    }
}

fn invalid(reason: impl Into<String>) -> IoError {
    IoError::InvalidSynthetic {
        reason: reason.into(),
    }
}

impl SyntheticParams {
    /// Check the parameters describe a generable binary problem.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::InvalidSynthetic`] describing the first violation.
    pub fn validate(&self) -> Result<(), IoError> {
        if self.n_classes != 2 {
            return Err(invalid(format!("n_classes must be 2, got {}", self.n_classes)));
        }
        if self.n_samples < 2 {
            return Err(invalid("n_samples must be >= 2"));
        }
        if self.n_informative == 0 || self.n_informative > 30 {
            return Err(invalid(format!(
                "n_informative must be in [1, 30], got {}",
                self.n_informative
            )));
        }
        let used = self.n_informative + self.n_redundant + self.n_repeated;
        if used > self.n_features {
            return Err(invalid(format!(
                "n_informative + n_redundant + n_repeated = {used} exceeds n_features = {}",
                self.n_features
            )));
        }
        if self.n_clusters_per_class == 0
            || self.n_classes * self.n_clusters_per_class > 1 << self.n_informative
        {
            return Err(invalid(
                "n_classes * n_clusters_per_class must be in [1, 2^n_informative]",
            ));
        }
        match self.weights.len() {
            1 | 2 => {}
            n => return Err(invalid(format!("weights must have 1 or 2 entries, got {n}"))),
        }
        if self.weights.iter().any(|w| !(w.is_finite() && *w >= 0.0))
            || self.weights.iter().sum::<f64>() > 1.0 + 1e-9
        {
            return Err(invalid("weights must be non-negative and sum to at most 1"));
        }
        if !(self.class_sep.is_finite() && self.class_sep > 0.0) {
            return Err(invalid("class_sep must be finite and > 0"));
        }
        if !(0.0..=1.0).contains(&self.flip_y) {
            return Err(invalid("flip_y must be in [0, 1]"));
        }
        Ok(())
    }

    /// Per-class weights, completing a single given weight to sum to 1.
    fn class_weights(&self) -> [f64; 2] {
        match self.weights.as_slice() {
            [w0] => [*w0, 1.0 - w0],
            [w0, w1, ..] => [*w0, *w1],
            [] => [0.5, 0.5],
        }
    }
}

/// Sample count for each cluster; cluster `k` belongs to class `k % 2`.
fn cluster_sizes(params: &SyntheticParams, n_clusters: usize) -> Vec<usize> {
    let weights = params.class_weights();
    let mut sizes: Vec<usize> = (0..n_clusters)
        .map(|k| {
            (params.n_samples as f64 * weights[k % 2] / params.n_clusters_per_class as f64) as usize
        })
        .collect();
    let assigned: usize = sizes.iter().sum();
    for i in 0..params.n_samples.saturating_sub(assigned) {
        sizes[i % n_clusters] += 1;
    }
    sizes
}

/// Distinct hypercube vertices in `{-sep, +sep}^dim`.
fn hypercube_centroids(n: usize, dim: usize, sep: f64, rng: &mut impl Rng) -> Vec<Vec<f64>> {
    index::sample(rng, 1usize << dim, n)
        .into_iter()
        .map(|vertex| {
            (0..dim)
                .map(|bit| if vertex >> bit & 1 == 1 { sep } else { -sep })
                .collect()
        })
        .collect()
}

fn uniform_matrix(rows: usize, cols: usize, rng: &mut impl Rng) -> Vec<Vec<f64>> {
    (0..rows)
        .map(|_| (0..cols).map(|_| 2.0 * rng.r#gen::<f64>() - 1.0).collect())
        .collect()
}

/// Quartile labels `a`..`d` of `values`, lowest quartile inclusive.
fn quartile_labels(values: &[f64]) -> Vec<Option<String>> {
    let mut sorted = values.to_vec();
    sorted.sort_unstable_by(f64::total_cmp);
    let n = sorted.len();
    let quantile = |q: f64| {
        let pos = q * (n - 1) as f64;
        let lo = pos.floor() as usize;
        let hi = (lo + 1).min(n - 1);
        sorted[lo] + (pos - lo as f64) * (sorted[hi] - sorted[lo])
    };
    let edges = [quantile(0.25), quantile(0.5), quantile(0.75)];
    values
        .iter()
        .map(|&v| {
            let bin = edges.partition_point(|&e| e < v);
            Some(["a", "b", "c", "d"][bin].to_owned())
        })
        .collect()
}

/// Generate a binary classification dataset.
///
/// Informative features are Gaussian clusters placed on hypercube vertices
/// and mixed by a random linear map; redundant features are random linear
/// combinations of the informative ones, repeated features copy earlier
/// columns, and the rest are noise. `flip_y` of the labels are redrawn at
/// random. Rows and columns are shuffled. Columns are named `x00`, `x01`, ...
/// plus a categorical [`CATEGORY_COLUMN`] holding the quartile of `x00`.
///
/// # Errors
///
/// Returns [`IoError::InvalidSynthetic`] for inconsistent parameters.
#[instrument(skip(params), fields(n_samples = params.n_samples, n_features = params.n_features))]
pub fn make_classification(params: &SyntheticParams, seed: u64) -> Result<Dataset, IoError> {
    params.validate()?;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let n_samples = params.n_samples;
    let n_features = params.n_features;
    let n_inf = params.n_informative;
    let n_clusters = params.n_classes * params.n_clusters_per_class;

    let sizes = cluster_sizes(params, n_clusters);
    let centroids = hypercube_centroids(n_clusters, n_inf, params.class_sep, &mut rng);

    let mut x = vec![vec![0.0; n_features]; n_samples];
    let mut y = vec![0u8; n_samples];
    for row in &mut x {
        for v in &mut row[..n_inf] {
            *v = rng.sample(StandardNormal);
        }
    }

    let mut start = 0;
    for (k, (centroid, &size)) in centroids.iter().zip(&sizes).enumerate() {
        let mixing = uniform_matrix(n_inf, n_inf, &mut rng);
        for i in start..start + size {
            y[i] = (k % 2) as u8;
            let raw: Vec<f64> = x[i][..n_inf].to_vec();
            for j in 0..n_inf {
                let mixed: f64 = (0..n_inf).map(|m| raw[m] * mixing[m][j]).sum();
                x[i][j] = mixed + centroid[j];
            }
        }
        start += size;
    }

    if params.n_redundant > 0 {
        let b = uniform_matrix(n_inf, params.n_redundant, &mut rng);
        for row in &mut x {
            for r in 0..params.n_redundant {
                row[n_inf + r] = (0..n_inf).map(|m| row[m] * b[m][r]).sum();
            }
        }
    }

    let n_base = n_inf + params.n_redundant;
    if params.n_repeated > 0 {
        let sources: Vec<usize> = (0..params.n_repeated)
            .map(|_| ((n_base - 1) as f64 * rng.r#gen::<f64>() + 0.5) as usize)
            .collect();
        for row in &mut x {
            for (r, &src) in sources.iter().enumerate() {
                row[n_base + r] = row[src];
            }
        }
    }

    let n_used = n_base + params.n_repeated;
    for row in &mut x {
        for v in &mut row[n_used..] {
            *v = rng.sample(StandardNormal);
        }
    }

    if params.flip_y > 0.0 {
        for label in &mut y {
            if rng.r#gen::<f64>() < params.flip_y {
                *label = u8::from(rng.gen_bool(0.5));
            }
        }
    }

    let mut row_order: Vec<usize> = (0..n_samples).collect();
    row_order.shuffle(&mut rng);
    let mut col_order: Vec<usize> = (0..n_features).collect();
    col_order.shuffle(&mut rng);

    let mut columns: Vec<Column> = col_order
        .iter()
        .enumerate()
        .map(|(j, &src)| {
            Column::numeric(
                format!("x{j:02}"),
                row_order.iter().map(|&i| Some(x[i][src])).collect(),
            )
        })
        .collect();
    let labels: Vec<u8> = row_order.iter().map(|&i| y[i]).collect();

    if n_features > 0 {
        let first: Vec<f64> = row_order.iter().map(|&i| x[i][col_order[0]]).collect();
        columns.push(Column::categorical(CATEGORY_COLUMN, quartile_labels(&first)));
    }

    let table = Table::new(columns)?;
    let n_pos = labels.iter().filter(|&&l| l == 1).count();
    info!(
        n_rows = table.n_rows(),
        n_columns = table.n_columns(),
        n_pos,
        "synthetic dataset created"
    );
    Ok(Dataset { table, labels })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> SyntheticParams {
        SyntheticParams {
            n_samples: 400,
            n_features: 8,
            n_informative: 3,
            n_redundant: 2,
            n_repeated: 1,
            weights: vec![0.8, 0.2],
            ..SyntheticParams::default()
        }
    }

    #[test]
    fn shape_and_names() {
        let data = make_classification(&small(), 7).unwrap();
        assert_eq!(data.table.n_rows(), 400);
        assert_eq!(data.table.n_columns(), 9);
        assert_eq!(data.table.names()[0], "x00");
        assert_eq!(data.table.names()[7], "x07");
        assert_eq!(data.table.names()[8], CATEGORY_COLUMN);
        assert_eq!(data.labels.len(), 400);
    }

    #[test]
    fn class_balance_follows_weights() {
        let data = make_classification(&small(), 7).unwrap();
        let n_pos = data.labels.iter().filter(|&&l| l == 1).count();
        // 80 positives before label noise; flip_y = 0.01 moves only a few.
        assert!((70..=90).contains(&n_pos), "n_pos = {n_pos}");
    }

    #[test]
    fn deterministic_per_seed() {
        let a = make_classification(&small(), 3).unwrap();
        let b = make_classification(&small(), 3).unwrap();
        let c = make_classification(&small(), 4).unwrap();
        assert_eq!(a.table, b.table);
        assert_eq!(a.labels, b.labels);
        assert_ne!(a.table, c.table);
    }

    #[test]
    fn cluster_sizes_sum_to_n() {
        let params = SyntheticParams {
            n_samples: 1001,
            ..SyntheticParams::default()
        };
        let sizes = cluster_sizes(&params, 4);
        assert_eq!(sizes.iter().sum::<usize>(), 1001);
    }

    #[test]
    fn quartiles_are_balanced() {
        let values: Vec<f64> = (0..100).map(f64::from).collect();
        let labels = quartile_labels(&values);
        for cat in ["a", "b", "c", "d"] {
            let n = labels.iter().filter(|l| l.as_deref() == Some(cat)).count();
            assert_eq!(n, 25, "category {cat}");
        }
    }

    #[test]
    fn rejects_inconsistent_params() {
        let too_many = SyntheticParams {
            n_features: 4,
            ..small()
        };
        assert!(matches!(too_many.validate(), Err(IoError::InvalidSynthetic { .. })));
        let multiclass = SyntheticParams {
            n_classes: 3,
            ..small()
        };
        assert!(multiclass.validate().is_err());
    }
}
