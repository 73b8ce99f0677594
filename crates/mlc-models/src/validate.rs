//! Input checks shared by every estimator.

use crate::error::ModelError;

/// Validate a row-major training set and return its feature count.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`ModelError::EmptyDataset`] | `features` is empty |
/// | [`ModelError::ZeroFeatures`] | rows have zero columns |
/// | [`ModelError::FeatureCountMismatch`] | rows have inconsistent lengths |
/// | [`ModelError::NonFiniteValue`] | any value is NaN or infinite |
/// | [`ModelError::LabelCountMismatch`] | `labels.len() != features.len()` |
/// | [`ModelError::InvalidLabel`] | a label is not 0/1 |
/// | [`ModelError::SingleClass`] | only one class is present |
pub(crate) fn check_training_set(features: &[Vec<f64>], labels: &[u8]) -> Result<usize, ModelError> {
    let n_features = check_rows(features)?;
    if labels.len() != features.len() {
        return Err(ModelError::LabelCountMismatch {
            n_samples: features.len(),
            n_labels: labels.len(),
        });
    }
    let mut seen = [false; 2];
    for (sample_index, &label) in labels.iter().enumerate() {
        if label > 1 {
            return Err(ModelError::InvalidLabel {
                sample_index,
                label,
            });
        }
        seen[usize::from(label)] = true;
    }
    match seen {
        [true, false] => Err(ModelError::SingleClass { class: 0 }),
        [false, true] => Err(ModelError::SingleClass { class: 1 }),
        _ => Ok(n_features),
    }
}

/// Validate prediction rows against the trained feature count.
///
/// # Errors
///
/// Returns [`ModelError::PredictionFeatureMismatch`] or
/// [`ModelError::NonFiniteValue`] for malformed rows.
pub(crate) fn check_prediction_rows(features: &[Vec<f64>], expected: usize) -> Result<(), ModelError> {
    for (sample_index, row) in features.iter().enumerate() {
        if row.len() != expected {
            return Err(ModelError::PredictionFeatureMismatch {
                expected,
                got: row.len(),
            });
        }
        if let Some(feature_index) = row.iter().position(|v| !v.is_finite()) {
            return Err(ModelError::NonFiniteValue {
                sample_index,
                feature_index,
            });
        }
    }
    Ok(())
}

fn check_rows(features: &[Vec<f64>]) -> Result<usize, ModelError> {
    let Some(first) = features.first() else {
        return Err(ModelError::EmptyDataset);
    };
    let n_features = first.len();
    if n_features == 0 {
        return Err(ModelError::ZeroFeatures);
    }
    for (sample_index, row) in features.iter().enumerate() {
        if row.len() != n_features {
            return Err(ModelError::FeatureCountMismatch {
                expected: n_features,
                got: row.len(),
                sample_index,
            });
        }
        for (feature_index, &val) in row.iter().enumerate() {
            if !val.is_finite() {
                return Err(ModelError::NonFiniteValue {
                    sample_index,
                    feature_index,
                });
            }
        }
    }
    Ok(n_features)
}

/// Transpose validated row-major features to `cols[feature_idx][sample_idx]`.
pub(crate) fn column_major(features: &[Vec<f64>], n_features: usize) -> Vec<Vec<f64>> {
    (0..n_features)
        .map(|j| features.iter().map(|row| row[j]).collect())
        .collect()
}

/// Per-sample weights that give both classes equal total weight: `n / (2 · n_class)`.
pub(crate) fn balanced_weights(labels: &[u8]) -> Vec<f64> {
    let n = labels.len() as f64;
    let n_pos = labels.iter().filter(|&&y| y == 1).count() as f64;
    let n_neg = n - n_pos;
    let w = [n / (2.0 * n_neg.max(1.0)), n / (2.0 * n_pos.max(1.0))];
    labels.iter().map(|&y| w[usize::from(y)]).collect()
}
