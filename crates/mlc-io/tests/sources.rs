//! Config files, synthetic data, and the CSV round trip through the artifact store.

use std::fs;

use mlc_io::{
    ArtifactStore, Config, CsvDatasetReader, DataSource, FeatureCsvReader, SyntheticParams,
    TEST_CSV_FILE, make_classification,
};
use mlc_eval::ColumnKind;
use tempfile::TempDir;

const CONFIG: &str = "\
random_state: 3
data:
  kind: synthetic
  n_samples: 300
  n_features: 6
  n_informative: 3
validation:
  cv:
    n_splits: 4
models:
  - type: logistic
calibration:
  method: sigmoid
cost:
  fn: 10
  fp: 1
reports:
  pr_k: 10
paths:
  artifacts_dir: artifacts
";

#[test]
fn config_file_loads() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("config.yaml");
    fs::write(&path, CONFIG).unwrap();
    let cfg = Config::from_path(&path).unwrap();
    assert_eq!(cfg.random_state, 3);
    assert_eq!(cfg.cv.n_splits(), 4);
    let DataSource::Synthetic(params) = cfg.data.source else {
        panic!("expected synthetic");
    };
    assert_eq!(params.n_samples, 300);
}

#[test]
fn missing_config_file() {
    let err = Config::from_path(std::path::Path::new("/nonexistent/config.yaml")).unwrap_err();
    assert!(matches!(err, mlc_io::ConfigError::Read { .. }));
}

#[test]
fn synthetic_holdout_written_and_reread() {
    let params = SyntheticParams {
        n_samples: 200,
        n_features: 5,
        n_informative: 3,
        n_redundant: 1,
        ..SyntheticParams::default()
    };
    let data = make_classification(&params, 11).unwrap();
    let tmp = TempDir::new().unwrap();
    let store = ArtifactStore::create(tmp.path()).unwrap();
    store.write_test_csv(&data, "target").unwrap();

    let back = CsvDatasetReader::new(&store.path(TEST_CSV_FILE), "target")
        .read()
        .unwrap();
    assert_eq!(back.labels, data.labels);
    assert_eq!(back.table.names(), data.table.names());
    assert_eq!(back.table.column("cat_bin").unwrap().kind(), ColumnKind::Categorical);
    // f64 Display is shortest round-trip, so numeric cells come back exactly.
    assert_eq!(back.table, data.table);

    let scored = FeatureCsvReader::new(
        &store.path(TEST_CSV_FILE),
        [("x00", ColumnKind::Numeric), ("cat_bin", ColumnKind::Categorical)],
    )
    .read()
    .unwrap();
    assert_eq!(scored.records.len(), 200);
    assert_eq!(scored.headers.last().map(String::as_str), Some("target"));
}
