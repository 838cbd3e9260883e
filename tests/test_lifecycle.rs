//! Integration test: model lifecycle manager

use std::sync::{Arc, Barrier};
use std::thread;

use gbdt_serve::data::DataSource;
use gbdt_serve::error::{InputError, ModelError};
use gbdt_serve::inference::{LifecycleState, ModelConfig, ModelManager};
use gbdt_serve::store::ModelStore;

fn positive_row() -> Vec<f64> {
    vec![2.5, 2.0, -1.0, 0.0, 0.0, 0.0]
}

fn negative_row() -> Vec<f64> {
    vec![-2.5, -2.0, 1.0, 0.0, 0.0, 0.0]
}

fn sample_rows() -> Vec<Vec<f64>> {
    vec![
        positive_row(),
        negative_row(),
        vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6],
        vec![-0.4, 0.9, 0.0, -1.2, 0.3, 0.7],
    ]
}

fn manager_in(dir: &tempfile::TempDir) -> ModelManager {
    ModelManager::new(ModelConfig::new(dir.path().join("models/model.txt")))
}

#[test]
fn test_first_predict_trains_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager_in(&dir);
    let model_path = dir.path().join("models/model.txt");
    assert!(!model_path.exists());

    let scores = manager.predict(&[vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6]]).unwrap();

    assert_eq!(scores.len(), 1);
    assert!((0.0..=1.0).contains(&scores[0]));
    assert!(model_path.is_file());
    assert_eq!(manager.state(), LifecycleState::Ready);
}

#[test]
fn test_concurrent_first_predict_initializes_once() {
    let dir = tempfile::tempdir().unwrap();
    let manager = Arc::new(manager_in(&dir));
    let n_threads = 8;
    let barrier = Arc::new(Barrier::new(n_threads));

    let handles: Vec<_> = (0..n_threads)
        .map(|_| {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                manager.predict(&sample_rows())
            })
        })
        .collect();

    let results: Vec<Vec<f64>> = handles
        .into_iter()
        .map(|h| h.join().unwrap().unwrap())
        .collect();

    let stats = manager.stats();
    assert_eq!(stats.trainings, 1);
    assert_eq!(stats.saves, 1);
    assert_eq!(stats.loads, 0);
    assert!(results.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn test_row_width_validation() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager_in(&dir);

    let ok = manager.predict(&[vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6]]).unwrap();
    assert_eq!(ok.len(), 1);

    let err = manager.predict(&[vec![1.0, 2.0, 3.0]]).unwrap_err();
    assert!(matches!(
        err,
        ModelError::InvalidInput(InputError::RaggedRow {
            row: 0,
            expected: 6,
            actual: 3
        })
    ));
    let message = err.to_string();
    assert!(message.contains("expected 6"), "{message}");
    assert!(message.contains("3 features"), "{message}");

    let err = manager.predict(&[]).unwrap_err();
    assert!(matches!(err, ModelError::InvalidInput(InputError::Empty)));

    let err = manager
        .predict(&[positive_row(), vec![0.0, f64::INFINITY, 0.0, 0.0, 0.0, 0.0]])
        .unwrap_err();
    assert!(matches!(
        err,
        ModelError::InvalidInput(InputError::NonFinite { row: 1, column: 1 })
    ));
}

#[test]
fn test_order_preservation() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager_in(&dir);

    let forward = manager.predict(&[positive_row(), negative_row()]).unwrap();
    let reverse = manager.predict(&[negative_row(), positive_row()]).unwrap();

    assert!(forward[0] > forward[1], "{forward:?}");
    assert_eq!(forward[0], reverse[1]);
    assert_eq!(forward[1], reverse[0]);

    let batch = manager.predict(&sample_rows()).unwrap();
    for (row, expected) in sample_rows().into_iter().zip(&batch) {
        assert_eq!(manager.predict(&[row]).unwrap()[0], *expected);
    }
}

#[test]
fn test_retrain_is_atomic_for_readers() {
    let dir = tempfile::tempdir().unwrap();
    let manager = Arc::new(manager_in(&dir));
    let v1 = manager.predict(&sample_rows()).unwrap();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                (0..50)
                    .map(|_| manager.predict(&sample_rows()).unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let report = manager.retrain(DataSource::Synthetic { seed: 7 }).unwrap();
    assert_eq!(report.source, "synthetic(seed=7)");
    let v2 = manager.predict(&sample_rows()).unwrap();
    assert_ne!(v1, v2);

    for reader in readers {
        for observed in reader.join().unwrap() {
            assert!(observed == v1 || observed == v2, "mixed model output: {observed:?}");
        }
    }
    assert_eq!(manager.predict(&sample_rows()).unwrap(), v2);
}

#[test]
fn test_in_flight_predict_keeps_its_model_across_retrain() {
    let dir = tempfile::tempdir().unwrap();
    let manager = Arc::new(manager_in(&dir));
    let v1 = manager.predict(&sample_rows()).unwrap();

    let snapshot_taken = Arc::new(Barrier::new(2));
    let retrain_done = Arc::new(Barrier::new(2));
    let reader = {
        let manager = Arc::clone(&manager);
        let snapshot_taken = Arc::clone(&snapshot_taken);
        let retrain_done = Arc::clone(&retrain_done);
        thread::spawn(move || {
            let model = manager.snapshot().unwrap();
            snapshot_taken.wait();
            // Parked between snapshot and scoring while the model is replaced
            retrain_done.wait();
            let flat: Vec<f64> = sample_rows().concat();
            let x = ndarray::Array2::from_shape_vec((sample_rows().len(), 6), flat).unwrap();
            model.score(&x).unwrap()
        })
    };

    snapshot_taken.wait();
    manager.retrain(DataSource::Synthetic { seed: 7 }).unwrap();
    let v2 = manager.predict(&sample_rows()).unwrap();
    assert_ne!(v1, v2);
    retrain_done.wait();

    assert_eq!(reader.join().unwrap(), v1);
    assert_eq!(manager.predict(&sample_rows()).unwrap(), v2);
}

#[test]
fn test_failed_retrain_preserves_service() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager_in(&dir);
    let before = manager.predict(&sample_rows()).unwrap();
    let file_before = std::fs::read_to_string(dir.path().join("models/model.txt")).unwrap();

    let missing = manager
        .retrain(DataSource::File(dir.path().join("missing.csv")))
        .unwrap_err();
    assert!(matches!(missing, ModelError::DatasetInvalid(_)), "{missing}");

    let empty_csv = dir.path().join("empty.csv");
    std::fs::write(&empty_csv, "a,b,label\n").unwrap();
    let empty = manager.retrain(DataSource::File(empty_csv)).unwrap_err();
    assert!(matches!(empty, ModelError::DatasetInvalid(_)), "{empty}");

    let malformed_csv = dir.path().join("malformed.csv");
    std::fs::write(&malformed_csv, "1,2,0\n3,abc,1\n").unwrap();
    let malformed = manager.retrain(DataSource::File(malformed_csv)).unwrap_err();
    assert!(matches!(malformed, ModelError::DatasetInvalid(_)), "{malformed}");

    assert!(manager.health());
    assert_eq!(manager.predict(&sample_rows()).unwrap(), before);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("models/model.txt")).unwrap(),
        file_before
    );
    assert_eq!(manager.stats().failed_retrains, 3);
}

#[test]
fn test_retrain_from_file_changes_feature_count() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager_in(&dir);
    manager.ensure_model().unwrap();

    let csv = dir.path().join("train.csv");
    let mut text = String::from("f0,f1,f2,label\n");
    for i in 0..40 {
        let x = i as f64 / 10.0 - 2.0;
        let label = if x > 0.0 { 1 } else { 0 };
        text.push_str(&format!("{},{},{},{}\n", x, -x, x * 0.5, label));
    }
    std::fs::write(&csv, text).unwrap();

    let report = manager.retrain(DataSource::File(csv)).unwrap();
    assert_eq!(report.n_features, 3);
    assert_eq!(report.n_samples, 40);

    assert!(manager.predict(&[vec![1.0, -1.0, 0.5]]).is_ok());
    let err = manager.predict(&[vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6]]).unwrap_err();
    assert!(matches!(
        err,
        ModelError::InvalidInput(InputError::RaggedRow { expected: 3, actual: 6, .. })
    ));
}

#[test]
fn test_persistence_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let trained = manager_in(&dir);
    let original = trained.predict(&sample_rows()).unwrap();

    let reloaded = manager_in(&dir);
    let restored = reloaded.predict(&sample_rows()).unwrap();
    assert_eq!(reloaded.stats().loads, 1);
    assert_eq!(reloaded.stats().trainings, 0);
    for (a, b) in original.iter().zip(&restored) {
        assert!((a - b).abs() <= 1e-9, "{a} vs {b}");
    }

    let store = ModelStore::new(dir.path().join("models/model.txt"));
    let model = store.load().unwrap();
    assert_eq!(model.n_features(), 6);
}

#[test]
fn test_missing_configured_data_fails_without_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let manager = ModelManager::new(
        ModelConfig::new(dir.path().join("model.txt")).with_training_data(dir.path().join("absent.csv")),
    );

    let err = manager.predict(&[positive_row()]).unwrap_err();
    match err {
        ModelError::ModelUnavailable(cause) => {
            assert!(matches!(*cause, ModelError::DatasetInvalid(_)), "{cause}")
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!manager.health());
    assert!(!dir.path().join("model.txt").exists());
}

#[test]
fn test_corrupt_model_file_reports_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.txt");
    std::fs::write(&path, "{ not a model").unwrap();

    let manager = ModelManager::new(ModelConfig::new(&path));
    let err = manager.ensure_model().unwrap_err();
    match err {
        ModelError::ModelUnavailable(cause) => {
            assert!(matches!(*cause, ModelError::StoreIo { .. }), "{cause}")
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(manager.state(), LifecycleState::Failed);
}
