//! End-to-end behaviour of the ensemble engine on synthetic traffic.

mod common;

use adaptive_ids::{AnomalyDetector, ConfusionMatrix, DetectorConfig};
use common::{init_tracing, normal_matrix, shifted_matrix, training_set, WIDTH};
use ndarray::{concatenate, Array2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn seeded(seed: u64) -> DetectorConfig {
    DetectorConfig {
        n_estimators: 25,
        refit_probability: 0.0,
        ..Default::default()
    }
    .with_random_state(seed)
}

#[test]
fn shifted_traffic_is_detected_after_warm_up() {
    init_tracing();
    let mut detector = AnomalyDetector::new(seeded(42)).unwrap();
    detector.fit(training_set(1).view()).unwrap();
    assert!(detector.is_fitted());
    let k = detector.n_clusters().unwrap();
    assert!((1..=10).contains(&k));

    let mut rng = StdRng::seed_from_u64(7);
    detector.detect(normal_matrix(300, WIDTH, &mut rng).view()).unwrap();
    assert!(detector.history_len() > 10);

    let shifted = shifted_matrix(15, WIDTH, &mut rng);
    let normal = normal_matrix(15, WIDTH, &mut rng);
    let batch = concatenate(Axis(0), &[shifted.view(), normal.view()]).unwrap();
    let truth: Vec<bool> = (0..30).map(|i| i < 15).collect();

    let flags = detector.detect(batch.view()).unwrap();
    assert_eq!(flags.len(), 30);

    let cm = ConfusionMatrix::from_flags(&flags, &truth).unwrap();
    let report = cm.report();
    assert!(report.precision > 0.5, "precision {}", report.precision);
    assert!(report.recall > 0.5, "recall {}", report.recall);
}

#[test]
fn held_out_mix_on_a_cold_engine() {
    init_tracing();
    let mut detector = AnomalyDetector::new(seeded(42)).unwrap();
    detector.fit(training_set(1).view()).unwrap();

    let mut rng = StdRng::seed_from_u64(7);
    let shifted = shifted_matrix(15, WIDTH, &mut rng);
    let normal = normal_matrix(15, WIDTH, &mut rng);
    let batch = concatenate(Axis(0), &[shifted.view(), normal.view()]).unwrap();
    let truth: Vec<bool> = (0..30).map(|i| i < 15).collect();

    let report = detector.detect_detailed(batch.view()).unwrap();
    let positives = report.ensemble.iter().filter(|&&f| f).count();
    assert_eq!(detector.history_len(), positives);

    // the ensemble alone catches the shifted rows
    let ensemble = ConfusionMatrix::from_flags(&report.ensemble, &truth).unwrap();
    assert!(ensemble.recall() > 0.5, "ensemble recall {}", ensemble.recall());

    // a history made only of this batch cannot single out half of itself
    assert!(positives > 10);
    let filtered = ConfusionMatrix::from_flags(&report.flags, &truth).unwrap();
    assert!(filtered.recall() < 0.5, "filtered recall {}", filtered.recall());
    assert_eq!(report.demoted, positives - report.flags.iter().filter(|&&f| f).count());
}

#[test]
fn cold_history_leaves_ensemble_flags_untouched() {
    init_tracing();
    let mut detector = AnomalyDetector::new(seeded(3)).unwrap();
    detector.fit(training_set(2).view()).unwrap();

    let mut rng = StdRng::seed_from_u64(11);
    let batch = shifted_matrix(8, WIDTH, &mut rng);
    let report = detector.detect_detailed(batch.view()).unwrap();
    assert!(detector.history_len() <= 10);
    assert_eq!(report.flags, report.ensemble);
    assert_eq!(report.demoted, 0);
}

#[test]
fn ensemble_flags_do_not_depend_on_history() {
    let mut detector = AnomalyDetector::new(seeded(5)).unwrap();
    detector.fit(training_set(3).view()).unwrap();

    let mut rng = StdRng::seed_from_u64(13);
    let batch = concatenate(
        Axis(0),
        &[normal_matrix(40, WIDTH, &mut rng).view(), shifted_matrix(10, WIDTH, &mut rng).view()],
    )
    .unwrap();

    let first = detector.detect_detailed(batch.view()).unwrap();
    let second = detector.detect_detailed(batch.view()).unwrap();
    assert_eq!(first.ensemble, second.ensemble);
    assert_eq!(first.per_detector, second.per_detector);
}

#[test]
fn history_never_exceeds_configured_capacity() {
    let config = DetectorConfig { history_capacity: 50, ..seeded(9) };
    let mut detector = AnomalyDetector::new(config).unwrap();
    detector.fit(training_set(4).view()).unwrap();

    let mut rng = StdRng::seed_from_u64(17);
    for _ in 0..6 {
        detector.detect(shifted_matrix(30, WIDTH, &mut rng).view()).unwrap();
        assert!(detector.history_len() <= 50);
    }
    assert_eq!(detector.history_len(), 50);
    assert_eq!(detector.history().capacity(), 50);
}

#[test]
fn default_history_holds_one_thousand_vectors() {
    let config = DetectorConfig { n_estimators: 5, ..seeded(21) };
    let mut detector = AnomalyDetector::new(config).unwrap();
    detector.fit(training_set(5).view()).unwrap();

    let mut rng = StdRng::seed_from_u64(23);
    for _ in 0..40 {
        detector.detect(shifted_matrix(30, WIDTH, &mut rng).view()).unwrap();
    }
    assert_eq!(detector.history_len(), 1000);
}

#[test]
fn drifting_stream_with_feedback() {
    init_tracing();
    let config = DetectorConfig { n_estimators: 25, ..Default::default() }.with_random_state(99);
    let mut detector = AnomalyDetector::new(config).unwrap();
    detector.fit(training_set(6).view()).unwrap();

    let mut rng = StdRng::seed_from_u64(31);
    for round in 0..5 {
        let batch: Array2<f64> = if round % 2 == 0 {
            normal_matrix(60, WIDTH, &mut rng)
        } else {
            shifted_matrix(60, WIDTH, &mut rng)
        };
        let flags = detector.detect(batch.view()).unwrap();
        assert_eq!(flags.len(), 60);
        detector.partial_fit(batch.view(), &flags).unwrap();
    }

    assert!(detector.is_fitted());
    assert_eq!(detector.n_features(), Some(WIDTH));
    assert!(detector.model_generation() >= 1);
    assert!(detector.history_len() <= 1000);
}

#[test]
fn config_document_drives_the_engine() {
    let config = DetectorConfig::from_json_str(
        r#"{ "n_estimators": 10, "history_capacity": 20, "refit_probability": 0.0, "random_state": 4 }"#,
    )
    .unwrap();
    let mut detector = AnomalyDetector::new(config).unwrap();
    detector.fit(training_set(8).view()).unwrap();

    let mut rng = StdRng::seed_from_u64(41);
    detector.detect(shifted_matrix(30, WIDTH, &mut rng).view()).unwrap();
    assert!(detector.history_len() <= 20);
    assert_eq!(detector.config().min_history, 10);
}
