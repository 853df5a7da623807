//! Tamper detection, temporal ordering and terminal falsification.

use std::fs;

use chrono::{Duration, Utc};
use tempfile::tempdir;

use provenance_monitor::{
    Criterion, Evaluation, FalsificationMonitor, RegistryBuilder, SystemState, SystemStatus,
};
use provenance_seal::{DataSeal, IntegrityEvent, Prediction, SealError, digest_offloaded};
use provenance_types::NonEmptyString;
use provenance_utils::{AppendLog, LogError, sha256_hex};

fn text(value: &str) -> NonEmptyString {
    NonEmptyString::new(value).unwrap()
}

fn empty_monitor() -> FalsificationMonitor {
    RegistryBuilder::new()
        .build(AppendLog::in_memory())
        .unwrap()
}

#[test]
fn tampered_dataset_falsifies_until_resolved() {
    let seal = DataSeal::in_memory();
    seal.seal("dataset_v1", b"137.035999084", Utc::now()).unwrap();

    let intact = seal.verify("dataset_v1", b"137.035999084").unwrap();
    assert!(intact.matched && intact.tamper_event.is_none());

    let tampered = seal.verify("dataset_v1", b"137.036").unwrap();
    assert!(!tampered.matched);
    let event = tampered.tamper_event.expect("tamper event");
    assert_eq!(event.expected_digest, sha256_hex(b"137.035999084"));
    assert_eq!(seal.open_events().len(), 1);

    let monitor = empty_monitor();
    let state = SystemState::new().with_integrity(&seal.snapshot());
    let status = monitor.evaluate_all(&state).unwrap().status;
    assert!(matches!(status, SystemStatus::Falsified { .. }));

    seal.resolve(event.id, text("re-downloaded from the archive"), text("auditor"))
        .unwrap();
    assert!(matches!(
        seal.resolve(event.id, text("again"), text("auditor")),
        Err(SealError::AlreadyResolved(_))
    ));
    let state = SystemState::new().with_integrity(&seal.snapshot());
    assert!(monitor.evaluate_all(&state).unwrap().status.is_valid());
}

#[test]
fn edited_seal_log_is_detected_on_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("seals.jsonl");
    {
        let seal = DataSeal::open(&path).unwrap();
        seal.seal("dataset_v1", b"original", Utc::now()).unwrap();
        seal.seal("dataset_v2", b"second", Utc::now()).unwrap();
        assert_eq!(seal.verify_log().unwrap(), 2);
    }

    let original = fs::read_to_string(&path).unwrap();
    let forged = original.replacen(&sha256_hex(b"original"), &sha256_hex(b"forged"), 1);
    assert_ne!(original, forged);
    fs::write(&path, forged).unwrap();

    let err = DataSeal::open(&path).unwrap_err();
    assert!(
        matches!(err, SealError::Log(LogError::ChainBroken { seq: 0, .. })),
        "{err:?}"
    );
}

#[test]
fn late_prediction_is_a_temporal_violation_until_resolved() {
    let seal = DataSeal::in_memory();
    let sealed_at = Utc::now() - Duration::minutes(5);
    seal.seal("alpha_2024", b"137.035999177(21)", sealed_at).unwrap();
    seal.register_prediction(Prediction::new("alpha_inv", 137.036, sealed_at + Duration::minutes(1)))
        .unwrap();

    let violation = seal
        .compare("alpha_inv", "alpha_2024", Utc::now())
        .unwrap()
        .expect("ordering violation");
    assert_eq!(violation.breach.prediction, "alpha_inv");
    assert!(matches!(
        seal.open_events().as_slice(),
        [IntegrityEvent::TemporalOrdering(_)]
    ));

    let monitor = empty_monitor();
    let status = monitor
        .evaluate_all(&SystemState::new().with_integrity(&seal.snapshot()))
        .unwrap()
        .status;
    assert!(status.reasons().iter().any(|r| r.contains("integrity event")));

    seal.resolve(violation.id, text("prediction was made blind; registration was late"), text("auditor"))
        .unwrap();
    let status = monitor
        .evaluate_all(&SystemState::new().with_integrity(&seal.snapshot()))
        .unwrap()
        .status;
    assert!(status.is_valid());
}

#[test]
fn failed_criterion_stays_failed_across_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("falsification.jsonl");
    let criterion = |passes: bool| {
        Criterion::new("alpha_precision", "alpha within 3 sigma", move |_: &SystemState| {
            if passes { Evaluation::pass() } else { Evaluation::fail().with_margin(-1.5) }
        })
    };

    {
        let mut registry = RegistryBuilder::new();
        registry.register(criterion(false)).unwrap();
        let monitor = registry.build_at(&path).unwrap();
        let summary = monitor.evaluate_all(&SystemState::new()).unwrap();
        assert_eq!(summary.failed().count(), 1);
    }

    let mut registry = RegistryBuilder::new();
    registry.register(criterion(true)).unwrap();
    let monitor = registry.build_at(&path).unwrap();
    let summary = monitor.evaluate_all(&SystemState::new()).unwrap();
    assert!(!summary.status.is_valid(), "a passing predicate must not revive a failed criterion");

    monitor
        .reset("alpha_precision", text("corrected the reference value"), text("auditor"))
        .unwrap();
    let summary = monitor.evaluate_all(&SystemState::new()).unwrap();
    assert!(summary.status.is_valid());
}

#[tokio::test]
async fn offloaded_digest_matches_inline_digest() {
    let bytes = b"alpha^-1 = 137.035999084(21)".repeat(1024);
    let digest = digest_offloaded(bytes.clone()).await.unwrap();
    assert_eq!(digest, sha256_hex(&bytes));

    let seal = DataSeal::in_memory();
    seal.seal_digest("codata_2018", &digest, bytes.len() as u64, Utc::now())
        .unwrap();
    assert!(seal.verify("codata_2018", &bytes).unwrap().matched);
}
