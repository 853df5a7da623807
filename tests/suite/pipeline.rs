//! End-to-end: build, scan, seal, evaluate, report, reopen.

use chrono::{Duration, Utc};
use tempfile::tempdir;

use provenance_monitor::{RegistryBuilder, SystemState, derived_value_present, within_sigma};
use provenance_report::{Report, generate, parse_rendered, write_report, write_report_json};
use provenance_scanner::{FindingLog, ScanConfig, Scanner};
use provenance_seal::{DataSeal, Prediction};

use crate::common::{disk_store, shallow_derivation};

#[test]
fn clean_derivation_produces_a_valid_report() {
    let dir = tempdir().unwrap();
    let store = disk_store(dir.path());
    let tree = shallow_derivation(&store, "toy_constant", 42.0);

    let findings = Scanner::new(ScanConfig::default()).unwrap().scan(&tree);
    assert!(findings.is_empty(), "unexpected findings: {findings:?}");
    let mut finding_log = FindingLog::open(dir.path().join("findings.jsonl")).unwrap();
    finding_log.record_tree(&tree, &findings).unwrap();

    let seal = DataSeal::open(dir.path().join("seals.jsonl")).unwrap();
    let now = Utc::now();
    seal.register_prediction(
        Prediction::new("toy_constant", 42.0, now - Duration::seconds(10)).derived_by(tree.output),
    )
    .unwrap();
    seal.seal("toy_dataset", b"42.0001 +- 0.001\n", now).unwrap();
    assert!(seal.compare("toy_constant", "toy_dataset", now).unwrap().is_none());
    let snapshot = seal.snapshot();

    let mut registry = RegistryBuilder::new();
    registry
        .register(derived_value_present("has_value", "toy_constant"))
        .unwrap();
    registry
        .register(within_sigma("toy_precision", "toy_constant", "toy_constant", 3.0))
        .unwrap();
    let monitor = registry.build_at(dir.path().join("falsification.jsonl")).unwrap();
    let state = SystemState::new()
        .with_derived("toy_constant", 42.0)
        .with_measurement("toy_constant", 42.0001, 0.001)
        .with_findings(findings.clone())
        .with_integrity(&snapshot);
    let summary = monitor.evaluate_all(&state).unwrap();
    assert!(summary.status.is_valid(), "{:?}", summary.status);

    let report = generate(&tree, &findings, &summary, &snapshot).unwrap();
    let md_path = dir.path().join("reports").join("toy_constant.md");
    let json_path = dir.path().join("reports").join("toy_constant.json");
    write_report(&md_path, &report).unwrap();
    write_report_json(&json_path, &report).unwrap();

    let parsed = parse_rendered(&std::fs::read_to_string(&md_path).unwrap()).unwrap();
    assert_eq!(parsed.node_count, 2);
    assert_eq!(parsed.finding_count, 0);
    assert_eq!(parsed.status, "VALID");

    let reloaded: Report =
        serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(reloaded, report);
    assert_eq!(reloaded.integrity.seals.len(), 1);
    assert!(reloaded.integrity.ordering_breaches.is_empty());
}

#[test]
fn logs_survive_reopen_and_verify() {
    let dir = tempdir().unwrap();
    let (output, tree) = {
        let store = disk_store(dir.path());
        let tree = shallow_derivation(&store, "inverse_fine_structure", 137.036);
        (tree.output, tree)
    };

    let reopened = disk_store(dir.path());
    assert_eq!(reopened.len(), tree.len());
    let restored = reopened.get_tree(output).unwrap();
    assert_eq!(restored.nodes, tree.nodes);
    assert_eq!(restored.output_name, "inverse_fine_structure");
    assert!(reopened.verify_log().unwrap() >= 3);

    let findings = Scanner::new(ScanConfig::default()).unwrap().scan(&restored);
    let mut log = FindingLog::open(dir.path().join("findings.jsonl")).unwrap();
    log.record_tree(&restored, &findings).unwrap();
    drop(log);

    let log = FindingLog::open(dir.path().join("findings.jsonl")).unwrap();
    let runs = log.runs().unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].output, Some(output));
    assert_eq!(runs[0].findings, findings);
    assert_eq!(log.verify().unwrap(), 1);
}
