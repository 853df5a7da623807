//! The acceptance scenarios, run against the public crate APIs.

use chrono::Utc;

use provenance_monitor::{Criterion, Evaluation, RegistryBuilder, RegistryError, SystemState};
use provenance_scanner::{ScanConfig, Scanner, is_hard_failure};
use provenance_seal::{DataSeal, SealError};
use provenance_store::StepInput;
use provenance_types::{AxiomId, Layer, NonEmptyString, ReviewStatus, Severity};

use crate::common::{
    INVERSE_ALPHA, deep_derivation, disk_store, memory_store, shallow_derivation,
};

fn scanner() -> Scanner {
    let config = ScanConfig::default();
    assert_eq!(config.tolerance, 1e-4);
    assert_eq!(config.shallow_depth, 1);
    Scanner::new(config).unwrap()
}

#[test]
fn shallow_inverse_alpha_is_flagged_numerically() {
    let store = memory_store();
    let tree = shallow_derivation(&store, "inverse_fine_structure", INVERSE_ALPHA);
    assert_eq!(tree.depth(tree.output), Some(1));

    let findings = scanner().scan(&tree);
    let numerical: Vec<_> = findings
        .iter()
        .filter(|f| f.layer == Layer::Numerical && f.node_id() == Some(tree.output))
        .collect();
    assert_eq!(numerical.len(), 1, "{findings:?}");
    assert!(numerical[0].severity >= Severity::Warning);
    assert!(numerical[0].evidence.contains("inverse_fine_structure"));
    assert!(numerical[0].evidence.contains("outside reference uncertainty"));
}

#[test]
fn scanning_is_deterministic() {
    let store = memory_store();
    let tree = deep_derivation(&store, "inverse_fine_structure", INVERSE_ALPHA);
    let scanner = scanner();
    let first = scanner.scan(&tree);
    let second = scanner.scan(&tree);
    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[test]
fn acceptance_suppresses_only_shallow_matches() {
    let store = memory_store();
    let actor = NonEmptyString::new("reviewer").unwrap();

    let shallow = shallow_derivation(&store, "inverse_fine_structure", INVERSE_ALPHA);
    store
        .set_review_status(shallow.output, ReviewStatus::Accepted, actor.clone())
        .unwrap();
    let shallow = store.get_tree(shallow.output).unwrap();
    assert!(
        !scanner()
            .scan(&shallow)
            .iter()
            .any(|f| f.layer == Layer::Numerical)
    );

    let deep = deep_derivation(&store, "inverse_fine_structure_deep", INVERSE_ALPHA);
    store
        .set_review_status(deep.output, ReviewStatus::Accepted, actor)
        .unwrap();
    let deep = store.get_tree(deep.output).unwrap();
    assert_eq!(deep.depth(deep.output), Some(3));
    assert!(
        scanner()
            .scan(&deep)
            .iter()
            .any(|f| f.layer == Layer::Numerical)
    );
}

#[test]
fn sealing_the_same_dataset_twice_is_rejected() {
    let seal = DataSeal::in_memory();
    seal.seal("dataset_v1", b"alpha^-1 = 137.035999084(21)", Utc::now())
        .unwrap();
    let err = seal
        .seal("dataset_v1", b"different bytes", Utc::now())
        .unwrap_err();
    assert!(matches!(err, SealError::AlreadySealed(name) if name == "dataset_v1"));
    assert_eq!(seal.snapshot().seals.len(), 1);
}

#[test]
fn registering_a_criterion_twice_is_rejected() {
    let criterion = || {
        Criterion::new("alpha_precision", "alpha within 3 sigma", |_: &SystemState| {
            Evaluation::pass()
        })
    };
    let mut registry = RegistryBuilder::new();
    registry.register(criterion()).unwrap();
    let err = registry.register(criterion()).unwrap_err();
    assert!(matches!(err, RegistryError::DuplicateCriterion(name) if name == "alpha_precision"));
    assert_eq!(registry.len(), 1);
}

#[test]
fn declared_exception_downgrades_the_stored_tree_on_rescan() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = {
        let store = disk_store(dir.path());
        let mut builder = store.begin("mass_ratio");
        let a1 = builder.axiom(&AxiomId::new("A1")).unwrap();
        builder
            .step(
                StepInput::new("rescale by calibration offset")
                    .axioms(["A1"])
                    .inputs([a1])
                    .empirical("calibration_offset", 1.5),
            )
            .unwrap();
        let tree = builder.finish().unwrap();
        let findings = scanner().scan(&tree);
        assert!(is_hard_failure(&findings));
        tree.output
    };

    // A later run declares the exception against the stored node.
    {
        let store = disk_store(dir.path());
        store
            .declare_exception(
                output,
                "calibration_offset",
                NonEmptyString::new("unit conversion only").unwrap(),
                NonEmptyString::new("auditor").unwrap(),
            )
            .unwrap();
    }

    let store = disk_store(dir.path());
    let tree = store.get_tree(output).unwrap();
    assert_eq!(tree.output_name, "mass_ratio");
    let findings = scanner().scan(&tree);
    assert!(!is_hard_failure(&findings), "{findings:?}");
    let structural: Vec<_> = findings
        .iter()
        .filter(|f| f.layer == Layer::Structural)
        .collect();
    assert_eq!(structural.len(), 1);
    assert_eq!(structural[0].severity, Severity::Info);
}
