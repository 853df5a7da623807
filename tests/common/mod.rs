//! Shared test utilities and fixtures

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use provenance_store::{NodeStore, StepInput};
use provenance_types::{Axiom, AxiomCatalog, AxiomId, DerivationTree};

pub const INVERSE_ALPHA: f64 = 137.036;

/// Catalog with axioms `A1`..`A3`.
pub fn catalog() -> Arc<AxiomCatalog> {
    let axioms = ["A1", "A2", "A3"].map(|id| Axiom {
        id: AxiomId::new(id),
        statement: format!("axiom {id}"),
    });
    Arc::new(AxiomCatalog::new(axioms).expect("catalog"))
}

pub fn memory_store() -> NodeStore {
    NodeStore::in_memory(catalog())
}

pub fn disk_store(dir: &Path) -> NodeStore {
    NodeStore::open(dir.join("nodes.jsonl"), catalog()).expect("open node store")
}

/// `A1 -> step(value)`: a one-step derivation of `output`.
pub fn shallow_derivation(store: &NodeStore, output: &str, value: f64) -> DerivationTree {
    let mut builder = store.begin(output);
    let a1 = builder.axiom(&AxiomId::new("A1")).expect("axiom node");
    builder
        .step(
            StepInput::new(format!("closed form for {output}"))
                .axioms(["A1"])
                .inputs([a1])
                .value(value),
        )
        .expect("step");
    builder.finish().expect("finish")
}

/// `A1, A2 -> volume -> ratio -> output`, three steps deep.
pub fn deep_derivation(store: &NodeStore, output: &str, value: f64) -> DerivationTree {
    let mut builder = store.begin(output);
    let a1 = builder.axiom(&AxiomId::new("A1")).expect("axiom node");
    let a2 = builder.axiom(&AxiomId::new("A2")).expect("axiom node");
    let volume = builder
        .step(
            StepInput::new("volume of the unit 3-sphere")
                .axioms(["A1", "A2"])
                .inputs([a1, a2]),
        )
        .expect("volume");
    let ratio = builder
        .step(
            StepInput::new("ratio of shell volumes")
                .axioms(["A2"])
                .inputs([volume]),
        )
        .expect("ratio");
    builder
        .step(
            StepInput::new("sum over shells")
                .axioms(["A1"])
                .inputs([ratio])
                .value(value)
                .error_bound(1e-3),
        )
        .expect("output");
    builder.finish().expect("finish")
}
