//! Independent derivation runs sharing one store.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;

use provenance_scanner::{ScanConfig, Scanner};
use provenance_types::AxiomId;

use crate::common::{memory_store, shallow_derivation};

#[test]
fn concurrent_builders_get_disjoint_ids_and_share_axiom_nodes() {
    let store = Arc::new(memory_store());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = Arc::clone(&store);
            thread::spawn(move || shallow_derivation(&store, &format!("constant_{i}"), f64::from(i) + 0.5))
        })
        .collect();
    let trees: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let outputs: BTreeSet<_> = trees.iter().map(|t| t.output).collect();
    assert_eq!(outputs.len(), trees.len());

    let axiom = store.axiom_node(&AxiomId::new("A1")).unwrap();
    for tree in &trees {
        assert!(tree.contains(axiom));
        assert!(tree.is_valid());
    }
    assert_eq!(store.len(), trees.len() + 1);

    let scanner = Scanner::new(ScanConfig::default()).unwrap();
    let results = scanner.scan_many(&trees);
    assert_eq!(results.len(), trees.len());
    for (tree, findings) in trees.iter().zip(&results) {
        assert_eq!(findings, &scanner.scan(tree));
    }
}
