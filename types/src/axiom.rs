//! The closed axiom catalog.
//!
//! Built once and injected into the node store. There is no mutation API:
//! extending the catalog means building a new one.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::AxiomId;

/// A starting assumption. Cannot be derived, only declared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Axiom {
    pub id: AxiomId,
    pub statement: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("axiom catalog must contain at least one axiom")]
    Empty,
    #[error("axiom id must not be empty")]
    EmptyId,
    #[error("duplicate axiom id {0}")]
    Duplicate(AxiomId),
}

/// Immutable, closed set of axioms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxiomCatalog {
    axioms: BTreeMap<AxiomId, Axiom>,
}

impl AxiomCatalog {
    pub fn new(axioms: impl IntoIterator<Item = Axiom>) -> Result<Self, CatalogError> {
        let mut map = BTreeMap::new();
        for axiom in axioms {
            if axiom.id.as_str().is_empty() {
                return Err(CatalogError::EmptyId);
            }
            if map.contains_key(&axiom.id) {
                return Err(CatalogError::Duplicate(axiom.id));
            }
            map.insert(axiom.id.clone(), axiom);
        }
        if map.is_empty() {
            return Err(CatalogError::Empty);
        }
        Ok(Self { axioms: map })
    }

    #[must_use]
    pub fn contains(&self, id: &AxiomId) -> bool {
        self.axioms.contains_key(id)
    }

    #[must_use]
    pub fn get(&self, id: &AxiomId) -> Option<&Axiom> {
        self.axioms.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &AxiomId> {
        self.axioms.keys()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.axioms.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.axioms.is_empty()
    }
}
