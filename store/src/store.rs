use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use provenance_types::{
    AxiomCatalog, AxiomId, DeclaredException, DerivationNode, DerivationTree, NodeId, NodeKind,
    NonEmptyString, ReviewStatus, Timestamp, normalize_expression,
};
use provenance_utils::AppendLog;

use crate::builder::TreeBuilder;
use crate::error::{InvalidDependency, StoreError};

/// One line of the node log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NodeLogRecord {
    NodeCreated {
        node: DerivationNode,
    },
    OutputNamed {
        node_id: NodeId,
        name: String,
    },
    ReviewChanged {
        node_id: NodeId,
        from: ReviewStatus,
        to: ReviewStatus,
        actor: NonEmptyString,
        at: Timestamp,
    },
    ExceptionDeclared {
        exception: DeclaredException,
    },
}

/// Request to create a step node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewNode {
    pub expression: String,
    pub documentation: Option<String>,
    pub axiom_dependencies: BTreeSet<AxiomId>,
    pub input_node_ids: BTreeSet<NodeId>,
    pub numeric_value: Option<f64>,
    pub error_bound: Option<f64>,
    pub empirical_inputs: BTreeMap<String, f64>,
}

impl NewNode {
    #[must_use]
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            ..Self::default()
        }
    }

    pub fn axioms<I, A>(mut self, axioms: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<AxiomId>,
    {
        self.axiom_dependencies
            .extend(axioms.into_iter().map(Into::into));
        self
    }

    pub fn inputs(mut self, inputs: impl IntoIterator<Item = NodeId>) -> Self {
        self.input_node_ids.extend(inputs);
        self
    }

    pub fn value(mut self, value: f64) -> Self {
        self.numeric_value = Some(value);
        self
    }

    pub fn error_bound(mut self, bound: f64) -> Self {
        self.error_bound = Some(bound);
        self
    }

    pub fn empirical(mut self, name: impl Into<String>, value: f64) -> Self {
        self.empirical_inputs.insert(name.into(), value);
        self
    }

    pub fn documentation(mut self, doc: impl Into<String>) -> Self {
        self.documentation = Some(doc.into());
        self
    }
}

struct StoreInner {
    nodes: BTreeMap<NodeId, DerivationNode>,
    axiom_nodes: BTreeMap<AxiomId, NodeId>,
    output_names: BTreeMap<NodeId, String>,
    exceptions: Vec<DeclaredException>,
    next_id: NodeId,
    log: AppendLog<NodeLogRecord>,
}

/// Owner of every derivation node.
///
/// Mutations are appended to the node log before they become visible; a
/// failed log write leaves the in-memory graph untouched.
pub struct NodeStore {
    catalog: Arc<AxiomCatalog>,
    inner: Mutex<StoreInner>,
}

impl std::fmt::Debug for NodeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeStore")
            .field("axioms", &self.catalog.len())
            .field("nodes", &self.len())
            .finish_non_exhaustive()
    }
}

impl NodeStore {
    /// Create a store over an empty log.
    #[must_use]
    pub fn new(catalog: Arc<AxiomCatalog>, log: AppendLog<NodeLogRecord>) -> Self {
        Self {
            catalog,
            inner: Mutex::new(StoreInner {
                nodes: BTreeMap::new(),
                axiom_nodes: BTreeMap::new(),
                output_names: BTreeMap::new(),
                exceptions: Vec::new(),
                next_id: NodeId::new(1),
                log,
            }),
        }
    }

    /// In-memory store (for testing and one-shot runs).
    #[must_use]
    pub fn in_memory(catalog: Arc<AxiomCatalog>) -> Self {
        Self::new(catalog, AppendLog::in_memory())
    }

    /// Open a store backed by a node log file, replaying existing records.
    pub fn open(path: impl AsRef<Path>, catalog: Arc<AxiomCatalog>) -> Result<Self, StoreError> {
        let log = AppendLog::open(path)?;
        let entries = log.read_all()?;
        let store = Self::new(catalog, log);
        {
            let mut inner = store.lock();
            for entry in entries {
                store.replay(&mut inner, entry.seq, entry.record)?;
            }
            tracing::info!(
                nodes = inner.nodes.len(),
                exceptions = inner.exceptions.len(),
                "Node store replayed"
            );
        }
        Ok(store)
    }

    #[must_use]
    pub fn catalog(&self) -> &AxiomCatalog {
        &self.catalog
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start building a derivation tree for `output_name`.
    pub fn begin(&self, output_name: impl Into<String>) -> TreeBuilder<'_> {
        TreeBuilder::new(self, output_name.into())
    }

    /// Create a step node.
    pub fn create_node(&self, request: NewNode) -> Result<NodeId, StoreError> {
        let expression = normalize_expression(&request.expression);
        if request.axiom_dependencies.is_empty() {
            return Err(InvalidDependency::Empty.into());
        }
        self.check_catalog(&request.axiom_dependencies)?;
        check_finite(&expression, "numeric_value", request.numeric_value)?;
        check_finite(&expression, "error_bound", request.error_bound)?;
        for value in request.empirical_inputs.values() {
            check_finite(&expression, "empirical input", Some(*value))?;
        }

        let mut inner = self.lock();
        let id = inner.next_id;
        for input in &request.input_node_ids {
            if *input != id && !inner.nodes.contains_key(input) {
                return Err(StoreError::NotFound(*input));
            }
        }
        if let Some(via) = reaches(&inner.nodes, &request.input_node_ids, id) {
            return Err(StoreError::Cycle { node: id, via });
        }

        let node = DerivationNode {
            id,
            kind: NodeKind::Step,
            expression,
            documentation: request.documentation,
            axiom_dependencies: request.axiom_dependencies,
            input_node_ids: request.input_node_ids,
            numeric_value: request.numeric_value,
            error_bound: request.error_bound,
            empirical_inputs: request.empirical_inputs,
            created_at: Utc::now(),
            reviewed_status: ReviewStatus::Unreviewed,
        };
        if !node.is_pure() {
            tracing::warn!(
                node = %id,
                inputs = ?node.empirical_inputs.keys().collect::<Vec<_>>(),
                "Node declares empirical inputs"
            );
        }

        inner.log.append(&NodeLogRecord::NodeCreated { node: node.clone() })?;
        tracing::debug!(node = %id, expression = %node.expression, "Created derivation node");
        inner.nodes.insert(id, node);
        inner.next_id = id.next();
        Ok(id)
    }

    /// The single canonical node for `axiom`, created on first use.
    pub fn axiom_node(&self, axiom: &AxiomId) -> Result<NodeId, StoreError> {
        let statement = self
            .catalog
            .get(axiom)
            .map(|a| a.statement.clone())
            .ok_or_else(|| InvalidDependency::UnknownAxiom(axiom.clone()))?;

        let mut inner = self.lock();
        if let Some(id) = inner.axiom_nodes.get(axiom) {
            return Ok(*id);
        }

        let id = inner.next_id;
        let node = DerivationNode {
            id,
            kind: NodeKind::Axiom {
                axiom: axiom.clone(),
            },
            expression: format!("axiom {axiom}"),
            documentation: (!statement.trim().is_empty()).then_some(statement),
            axiom_dependencies: BTreeSet::from([axiom.clone()]),
            input_node_ids: BTreeSet::new(),
            numeric_value: None,
            error_bound: None,
            empirical_inputs: BTreeMap::new(),
            created_at: Utc::now(),
            reviewed_status: ReviewStatus::Unreviewed,
        };
        inner.log.append(&NodeLogRecord::NodeCreated { node: node.clone() })?;
        tracing::debug!(node = %id, %axiom, "Created axiom node");
        inner.nodes.insert(id, node);
        inner.axiom_nodes.insert(axiom.clone(), id);
        inner.next_id = id.next();
        Ok(id)
    }

    pub fn get(&self, id: NodeId) -> Result<DerivationNode, StoreError> {
        self.lock()
            .nodes
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    /// The full reachable subgraph ending at `output`.
    pub fn get_tree(&self, output: NodeId) -> Result<DerivationTree, StoreError> {
        let inner = self.lock();
        if !inner.nodes.contains_key(&output) {
            return Err(StoreError::NotFound(output));
        }

        let mut nodes = BTreeMap::new();
        let mut stack = vec![output];
        while let Some(current) = stack.pop() {
            if nodes.contains_key(&current) {
                continue;
            }
            let node = inner
                .nodes
                .get(&current)
                .ok_or(StoreError::NotFound(current))?;
            stack.extend(node.input_node_ids.iter().copied());
            nodes.insert(current, node.clone());
        }

        let exceptions = inner
            .exceptions
            .iter()
            .filter(|e| nodes.contains_key(&e.node_id))
            .cloned()
            .collect();
        let output_name = inner
            .output_names
            .get(&output)
            .cloned()
            .unwrap_or_else(|| output.to_string());

        Ok(DerivationTree {
            output_name,
            output,
            nodes,
            exceptions,
        })
    }

    /// Record the quantity name a finished tree derives.
    pub(crate) fn name_output(&self, node_id: NodeId, name: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if !inner.nodes.contains_key(&node_id) {
            return Err(StoreError::NotFound(node_id));
        }
        if inner.output_names.get(&node_id).is_some_and(|n| n == name) {
            return Ok(());
        }
        inner.log.append(&NodeLogRecord::OutputNamed {
            node_id,
            name: name.to_string(),
        })?;
        inner.output_names.insert(node_id, name.to_string());
        Ok(())
    }

    /// Move a node through its review lifecycle. Appends a review record.
    pub fn set_review_status(
        &self,
        node_id: NodeId,
        status: ReviewStatus,
        actor: NonEmptyString,
    ) -> Result<ReviewStatus, StoreError> {
        let mut inner = self.lock();
        let current = inner
            .nodes
            .get(&node_id)
            .map(|n| n.reviewed_status)
            .ok_or(StoreError::NotFound(node_id))?;
        let next = current.transition(status)?;

        inner.log.append(&NodeLogRecord::ReviewChanged {
            node_id,
            from: current,
            to: next,
            actor: actor.clone(),
            at: Utc::now(),
        })?;
        if let Some(node) = inner.nodes.get_mut(&node_id) {
            node.reviewed_status = next;
        }
        tracing::info!(node = %node_id, from = %current, to = %next, %actor, "Review status changed");
        Ok(next)
    }

    /// Explicitly permit `node_id` to use its empirical input `input_name`.
    pub fn declare_exception(
        &self,
        node_id: NodeId,
        input_name: &str,
        justification: NonEmptyString,
        actor: NonEmptyString,
    ) -> Result<DeclaredException, StoreError> {
        let mut inner = self.lock();
        let node = inner
            .nodes
            .get(&node_id)
            .ok_or(StoreError::NotFound(node_id))?;
        if !node.empirical_inputs.contains_key(input_name) {
            return Err(StoreError::UnknownEmpiricalInput {
                node: node_id,
                input: input_name.to_string(),
            });
        }
        if let Some(existing) = inner
            .exceptions
            .iter()
            .find(|e| e.node_id == node_id && e.input_name == input_name)
        {
            return Ok(existing.clone());
        }

        let exception = DeclaredException {
            node_id,
            input_name: input_name.to_string(),
            justification,
            actor,
            declared_at: Utc::now(),
        };
        inner.log.append(&NodeLogRecord::ExceptionDeclared {
            exception: exception.clone(),
        })?;
        tracing::warn!(
            node = %node_id,
            input = input_name,
            actor = %exception.actor,
            "Declared empirical input exception"
        );
        inner.exceptions.push(exception.clone());
        Ok(exception)
    }

    /// Every logged record, in append order.
    pub fn log_records(&self) -> Result<Vec<NodeLogRecord>, StoreError> {
        Ok(self.lock().log.records()?)
    }

    /// Verify the node log's hash chain.
    pub fn verify_log(&self) -> Result<u64, StoreError> {
        Ok(self.lock().log.verify()?)
    }

    fn check_catalog(&self, axioms: &BTreeSet<AxiomId>) -> Result<(), InvalidDependency> {
        match axioms.iter().find(|a| !self.catalog.contains(a)) {
            Some(unknown) => Err(InvalidDependency::UnknownAxiom(unknown.clone())),
            None => Ok(()),
        }
    }

    fn replay(
        &self,
        inner: &mut StoreInner,
        seq: u64,
        record: NodeLogRecord,
    ) -> Result<(), StoreError> {
        let fail = |reason: String| StoreError::Replay { seq, reason };
        match record {
            NodeLogRecord::NodeCreated { node } => {
                if node.id < inner.next_id {
                    return Err(fail(format!("node {} allocated out of order", node.id)));
                }
                self.check_catalog(&node.axiom_dependencies)
                    .map_err(|e| fail(e.to_string()))?;
                if let Some(missing) = node
                    .input_node_ids
                    .iter()
                    .find(|input| !inner.nodes.contains_key(input))
                {
                    return Err(fail(format!("node {} consumes unknown {missing}", node.id)));
                }
                if let Some(axiom) = node.axiom() {
                    inner.axiom_nodes.insert(axiom.clone(), node.id);
                }
                inner.next_id = node.id.next();
                inner.nodes.insert(node.id, node);
            }
            NodeLogRecord::OutputNamed { node_id, name } => {
                inner.output_names.insert(node_id, name);
            }
            NodeLogRecord::ReviewChanged { node_id, from, to, .. } => {
                let node = inner
                    .nodes
                    .get_mut(&node_id)
                    .ok_or_else(|| fail(format!("review of unknown {node_id}")))?;
                if node.reviewed_status != from {
                    return Err(fail(format!(
                        "review of {node_id} starts from {from} but the node is {}",
                        node.reviewed_status
                    )));
                }
                node.reviewed_status = from
                    .transition(to)
                    .map_err(|e| fail(format!("{node_id}: {e}")))?;
            }
            NodeLogRecord::ExceptionDeclared { exception } => {
                if !inner.nodes.contains_key(&exception.node_id) {
                    return Err(fail(format!(
                        "exception for unknown {}",
                        exception.node_id
                    )));
                }
                inner.exceptions.push(exception);
            }
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        // A poisoned lock only means another run panicked mid-call; every
        // mutation is log-first, so the graph is still consistent.
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn check_finite(expression: &str, field: &'static str, value: Option<f64>) -> Result<(), StoreError> {
    match value {
        Some(v) if !v.is_finite() => Err(StoreError::NonFiniteValue {
            expression: expression.to_string(),
            field,
        }),
        _ => Ok(()),
    }
}

/// Walk existing edges from `inputs`; return the input through which `target`
/// is reachable, if any.
fn reaches(
    nodes: &BTreeMap<NodeId, DerivationNode>,
    inputs: &BTreeSet<NodeId>,
    target: NodeId,
) -> Option<NodeId> {
    for &start in inputs {
        let mut seen = BTreeSet::new();
        let mut stack = vec![start];
        while let Some(current) = stack.pop() {
            if current == target {
                return Some(start);
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(node) = nodes.get(&current) {
                stack.extend(node.input_node_ids.iter().copied());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use provenance_types::{Axiom, AxiomCatalog, AxiomId, NodeId, NonEmptyString, ReviewStatus};
    use provenance_utils::AppendLog;

    use super::{NewNode, NodeLogRecord, NodeStore};
    use crate::error::{InvalidDependency, StoreError};

    fn catalog() -> Arc<AxiomCatalog> {
        Arc::new(
            AxiomCatalog::new(["A1", "A2", "A3"].map(|id| Axiom {
                id: AxiomId::new(id),
                statement: format!("{id} holds"),
            }))
            .unwrap(),
        )
    }

    fn actor() -> NonEmptyString {
        NonEmptyString::new("reviewer").unwrap()
    }

    #[test]
    fn create_node_rejects_unknown_axiom() {
        let store = NodeStore::in_memory(catalog());
        let err = store
            .create_node(NewNode::new("x").axioms(["A1", "A9"]))
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidDependency(InvalidDependency::UnknownAxiom(ref a)) if a.as_str() == "A9"
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn create_node_rejects_empty_dependencies() {
        let store = NodeStore::in_memory(catalog());
        let err = store.create_node(NewNode::new("x")).unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidDependency(InvalidDependency::Empty)
        ));
    }

    #[test]
    fn create_node_rejects_unknown_input() {
        let store = NodeStore::in_memory(catalog());
        let err = store
            .create_node(NewNode::new("x").axioms(["A1"]).inputs([NodeId::new(40)]))
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(id) if id == NodeId::new(40)));
    }

    #[test]
    fn create_node_rejects_self_reference_as_cycle() {
        let store = NodeStore::in_memory(catalog());
        let a1 = store.axiom_node(&AxiomId::new("A1")).unwrap();
        // The next id to be allocated is a1 + 1.
        let err = store
            .create_node(NewNode::new("loop").axioms(["A1"]).inputs([a1, a1.next()]))
            .unwrap_err();
        assert!(matches!(err, StoreError::Cycle { node, .. } if node == a1.next()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn create_node_rejects_non_finite_values() {
        let store = NodeStore::in_memory(catalog());
        let err = store
            .create_node(NewNode::new("x").axioms(["A1"]).value(f64::NAN))
            .unwrap_err();
        assert!(matches!(err, StoreError::NonFiniteValue { field: "numeric_value", .. }));
    }

    #[test]
    fn axiom_nodes_are_canonical() {
        let store = NodeStore::in_memory(catalog());
        let first = store.axiom_node(&AxiomId::new("A2")).unwrap();
        let second = store.axiom_node(&AxiomId::new("A2")).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.len(), 1);
        assert!(store.axiom_node(&AxiomId::new("nope")).is_err());
    }

    #[test]
    fn every_creation_is_logged() {
        let store = NodeStore::in_memory(catalog());
        let a1 = store.axiom_node(&AxiomId::new("A1")).unwrap();
        store
            .create_node(NewNode::new("phi").axioms(["A1"]).inputs([a1]).value(1.618))
            .unwrap();
        let records = store.log_records().unwrap();
        assert_eq!(records.len(), 2);
        assert!(
            records
                .iter()
                .all(|r| matches!(r, NodeLogRecord::NodeCreated { .. }))
        );
        assert_eq!(store.verify_log().unwrap(), 2);
    }

    #[test]
    fn get_tree_returns_reachable_subgraph_only() {
        let store = NodeStore::in_memory(catalog());
        let a1 = store.axiom_node(&AxiomId::new("A1")).unwrap();
        let a2 = store.axiom_node(&AxiomId::new("A2")).unwrap();
        let left = store
            .create_node(NewNode::new("left").axioms(["A1"]).inputs([a1]))
            .unwrap();
        let _unrelated = store
            .create_node(NewNode::new("other").axioms(["A2"]).inputs([a2]))
            .unwrap();

        let tree = store.get_tree(left).unwrap();
        assert_eq!(tree.len(), 2);
        assert!(tree.contains(a1));
        assert!(!tree.contains(a2));
        assert!(tree.is_valid());

        assert!(matches!(
            store.get_tree(NodeId::new(99)),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn review_lifecycle_is_enforced_and_logged() {
        let store = NodeStore::in_memory(catalog());
        let a1 = store.axiom_node(&AxiomId::new("A1")).unwrap();
        let step = store
            .create_node(NewNode::new("s").axioms(["A1"]).inputs([a1]))
            .unwrap();

        store
            .set_review_status(step, ReviewStatus::Rejected, actor())
            .unwrap();
        let err = store
            .set_review_status(step, ReviewStatus::Accepted, actor())
            .unwrap_err();
        assert!(matches!(err, StoreError::Review(_)));
        assert_eq!(store.get(step).unwrap().reviewed_status, ReviewStatus::Rejected);
        assert_eq!(store.log_records().unwrap().len(), 3);
    }

    #[test]
    fn exceptions_require_matching_empirical_input() {
        let store = NodeStore::in_memory(catalog());
        let a1 = store.axiom_node(&AxiomId::new("A1")).unwrap();
        let step = store
            .create_node(
                NewNode::new("scale by measured mass")
                    .axioms(["A1"])
                    .inputs([a1])
                    .empirical("m_e", 0.510_998_95),
            )
            .unwrap();

        let err = store
            .declare_exception(step, "m_mu", NonEmptyString::new("why").unwrap(), actor())
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownEmpiricalInput { .. }));

        store
            .declare_exception(
                step,
                "m_e",
                NonEmptyString::new("unit normalisation only").unwrap(),
                actor(),
            )
            .unwrap();
        let tree = store.get_tree(step).unwrap();
        assert!(tree.has_exception(step, "m_e"));
    }

    #[test]
    fn reopen_replays_nodes_reviews_and_exceptions() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nodes.jsonl");

        let step = {
            let store = NodeStore::open(&path, catalog()).unwrap();
            let a1 = store.axiom_node(&AxiomId::new("A1")).unwrap();
            let step = store
                .create_node(
                    NewNode::new("s")
                        .axioms(["A1"])
                        .inputs([a1])
                        .empirical("g", 9.81),
                )
                .unwrap();
            store
                .set_review_status(step, ReviewStatus::Flagged, actor())
                .unwrap();
            store
                .declare_exception(step, "g", NonEmptyString::new("demo").unwrap(), actor())
                .unwrap();
            step
        };

        let store = NodeStore::open(&path, catalog()).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(step).unwrap().reviewed_status, ReviewStatus::Flagged);
        assert!(store.get_tree(step).unwrap().has_exception(step, "g"));
        // Canonical axiom node survives the reopen.
        assert_eq!(
            store.axiom_node(&AxiomId::new("A1")).unwrap(),
            NodeId::new(1)
        );
        let next = store
            .create_node(NewNode::new("t").axioms(["A1"]).inputs([step]))
            .unwrap();
        assert_eq!(next, NodeId::new(3));
    }

    #[test]
    fn replay_rejects_logged_review_out_of_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nodes.jsonl");

        let step = {
            let store = NodeStore::open(&path, catalog()).unwrap();
            let a1 = store.axiom_node(&AxiomId::new("A1")).unwrap();
            let step = store
                .create_node(NewNode::new("s").axioms(["A1"]).inputs([a1]))
                .unwrap();
            store
                .set_review_status(step, ReviewStatus::Rejected, actor())
                .unwrap();
            step
        };

        // Chain-valid record the store itself would never write.
        let mut log = AppendLog::<NodeLogRecord>::open(&path).unwrap();
        log.append(&NodeLogRecord::ReviewChanged {
            node_id: step,
            from: ReviewStatus::Rejected,
            to: ReviewStatus::Accepted,
            actor: actor(),
            at: Utc::now(),
        })
        .unwrap();
        drop(log);

        let err = NodeStore::open(&path, catalog()).unwrap_err();
        assert!(
            matches!(err, StoreError::Replay { seq: 3, ref reason } if reason.contains("rejected to accepted")),
            "{err}"
        );
    }

    #[test]
    fn replay_rejects_review_from_stale_status() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nodes.jsonl");
        let step = {
            let store = NodeStore::open(&path, catalog()).unwrap();
            let a1 = store.axiom_node(&AxiomId::new("A1")).unwrap();
            store
                .create_node(NewNode::new("s").axioms(["A1"]).inputs([a1]))
                .unwrap()
        };

        let mut log = AppendLog::<NodeLogRecord>::open(&path).unwrap();
        log.append(&NodeLogRecord::ReviewChanged {
            node_id: step,
            from: ReviewStatus::Flagged,
            to: ReviewStatus::Accepted,
            actor: actor(),
            at: Utc::now(),
        })
        .unwrap();
        drop(log);

        assert!(matches!(
            NodeStore::open(&path, catalog()),
            Err(StoreError::Replay { .. })
        ));
    }
}
