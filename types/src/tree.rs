//! Derivation trees: the DAG connecting axioms to one output quantity.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{AxiomId, DeclaredException, DerivationNode, NodeId};

/// Structural invariant breach in a [`DerivationTree`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeViolation {
    #[error("output node {0} is not part of the tree")]
    MissingOutput(NodeId),
    #[error("node {node} consumes {input}, which is not part of the tree")]
    DanglingInput { node: NodeId, input: NodeId },
    #[error("node {node} participates in a cycle")]
    Cycle { node: NodeId },
    #[error("node {node} is a leaf but not an axiom")]
    UnsupportedLeaf { node: NodeId },
    #[error("axiom node {node} has inputs")]
    AxiomWithInputs { node: NodeId },
    #[error("node {node} is not reachable from the output")]
    Unreachable { node: NodeId },
}

/// Frozen subgraph of the node store ending at exactly one output node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivationTree {
    pub output_name: String,
    pub output: NodeId,
    pub nodes: BTreeMap<NodeId, DerivationNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exceptions: Vec<DeclaredException>,
}

impl DerivationTree {
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&DerivationNode> {
        self.nodes.get(&id)
    }

    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    #[must_use]
    pub fn output_node(&self) -> Option<&DerivationNode> {
        self.nodes.get(&self.output)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in id order.
    pub fn iter(&self) -> impl Iterator<Item = &DerivationNode> {
        self.nodes.values()
    }

    /// Nodes without inputs.
    pub fn leaves(&self) -> impl Iterator<Item = &DerivationNode> {
        self.nodes.values().filter(|n| n.input_node_ids.is_empty())
    }

    #[must_use]
    pub fn has_exception(&self, node: NodeId, input_name: &str) -> bool {
        self.exceptions
            .iter()
            .any(|e| e.node_id == node && e.input_name == input_name)
    }

    /// Longest path from an axiom leaf: axioms are 0, a step consuming only
    /// axioms is 1. Nodes on a cycle or fed by dangling inputs get no depth.
    #[must_use]
    pub fn depths(&self) -> BTreeMap<NodeId, usize> {
        let mut depths: BTreeMap<NodeId, usize> = BTreeMap::new();
        // Ids are allocated monotonically and inputs must exist before their
        // consumers, so a fixed-point sweep in id order converges in one pass
        // for well-formed trees. Extra passes cover hand-built trees.
        for _ in 0..=self.nodes.len() {
            let mut changed = false;
            for node in self.nodes.values() {
                if depths.contains_key(&node.id) {
                    continue;
                }
                if node.is_axiom() {
                    depths.insert(node.id, 0);
                    changed = true;
                    continue;
                }
                let input_depths: Option<Vec<usize>> = node
                    .input_node_ids
                    .iter()
                    .map(|input| depths.get(input).copied())
                    .collect();
                if let Some(input_depths) = input_depths {
                    let depth = input_depths.into_iter().max().map_or(1, |d| d + 1);
                    depths.insert(node.id, depth);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        depths
    }

    #[must_use]
    pub fn depth(&self, id: NodeId) -> Option<usize> {
        self.depths().get(&id).copied()
    }

    /// Axioms structurally reachable by walking `id`'s inputs, including `id`
    /// itself when it is an axiom node.
    #[must_use]
    pub fn reachable_axioms(&self, id: NodeId) -> BTreeSet<AxiomId> {
        let mut axioms = BTreeSet::new();
        for node_id in self.ancestors(id) {
            if let Some(axiom) = self.nodes.get(&node_id).and_then(DerivationNode::axiom) {
                axioms.insert(axiom.clone());
            }
        }
        axioms
    }

    /// `id` plus every node reachable through inputs. Unknown ids are skipped.
    #[must_use]
    pub fn ancestors(&self, id: NodeId) -> BTreeSet<NodeId> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get(&current) else {
                continue;
            };
            if !seen.insert(current) {
                continue;
            }
            stack.extend(node.input_node_ids.iter().copied());
        }
        seen
    }

    /// Check every tree invariant and return all breaches in a stable order.
    #[must_use]
    pub fn validate(&self) -> Vec<TreeViolation> {
        let mut violations = Vec::new();
        if !self.nodes.contains_key(&self.output) {
            violations.push(TreeViolation::MissingOutput(self.output));
        }

        for node in self.nodes.values() {
            for input in &node.input_node_ids {
                if !self.nodes.contains_key(input) {
                    violations.push(TreeViolation::DanglingInput {
                        node: node.id,
                        input: *input,
                    });
                }
            }
            if node.is_axiom() && !node.input_node_ids.is_empty() {
                violations.push(TreeViolation::AxiomWithInputs { node: node.id });
            }
            if node.is_unsupported_leaf() {
                violations.push(TreeViolation::UnsupportedLeaf { node: node.id });
            }
        }

        for node in self.cycle_members() {
            violations.push(TreeViolation::Cycle { node });
        }

        let reachable = self.ancestors(self.output);
        for id in self.nodes.keys() {
            if !reachable.contains(id) {
                violations.push(TreeViolation::Unreachable { node: *id });
            }
        }
        violations
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }

    /// Nodes that lie on a directed cycle (iterative three-colour DFS).
    fn cycle_members(&self) -> BTreeSet<NodeId> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Colour {
            Grey,
            Black,
        }

        let mut colour: BTreeMap<NodeId, Colour> = BTreeMap::new();
        let mut members = BTreeSet::new();

        for &start in self.nodes.keys() {
            if colour.contains_key(&start) {
                continue;
            }
            let mut path: Vec<NodeId> = Vec::new();
            let mut stack: Vec<(NodeId, Vec<NodeId>)> = Vec::new();
            colour.insert(start, Colour::Grey);
            path.push(start);
            stack.push((start, self.inputs_of(start)));

            while let Some((current, pending)) = stack.last_mut() {
                let current = *current;
                if let Some(next) = pending.pop() {
                    match colour.get(&next).copied() {
                        None => {
                            colour.insert(next, Colour::Grey);
                            path.push(next);
                            let inputs = self.inputs_of(next);
                            stack.push((next, inputs));
                        }
                        Some(Colour::Grey) => {
                            if let Some(pos) = path.iter().position(|id| *id == next) {
                                members.extend(path[pos..].iter().copied());
                            }
                        }
                        Some(Colour::Black) => {}
                    }
                } else {
                    colour.insert(current, Colour::Black);
                    path.pop();
                    stack.pop();
                }
            }
        }
        members
    }

    fn inputs_of(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes
            .get(&id)
            .map(|n| {
                n.input_node_ids
                    .iter()
                    .copied()
                    .filter(|input| self.nodes.contains_key(input))
                    .collect()
            })
            .unwrap_or_default()
    }
}
