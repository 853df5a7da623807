//! Scoped recorder for one derivation run.

use provenance_types::{AxiomId, DerivationTree, NodeId};

use crate::error::BuildError;
use crate::store::{NewNode, NodeStore};

/// A derivation step as fed by a routine: expression, axioms, inputs and
/// optional value.
pub type StepInput = NewNode;

/// Records the steps of one derivation against a shared [`NodeStore`].
///
/// Nodes are created in the store as soon as [`step`](Self::step) returns, so
/// ids stay unique across concurrent builders. [`finish`](Self::finish)
/// freezes the run into a [`DerivationTree`] whose output is the last step.
#[derive(Debug)]
pub struct TreeBuilder<'a> {
    store: &'a NodeStore,
    output_name: String,
    steps: Vec<NodeId>,
}

impl<'a> TreeBuilder<'a> {
    pub(crate) fn new(store: &'a NodeStore, output_name: String) -> Self {
        tracing::debug!(output = %output_name, "Derivation run started");
        Self {
            store,
            output_name,
            steps: Vec::new(),
        }
    }

    #[must_use]
    pub fn output_name(&self) -> &str {
        &self.output_name
    }

    /// Steps recorded so far, in creation order.
    #[must_use]
    pub fn steps(&self) -> &[NodeId] {
        &self.steps
    }

    /// The canonical node for `axiom`.
    pub fn axiom(&mut self, axiom: &AxiomId) -> Result<NodeId, BuildError> {
        Ok(self.store.axiom_node(axiom)?)
    }

    pub fn step(&mut self, input: StepInput) -> Result<NodeId, BuildError> {
        let id = self.store.create_node(input)?;
        self.steps.push(id);
        Ok(id)
    }

    pub fn finish(self) -> Result<DerivationTree, BuildError> {
        let Some(&output) = self.steps.last() else {
            return Err(BuildError::EmptyTree {
                output_name: self.output_name,
            });
        };

        let mut tree = self.store.get_tree(output)?;
        let leaves: Vec<NodeId> = tree
            .leaves()
            .filter(|node| !node.is_axiom())
            .map(|node| node.id)
            .collect();
        if !leaves.is_empty() {
            tracing::warn!(
                output = %self.output_name,
                leaves = leaves.len(),
                "Derivation has steps without inputs"
            );
            return Err(BuildError::IncompleteTree {
                output_name: self.output_name,
                leaves,
            });
        }

        for step in self.steps.iter().filter(|id| !tree.contains(**id)) {
            tracing::debug!(
                output = %self.output_name,
                node = %step,
                "Recorded step is not part of the final tree"
            );
        }

        self.store.name_output(output, &self.output_name)?;
        tracing::info!(
            output = %self.output_name,
            node = %output,
            nodes = tree.len(),
            "Derivation tree frozen"
        );
        tree.output_name = self.output_name;
        Ok(tree)
    }
}
