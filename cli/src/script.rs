//! JSON derivation scripts.
//!
//! ```json
//! {
//!   "output": "inverse_fine_structure",
//!   "steps": [
//!     { "label": "shells", "expression": "sum over shells",
//!       "axioms": ["A1"], "inputs": ["axiom:A1"], "value": 137.036 }
//!   ],
//!   "measurements": { "inverse_fine_structure": { "value": 137.035999084, "uncertainty": 2.1e-8 } },
//!   "criteria": [
//!     { "kind": "within_sigma", "name": "alpha_precision",
//!       "prediction": "inverse_fine_structure", "measurement": "inverse_fine_structure", "k": 3.0 }
//!   ]
//! }
//! ```
//!
//! Step inputs are earlier step labels or `axiom:<id>`. The last step is the
//! output.

use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use provenance_monitor::{
    Criterion, Measurement, RegistryBuilder, derived_value_present, relative_deviation,
    within_sigma,
};
use provenance_store::{NodeStore, StepInput};
use provenance_types::{AxiomId, DerivationTree, NodeId};

const AXIOM_PREFIX: &str = "axiom:";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct DerivationScript {
    pub output: String,
    pub steps: Vec<ScriptStep>,
    #[serde(default)]
    pub measurements: BTreeMap<String, Measurement>,
    #[serde(default)]
    pub criteria: Vec<CriterionSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ScriptStep {
    pub label: String,
    pub expression: String,
    #[serde(default)]
    pub axioms: Vec<String>,
    #[serde(default)]
    pub inputs: Vec<String>,
    pub value: Option<f64>,
    pub error_bound: Option<f64>,
    #[serde(default)]
    pub empirical_inputs: BTreeMap<String, f64>,
    pub documentation: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub(crate) enum CriterionSpec {
    WithinSigma {
        name: String,
        prediction: String,
        measurement: String,
        k: f64,
    },
    RelativeDeviation {
        name: String,
        prediction: String,
        measurement: String,
        max_relative: f64,
    },
    DerivedValuePresent {
        name: String,
        output: String,
    },
}

impl CriterionSpec {
    fn to_criterion(&self) -> Criterion {
        match self {
            Self::WithinSigma {
                name,
                prediction,
                measurement,
                k,
            } => within_sigma(name, prediction, measurement, *k),
            Self::RelativeDeviation {
                name,
                prediction,
                measurement,
                max_relative,
            } => relative_deviation(name, prediction, measurement, *max_relative),
            Self::DerivedValuePresent { name, output } => derived_value_present(name, output),
        }
    }
}

impl DerivationScript {
    pub(crate) fn parse(json: &str) -> Result<Self> {
        let script: Self = serde_json::from_str(json).context("malformed derivation script")?;
        if script.output.trim().is_empty() {
            bail!("derivation script has an empty output name");
        }
        Ok(script)
    }

    /// Feed every step through a builder and freeze the tree.
    pub(crate) fn build(&self, store: &NodeStore) -> Result<DerivationTree> {
        let mut builder = store.begin(self.output.as_str());
        let mut labels: HashMap<&str, NodeId> = HashMap::new();

        for step in &self.steps {
            if labels.contains_key(step.label.as_str()) {
                bail!("duplicate step label '{}'", step.label);
            }
            let mut inputs = Vec::with_capacity(step.inputs.len());
            for input in &step.inputs {
                let id = if let Some(axiom) = input.strip_prefix(AXIOM_PREFIX) {
                    builder
                        .axiom(&AxiomId::new(axiom))
                        .with_context(|| format!("step '{}'", step.label))?
                } else {
                    *labels.get(input.as_str()).with_context(|| {
                        format!(
                            "step '{}' consumes unknown step '{input}' (steps must be listed in order)",
                            step.label
                        )
                    })?
                };
                inputs.push(id);
            }

            let mut request = StepInput::new(step.expression.as_str())
                .axioms(step.axioms.iter().map(String::as_str))
                .inputs(inputs);
            if let Some(value) = step.value {
                request = request.value(value);
            }
            if let Some(bound) = step.error_bound {
                request = request.error_bound(bound);
            }
            for (name, value) in &step.empirical_inputs {
                request = request.empirical(name.as_str(), *value);
            }
            if let Some(doc) = &step.documentation {
                request = request.documentation(doc.as_str());
            }

            let id = builder
                .step(request)
                .with_context(|| format!("step '{}'", step.label))?;
            tracing::debug!(label = %step.label, node = %id, "Script step recorded");
            labels.insert(step.label.as_str(), id);
        }

        builder
            .finish()
            .with_context(|| format!("derivation '{}'", self.output))
    }

    /// Registry builder holding the script's criteria, in script order.
    pub(crate) fn registry(&self) -> Result<RegistryBuilder> {
        let mut builder = RegistryBuilder::new();
        for spec in &self.criteria {
            builder.register(spec.to_criterion())?;
        }
        Ok(builder)
    }
}
