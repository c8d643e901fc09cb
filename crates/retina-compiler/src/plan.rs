use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use retina_block_registry::{BlockManifest, DimensionalityTransform, InitParameters};

/// Where a step property takes its value from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputBinding {
  Literal {
    value: Value,
  },
  Input {
    name: String,
    dimensionality: usize,
  },
  /// A step output; `property: None` selects every output of the step.
  StepOutput {
    step: String,
    property: Option<String>,
    dimensionality: usize,
  },
  Map {
    entries: IndexMap<String, InputBinding>,
  },
}

impl InputBinding {
  /// Dimensionality of the referenced data, if the binding references any.
  pub fn source_dimensionality(&self) -> Option<usize> {
    match self {
      InputBinding::Input { dimensionality, .. }
      | InputBinding::StepOutput { dimensionality, .. } => Some(*dimensionality),
      InputBinding::Literal { .. } | InputBinding::Map { .. } => None,
    }
  }
}

/// Dimensionality and lineage of a step's inputs and outputs.
///
/// A lineage has one entry per nesting level naming the step (or the workflow
/// input marker) that introduced that level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepDimensionality {
  pub input: usize,
  pub output: usize,
  pub lineage: Vec<String>,
  pub output_lineage: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledInput {
  pub name: String,
  pub dimensionality: usize,
  pub lineage: Vec<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub default_value: Option<Value>,
}

impl CompiledInput {
  /// Batch inputs must be supplied at runtime; parameters fall back to their default.
  pub fn is_required(&self) -> bool {
    self.dimensionality > 0
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledStep {
  pub name: String,
  pub block_type: String,
  pub manifest: BlockManifest,
  pub bindings: IndexMap<String, InputBinding>,
  /// Steps this step may select, when it is a flow-control step.
  pub flow_targets: Vec<String>,
  /// Flow-control steps that decide whether this step runs.
  pub governed_by: Vec<String>,
  /// Upstream steps over data and control edges, in plan order.
  pub depends_on: Vec<String>,
  pub dimensionality: StepDimensionality,
}

impl CompiledStep {
  pub fn accepts_batch_input(&self) -> bool {
    self.manifest.accepts_batch_input
  }

  pub fn accepts_empty_values(&self) -> bool {
    self.manifest.accepts_empty_values
  }

  pub fn is_flow_control(&self) -> bool {
    self.manifest.flow_control
  }

  pub fn transform(&self) -> DimensionalityTransform {
    self.manifest.dimensionality
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledOutput {
  pub name: String,
  pub selector: String,
  pub source: InputBinding,
  pub lineage: Vec<String>,
}

/// An immutable, executable form of a workflow definition.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionPlan {
  pub version: String,
  pub inputs: Vec<CompiledInput>,
  /// Steps in topological order.
  pub steps: Vec<CompiledStep>,
  pub outputs: Vec<CompiledOutput>,
  #[serde(skip)]
  pub init_parameters: Arc<InitParameters>,
}

impl ExecutionPlan {
  pub fn step(&self, name: &str) -> Option<&CompiledStep> {
    self.steps.iter().find(|step| step.name == name)
  }

  pub fn input(&self, name: &str) -> Option<&CompiledInput> {
    self.inputs.iter().find(|input| input.name == name)
  }

  pub fn step_names(&self) -> Vec<&str> {
    self.steps.iter().map(|step| step.name.as_str()).collect()
  }
}
