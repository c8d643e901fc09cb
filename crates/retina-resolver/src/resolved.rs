use indexmap::IndexMap;
use serde_json::Value;

use retina_block_registry::{BlockManifest, Kind};
use retina_workflow::{ExecutionGraph, PropertyValue, Selector};

#[derive(Debug, Clone)]
pub struct ResolvedInput {
  pub name: String,
  pub dimensionality: usize,
  pub kinds: Vec<Kind>,
  pub default_value: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct ResolvedStep {
  pub name: String,
  pub block_type: String,
  pub manifest: BlockManifest,
  /// Properties in manifest order. Absent optional properties without a default are omitted.
  pub properties: IndexMap<String, PropertyValue>,
}

impl ResolvedStep {
  /// Names of the steps this step may select, across all target properties.
  pub fn flow_targets(&self) -> Vec<String> {
    let mut targets: Vec<String> = Vec::new();
    for value in self.properties.values() {
      if let PropertyValue::Targets(selectors) = value {
        for selector in selectors {
          if let Some(step) = selector.step_name()
            && !targets.iter().any(|t| t == step)
          {
            targets.push(step.to_string());
          }
        }
      }
    }
    targets
  }
}

#[derive(Debug, Clone)]
pub struct ResolvedOutput {
  pub name: String,
  pub selector: Selector,
}

/// A definition whose references have all been checked.
#[derive(Debug, Clone)]
pub struct ResolvedWorkflow {
  pub version: String,
  pub inputs: Vec<ResolvedInput>,
  pub steps: Vec<ResolvedStep>,
  pub outputs: Vec<ResolvedOutput>,
  pub graph: ExecutionGraph,
}

impl ResolvedWorkflow {
  pub fn input(&self, name: &str) -> Option<&ResolvedInput> {
    self.inputs.iter().find(|input| input.name == name)
  }

  pub fn step(&self, name: &str) -> Option<&ResolvedStep> {
    self.steps.iter().find(|step| step.name == name)
  }
}
