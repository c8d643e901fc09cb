//! Storage for runtime inputs and step results, addressed by batch index.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use retina_block_registry::OutputMap;
use retina_compiler::InputBinding;

use crate::batch::{Index, prefix};

/// Runtime input values, flattened to one entry per element.
#[derive(Debug, Default)]
pub(crate) struct InputStore {
  values: HashMap<String, BTreeMap<Index, Value>>,
}

impl InputStore {
  pub fn insert(&mut self, name: &str, index: Index, value: Value) {
    self
      .values
      .entry(name.to_string())
      .or_default()
      .insert(index, value);
  }

  pub fn get(&self, name: &str, index: &[usize]) -> Option<&Value> {
    self.values.get(name)?.get(index)
  }
}

/// Outputs of completed steps.
///
/// A step that ran (or was skipped) always has an entry, possibly empty;
/// indices it did not produce are simply absent.
#[derive(Debug, Default)]
pub(crate) struct ResultStore {
  steps: HashMap<String, BTreeMap<Index, OutputMap>>,
}

impl ResultStore {
  pub fn ensure(&mut self, step: &str) {
    self.steps.entry(step.to_string()).or_default();
  }

  pub fn insert(&mut self, step: &str, index: Index, outputs: OutputMap) {
    self
      .steps
      .entry(step.to_string())
      .or_default()
      .insert(index, outputs);
  }

  pub fn get(&self, step: &str, index: &[usize]) -> Option<&OutputMap> {
    self.steps.get(step)?.get(index)
  }

  /// One output (or all outputs as an object) of a step at an index.
  pub fn value(&self, step: &str, property: Option<&str>, index: &[usize]) -> Option<Value> {
    let outputs = self.get(step, index)?;
    match property {
      Some(property) => Some(outputs.get(property).cloned().unwrap_or(Value::Null)),
      None => Some(Value::Object(
        outputs
          .iter()
          .map(|(k, v)| (k.clone(), v.clone()))
          .collect(),
      )),
    }
  }
}

/// Value a data binding points at for the given element, if present.
pub(crate) fn lookup(
  binding: &InputBinding,
  inputs: &InputStore,
  results: &ResultStore,
  index: &[usize],
) -> Option<Value> {
  match binding {
    InputBinding::Input {
      name,
      dimensionality,
    } => inputs.get(name, prefix(index, *dimensionality)).cloned(),
    InputBinding::StepOutput {
      step,
      property,
      dimensionality,
    } => results.value(step, property.as_deref(), prefix(index, *dimensionality)),
    InputBinding::Literal { value } => Some(value.clone()),
    InputBinding::Map { .. } => None,
  }
}
