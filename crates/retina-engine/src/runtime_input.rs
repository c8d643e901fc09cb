//! Runtime parameter validation and batch construction.

use std::collections::HashMap;

use serde_json::Value;
use tracing::warn;

use retina_compiler::{CompiledInput, ExecutionPlan};
use retina_workflow::WORKFLOW_INPUT_LINEAGE;

use crate::batch::{BatchStructure, Index};
use crate::error::ExecutionError;
use crate::store::InputStore;

/// Inputs ready for execution.
#[derive(Debug)]
pub(crate) struct PreparedInputs {
  pub store: InputStore,
  pub structure: BatchStructure,
  pub batch_size: usize,
}

/// Validate runtime parameters and lay them out by batch index.
///
/// Top-level batches must all have the same length; a batch of length one is
/// broadcast to the common length. Parameters missing at runtime fall back to
/// their declared default, or null.
pub(crate) fn prepare(
  plan: &ExecutionPlan,
  mut parameters: HashMap<String, Value>,
) -> Result<PreparedInputs, ExecutionError> {
  let mut supplied: Vec<(&CompiledInput, Value)> = Vec::with_capacity(plan.inputs.len());
  for input in &plan.inputs {
    let value = match parameters.remove(&input.name) {
      Some(value) => value,
      None if input.is_required() => {
        return Err(ExecutionError::RuntimeInput {
          input_name: input.name.clone(),
          message: "missing required input".to_string(),
        });
      }
      None => input.default_value.clone().unwrap_or(Value::Null),
    };
    supplied.push((input, value));
  }

  for name in parameters.keys() {
    warn!(input_name = %name, "ignoring undeclared runtime parameter");
  }

  let mut batches: Vec<(&CompiledInput, Vec<Value>)> = Vec::new();
  let mut store = InputStore::default();
  for (input, value) in supplied {
    if input.dimensionality == 0 {
      store.insert(&input.name, Vec::new(), value);
      continue;
    }
    let elements = match value {
      Value::Array(items) => items,
      other if input.dimensionality == 1 => vec![other],
      _ => {
        return Err(ExecutionError::RuntimeInput {
          input_name: input.name.clone(),
          message: format!(
            "expected a nested list of depth {}",
            input.dimensionality
          ),
        });
      }
    };
    batches.push((input, elements));
  }

  let batch_size = common_batch_size(&batches)?;
  let mut structure = BatchStructure::default();
  structure
    .register(&[WORKFLOW_INPUT_LINEAGE.to_string()], &[], batch_size)
    .map_err(|message| ExecutionError::RuntimeInput {
      input_name: WORKFLOW_INPUT_LINEAGE.to_string(),
      message,
    })?;

  for (input, elements) in batches {
    let broadcast = elements.len() == 1 && batch_size != 1;
    for position in 0..batch_size {
      let element = if broadcast {
        elements[0].clone()
      } else {
        elements[position].clone()
      };
      lay_out(
        input,
        element,
        vec![position],
        &mut store,
        &mut structure,
      )?;
    }
  }

  Ok(PreparedInputs {
    store,
    structure,
    batch_size,
  })
}

fn common_batch_size(batches: &[(&CompiledInput, Vec<Value>)]) -> Result<usize, ExecutionError> {
  let mut size: Option<(usize, &str)> = None;
  for (input, elements) in batches {
    let len = elements.len();
    if len == 1 {
      continue;
    }
    match size {
      Some((expected, first)) if expected != len => {
        return Err(ExecutionError::RuntimeInput {
          input_name: input.name.clone(),
          message: format!(
            "batch of {len} elements does not match batch of {expected} elements in '{first}'"
          ),
        });
      }
      Some(_) => {}
      None => size = Some((len, input.name.as_str())),
    }
  }
  Ok(match size {
    Some((len, _)) => len,
    None => 1,
  })
}

/// Store one top-level element, descending through nested levels.
fn lay_out(
  input: &CompiledInput,
  value: Value,
  index: Index,
  store: &mut InputStore,
  structure: &mut BatchStructure,
) -> Result<(), ExecutionError> {
  if index.len() == input.dimensionality {
    store.insert(&input.name, index, value);
    return Ok(());
  }

  let Value::Array(items) = value else {
    return Err(ExecutionError::RuntimeInput {
      input_name: input.name.clone(),
      message: format!(
        "element {index:?} must be a list to reach dimensionality {}",
        input.dimensionality
      ),
    });
  };

  let level = &input.lineage[..index.len() + 1];
  structure
    .register(level, &index, items.len())
    .map_err(|message| ExecutionError::RuntimeInput {
      input_name: input.name.clone(),
      message: format!("nested batch shape differs from another input: {message}"),
    })?;

  for (position, item) in items.into_iter().enumerate() {
    let mut child = index.clone();
    child.push(position);
    lay_out(input, item, child, store, structure)?;
  }
  Ok(())
}
