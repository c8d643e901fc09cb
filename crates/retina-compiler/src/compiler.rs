use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{info, instrument};

use retina_block_registry::{BlockRegistry, InitParameters};
use retina_config::WorkflowDefinition;
use retina_resolver::{ResolvedStep, ResolvedWorkflow, WorkflowResolver};
use retina_workflow::{
  CompilationError, NodeId, PropertyValue, Selector, WORKFLOW_INPUT_LINEAGE,
};

use crate::dimensionality::{self, input_lineage};
use crate::plan::{
  CompiledInput, CompiledOutput, CompiledStep, ExecutionPlan, InputBinding, StepDimensionality,
};

/// Compile a workflow definition into an execution plan.
#[instrument(
  name = "workflow_compile",
  skip_all,
  fields(version = %definition.version, steps = definition.steps.len())
)]
pub fn compile(
  definition: &WorkflowDefinition,
  init_parameters: &InitParameters,
  registry: &BlockRegistry,
) -> Result<ExecutionPlan, CompilationError> {
  let resolved = WorkflowResolver::new(registry).resolve(definition)?;
  check_init_parameters(&resolved, init_parameters)?;

  let order: Vec<String> = resolved
    .graph
    .topological_order()?
    .into_iter()
    .filter_map(|node| match node {
      NodeId::Step(name) => Some(name),
      _ => None,
    })
    .collect();

  let mut derived = dimensionality::derive(&resolved, &order)?;

  let inputs: Vec<CompiledInput> = resolved
    .inputs
    .iter()
    .map(|input| CompiledInput {
      name: input.name.clone(),
      dimensionality: input.dimensionality,
      lineage: input_lineage(input.dimensionality),
      default_value: input.default_value.clone(),
    })
    .collect();

  let mut steps = Vec::with_capacity(order.len());
  for name in &order {
    let Some(step) = resolved.step(name) else {
      continue;
    };
    let Some(dimensionality) = derived.remove(name) else {
      continue;
    };
    steps.push(compile_step(step, &resolved, &order, &steps, dimensionality)?);
  }

  let mut outputs = Vec::with_capacity(resolved.outputs.len());
  for output in &resolved.outputs {
    let (source, lineage) = bind_output(&output.selector, &inputs, &steps)?;
    if let Some(root) = lineage.first()
      && root != WORKFLOW_INPUT_LINEAGE
    {
      return Err(CompilationError::DimensionalityConflict {
        step_name: output.selector.step_name().unwrap_or_default().to_string(),
        message: format!(
          "output '{}' is nested under '{root}', which is not aligned with the workflow input batch",
          output.name
        ),
      });
    }
    outputs.push(CompiledOutput {
      name: output.name.clone(),
      selector: output.selector.to_string(),
      source,
      lineage,
    });
  }

  info!(
    steps = steps.len(),
    outputs = outputs.len(),
    "workflow_compiled"
  );

  Ok(ExecutionPlan {
    version: resolved.version.clone(),
    inputs,
    steps,
    outputs,
    init_parameters: Arc::new(init_parameters.clone()),
  })
}

/// Compile a definition given as raw JSON.
pub fn compile_value(
  definition: Value,
  init_parameters: &InitParameters,
  registry: &BlockRegistry,
) -> Result<ExecutionPlan, CompilationError> {
  let definition =
    WorkflowDefinition::from_value(definition).map_err(|e| CompilationError::InvalidDefinition {
      message: e.to_string(),
    })?;
  compile(&definition, init_parameters, registry)
}

fn check_init_parameters(
  resolved: &ResolvedWorkflow,
  init_parameters: &InitParameters,
) -> Result<(), CompilationError> {
  for step in &resolved.steps {
    for parameter in &step.manifest.init_parameters {
      if !init_parameters.contains_key(parameter) {
        return Err(CompilationError::MissingInitParameter {
          step_name: step.name.clone(),
          parameter: parameter.clone(),
        });
      }
    }
  }
  Ok(())
}

fn compile_step(
  step: &ResolvedStep,
  resolved: &ResolvedWorkflow,
  order: &[String],
  compiled: &[CompiledStep],
  dimensionality: StepDimensionality,
) -> Result<CompiledStep, CompilationError> {
  let output_dims: HashMap<&str, usize> = compiled
    .iter()
    .map(|s| (s.name.as_str(), s.dimensionality.output))
    .collect();

  let mut bindings = IndexMap::with_capacity(step.properties.len());
  for (property, value) in &step.properties {
    bindings.insert(property.clone(), bind(value, resolved, &output_dims)?);
  }

  let node = NodeId::Step(step.name.clone());
  let mut depends_on: Vec<String> = resolved
    .graph
    .upstream(&node)
    .iter()
    .filter_map(|(upstream, _)| upstream.step_name().map(str::to_string))
    .collect();
  depends_on.sort_by_key(|name| order.iter().position(|o| o == name));
  depends_on.dedup();

  let governed_by: Vec<String> = order
    .iter()
    .filter(|candidate| {
      resolved
        .step(candidate)
        .is_some_and(|s| s.flow_targets().contains(&step.name))
    })
    .cloned()
    .collect();

  Ok(CompiledStep {
    name: step.name.clone(),
    block_type: step.block_type.clone(),
    manifest: step.manifest.clone(),
    bindings,
    flow_targets: step.flow_targets(),
    governed_by,
    depends_on,
    dimensionality,
  })
}

fn bind(
  value: &PropertyValue,
  resolved: &ResolvedWorkflow,
  output_dims: &HashMap<&str, usize>,
) -> Result<InputBinding, CompilationError> {
  match value {
    PropertyValue::Literal(value) => Ok(InputBinding::Literal {
      value: value.clone(),
    }),
    PropertyValue::Targets(targets) => Ok(InputBinding::Literal {
      value: Value::Array(
        targets
          .iter()
          .filter_map(|t| t.step_name().map(|s| Value::String(s.to_string())))
          .collect(),
      ),
    }),
    PropertyValue::Map(entries) => {
      let mut bound = IndexMap::with_capacity(entries.len());
      for (key, entry) in entries {
        bound.insert(key.clone(), bind(entry, resolved, output_dims)?);
      }
      Ok(InputBinding::Map { entries: bound })
    }
    PropertyValue::Selector(selector) => {
      let unbound = || CompilationError::InvalidReferenceTarget {
        selector: selector.to_string(),
        message: "reference cannot be bound".to_string(),
      };
      match selector {
        Selector::Input { name } => {
          let input = resolved.input(name).ok_or_else(unbound)?;
          Ok(InputBinding::Input {
            name: name.clone(),
            dimensionality: input.dimensionality,
          })
        }
        Selector::StepOutput { step, property } => Ok(InputBinding::StepOutput {
          step: step.clone(),
          property: Some(property.clone()),
          dimensionality: *output_dims.get(step.as_str()).ok_or_else(unbound)?,
        }),
        Selector::StepWildcard { step } => Ok(InputBinding::StepOutput {
          step: step.clone(),
          property: None,
          dimensionality: *output_dims.get(step.as_str()).ok_or_else(unbound)?,
        }),
        Selector::StepReference { .. } => Err(unbound()),
      }
    }
  }
}

fn bind_output(
  selector: &Selector,
  inputs: &[CompiledInput],
  steps: &[CompiledStep],
) -> Result<(InputBinding, Vec<String>), CompilationError> {
  let unbound = || CompilationError::InvalidReferenceTarget {
    selector: selector.to_string(),
    message: "output reference cannot be bound".to_string(),
  };
  let step_of = |name: &str| steps.iter().find(|s| s.name == name).ok_or_else(unbound);

  match selector {
    Selector::Input { name } => {
      let input = inputs.iter().find(|i| &i.name == name).ok_or_else(unbound)?;
      Ok((
        InputBinding::Input {
          name: name.clone(),
          dimensionality: input.dimensionality,
        },
        input.lineage.clone(),
      ))
    }
    Selector::StepOutput { step, property } => {
      let compiled = step_of(step)?;
      Ok((
        InputBinding::StepOutput {
          step: step.clone(),
          property: Some(property.clone()),
          dimensionality: compiled.dimensionality.output,
        },
        compiled.dimensionality.output_lineage.clone(),
      ))
    }
    Selector::StepWildcard { step } => {
      let compiled = step_of(step)?;
      Ok((
        InputBinding::StepOutput {
          step: step.clone(),
          property: None,
          dimensionality: compiled.dimensionality.output,
        },
        compiled.dimensionality.output_lineage.clone(),
      ))
    }
    Selector::StepReference { .. } => Err(unbound()),
  }
}
