//! Dimensionality and lineage derivation.
//!
//! Every step consumes data at some nesting depth (its input dimensionality)
//! and the block's transform decides the depth of what it produces. Sources
//! feeding one step must come from the same nesting tree: their lineages must
//! be prefixes of one another.

use std::collections::HashMap;

use retina_block_registry::DimensionalityTransform;
use retina_resolver::{ResolvedStep, ResolvedWorkflow};
use retina_workflow::{CompilationError, PropertyValue, Selector, WORKFLOW_INPUT_LINEAGE};

use crate::plan::StepDimensionality;

struct Source {
  selector: String,
  dimensionality: usize,
  lineage: Vec<String>,
}

/// Lineage of a workflow input of the given dimensionality.
pub(crate) fn input_lineage(dimensionality: usize) -> Vec<String> {
  vec![WORKFLOW_INPUT_LINEAGE.to_string(); dimensionality]
}

/// Compute dimensionality for every step, visiting them in topological order.
pub(crate) fn derive(
  resolved: &ResolvedWorkflow,
  order: &[String],
) -> Result<HashMap<String, StepDimensionality>, CompilationError> {
  let mut derived: HashMap<String, StepDimensionality> = HashMap::with_capacity(order.len());

  for name in order {
    let step = resolved
      .step(name)
      .ok_or_else(|| CompilationError::InvalidDefinition {
        message: format!("step '{name}' missing from resolved workflow"),
      })?;
    let dimensionality = derive_step(step, resolved, &derived)?;
    derived.insert(name.clone(), dimensionality);
  }

  check_governance(resolved, &derived)?;
  Ok(derived)
}

fn derive_step(
  step: &ResolvedStep,
  resolved: &ResolvedWorkflow,
  derived: &HashMap<String, StepDimensionality>,
) -> Result<StepDimensionality, CompilationError> {
  let conflict = |message: String| CompilationError::DimensionalityConflict {
    step_name: step.name.clone(),
    message,
  };

  let mut sources: Vec<Source> = Vec::new();
  for (property, value) in &step.properties {
    if matches!(value, PropertyValue::Targets(_)) {
      continue;
    }
    let accepts_batch = step
      .manifest
      .find_property(property)
      .is_some_and(|spec| spec.accepts_batch());

    for selector in value.selectors() {
      let source = source_of(selector, resolved, derived)?;
      if source.dimensionality > 0 && !accepts_batch {
        return Err(conflict(format!(
          "property '{property}' does not accept batch-oriented data, but '{}' has dimensionality {}",
          source.selector, source.dimensionality
        )));
      }
      sources.push(source);
    }
  }

  // Deepest source wins; the first one declared breaks ties.
  let reference = sources
    .iter()
    .fold(None::<&Source>, |best, source| match best {
      Some(b) if b.dimensionality >= source.dimensionality => Some(b),
      _ => Some(source),
    });

  let (input, lineage) = match reference {
    Some(reference) => {
      for source in &sources {
        if !reference.lineage.starts_with(&source.lineage) {
          return Err(conflict(format!(
            "'{}' and '{}' come from different batches (lineage [{}] vs [{}])",
            reference.selector,
            source.selector,
            reference.lineage.join(", "),
            source.lineage.join(", ")
          )));
        }
      }
      (reference.dimensionality, reference.lineage.clone())
    }
    None => (0, Vec::new()),
  };

  if step.manifest.flow_control && !step.manifest.accepts_batch_input && input > 0 {
    return Err(conflict(format!(
      "flow-control block '{}' does not operate on batches but receives data of dimensionality {input}",
      step.block_type
    )));
  }

  let (output, output_lineage) = match step.manifest.dimensionality {
    DimensionalityTransform::Identity => (input, lineage.clone()),
    DimensionalityTransform::Increment => {
      let mut output_lineage = lineage.clone();
      output_lineage.push(step.name.clone());
      (input + 1, output_lineage)
    }
    DimensionalityTransform::Decrement => {
      if input == 0 {
        return Err(conflict(format!(
          "block '{}' collapses one level of nesting but receives non-batch data",
          step.block_type
        )));
      }
      (input - 1, lineage[..input - 1].to_vec())
    }
  };

  Ok(StepDimensionality {
    input,
    output,
    lineage,
    output_lineage,
  })
}

fn source_of(
  selector: &Selector,
  resolved: &ResolvedWorkflow,
  derived: &HashMap<String, StepDimensionality>,
) -> Result<Source, CompilationError> {
  let (dimensionality, lineage) = match selector {
    Selector::Input { name } => {
      let input = resolved
        .input(name)
        .ok_or_else(|| CompilationError::InvalidReferenceTarget {
          selector: selector.to_string(),
          message: format!("input '{name}' is not declared"),
        })?;
      (input.dimensionality, input_lineage(input.dimensionality))
    }
    Selector::StepOutput { step, .. }
    | Selector::StepWildcard { step }
    | Selector::StepReference { step } => {
      let upstream = derived
        .get(step)
        .ok_or_else(|| CompilationError::InvalidReferenceTarget {
          selector: selector.to_string(),
          message: format!("step '{step}' is not compiled before its consumers"),
        })?;
      (upstream.output, upstream.output_lineage.clone())
    }
  };

  Ok(Source {
    selector: selector.to_string(),
    dimensionality,
    lineage,
  })
}

/// A flow-control step may only govern steps that live at its own depth or
/// deeper, inside the same nesting tree.
fn check_governance(
  resolved: &ResolvedWorkflow,
  derived: &HashMap<String, StepDimensionality>,
) -> Result<(), CompilationError> {
  for step in &resolved.steps {
    let Some(governor) = derived.get(&step.name) else {
      continue;
    };
    for target in step.flow_targets() {
      let Some(governed) = derived.get(&target) else {
        continue;
      };
      if governor.input > governed.input || !governed.lineage.starts_with(&governor.lineage) {
        return Err(CompilationError::DimensionalityConflict {
          step_name: target.clone(),
          message: format!(
            "flow-control step '{}' operates at dimensionality {} and cannot govern a step at dimensionality {} in another batch",
            step.name, governor.input, governed.input
          ),
        });
      }
    }
  }
  Ok(())
}
