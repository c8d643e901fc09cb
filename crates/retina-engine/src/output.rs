//! Assembling workflow outputs per top-level input element.

use indexmap::IndexMap;
use serde_json::Value;

use retina_compiler::{CompiledOutput, ExecutionPlan};

use crate::batch::BatchStructure;
use crate::store::{InputStore, ResultStore, lookup};

pub(crate) struct OutputContext<'a> {
  pub inputs: &'a InputStore,
  pub results: &'a ResultStore,
  pub structure: &'a BatchStructure,
}

/// Build one output record per top-level element.
///
/// Non-batch outputs are repeated in every record. Nested outputs become
/// nested lists following the batch structure; elements that produced nothing
/// are null and levels that were never created are empty lists.
pub(crate) fn assemble(
  plan: &ExecutionPlan,
  batch_size: usize,
  ctx: &OutputContext<'_>,
) -> Vec<IndexMap<String, Value>> {
  (0..batch_size)
    .map(|position| {
      plan
        .outputs
        .iter()
        .map(|output| {
          let value = match output.source.source_dimensionality() {
            Some(0) | None => value_at(output, &[], ctx),
            Some(_) => nest(output, vec![position], ctx),
          };
          (output.name.clone(), value)
        })
        .collect()
    })
    .collect()
}

fn nest(output: &CompiledOutput, index: Vec<usize>, ctx: &OutputContext<'_>) -> Value {
  if index.len() >= output.lineage.len() {
    return value_at(output, &index, ctx);
  }
  let level = &output.lineage[..index.len() + 1];
  match ctx.structure.children(level, &index) {
    None => Value::Array(Vec::new()),
    Some(count) => Value::Array(
      (0..count)
        .map(|position| {
          let mut child = index.clone();
          child.push(position);
          nest(output, child, ctx)
        })
        .collect(),
    ),
  }
}

fn value_at(output: &CompiledOutput, index: &[usize], ctx: &OutputContext<'_>) -> Value {
  lookup(&output.source, ctx.inputs, ctx.results, index).unwrap_or(Value::Null)
}
