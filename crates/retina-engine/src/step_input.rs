//! Building block inputs for one step from stored data.

use indexmap::IndexMap;
use serde_json::Value;

use retina_block_registry::{BlockInput, DimensionalityTransform};
use retina_compiler::{CompiledStep, InputBinding};

use crate::batch::{BatchStructure, Index};
use crate::branch::{BranchId, BranchManager};
use crate::store::{InputStore, ResultStore, lookup};

/// Inputs for every element a step should run on.
#[derive(Debug, Default)]
pub(crate) struct Invocation {
  pub indices: Vec<Index>,
  pub inputs: Vec<BlockInput>,
}

impl Invocation {
  pub fn is_empty(&self) -> bool {
    self.indices.is_empty()
  }

  fn push(&mut self, index: Index, input: BlockInput) {
    self.indices.push(index);
    self.inputs.push(input);
  }
}

/// Read-only view over everything input preparation needs.
pub(crate) struct InputContext<'a> {
  pub inputs: &'a InputStore,
  pub results: &'a ResultStore,
  pub structure: &'a BatchStructure,
  pub branches: &'a BranchManager,
}

/// Where a binding is being resolved.
enum Cursor<'c> {
  /// A single element.
  Element(&'c [usize]),
  /// A parent element whose children at `depth` are gathered into a list.
  Collapse {
    parent: &'c [usize],
    children: usize,
    depth: usize,
  },
}

#[derive(Default)]
struct Presence {
  batch_sourced: usize,
  batch_missing: usize,
  sourced: usize,
  missing: usize,
}

impl Presence {
  fn record(&mut self, dimensionality: usize, present: bool) {
    self.sourced += 1;
    if !present {
      self.missing += 1;
    }
    if dimensionality > 0 {
      self.batch_sourced += 1;
      if !present {
        self.batch_missing += 1;
      }
    }
  }

  /// Whether the element should run.
  ///
  /// Elements whose data sources are all empty never run. Elements with some
  /// empty sources only run for blocks that accept empty values.
  fn admits(&self, accepts_empty_values: bool) -> bool {
    let (sourced, missing) = if self.batch_sourced > 0 {
      (self.batch_sourced, self.batch_missing)
    } else {
      (self.sourced, self.missing)
    };
    if sourced > 0 && missing == sourced {
      return false;
    }
    self.missing == 0 || accepts_empty_values
  }
}

/// Collect inputs for every live element of a step.
pub(crate) fn prepare_invocation(
  step: &CompiledStep,
  governing: &[BranchId],
  ctx: &InputContext<'_>,
) -> Invocation {
  match step.transform() {
    DimensionalityTransform::Decrement => prepare_collapsing(step, governing, ctx),
    DimensionalityTransform::Identity | DimensionalityTransform::Increment => {
      prepare_elementwise(step, governing, ctx)
    }
  }
}

fn prepare_elementwise(
  step: &CompiledStep,
  governing: &[BranchId],
  ctx: &InputContext<'_>,
) -> Invocation {
  let mut invocation = Invocation::default();
  for index in ctx.structure.indices(&step.dimensionality.lineage) {
    if !ctx.branches.admits(governing, &index) {
      continue;
    }
    if let Some(input) = build_input(step, Cursor::Element(&index), governing, ctx, false) {
      invocation.push(index, input);
    }
  }
  invocation
}

/// Decrement steps run once per parent element and see each deepest-level
/// binding as the list of that parent's children, with null for children
/// that are missing or excluded by a branch.
///
/// A block accepting empty values runs for every parent with registered
/// children, even when all of them are null, so the list keeps one slot per
/// child.
fn prepare_collapsing(
  step: &CompiledStep,
  governing: &[BranchId],
  ctx: &InputContext<'_>,
) -> Invocation {
  let depth = step.dimensionality.input;
  let lineage = &step.dimensionality.lineage;
  let parent_lineage = &lineage[..depth.saturating_sub(1)];

  let mut invocation = Invocation::default();
  for parent in ctx.structure.indices(parent_lineage) {
    if !ctx.branches.admits(governing, &parent) {
      continue;
    }
    let children = ctx.structure.children(lineage, &parent).unwrap_or(0);
    let keep_empty = children > 0 && step.accepts_empty_values();
    let cursor = Cursor::Collapse {
      parent: &parent,
      children,
      depth,
    };
    if let Some(input) = build_input(step, cursor, governing, ctx, keep_empty) {
      invocation.push(parent.clone(), input);
    }
  }
  invocation
}

fn build_input(
  step: &CompiledStep,
  cursor: Cursor<'_>,
  governing: &[BranchId],
  ctx: &InputContext<'_>,
  keep_empty: bool,
) -> Option<BlockInput> {
  let mut presence = Presence::default();
  let mut values = IndexMap::with_capacity(step.bindings.len());
  for (name, binding) in &step.bindings {
    let value = resolve(binding, &cursor, governing, ctx, &mut presence);
    values.insert(name.clone(), value);
  }

  if keep_empty || presence.admits(step.accepts_empty_values()) {
    Some(BlockInput::new(values))
  } else {
    None
  }
}

fn resolve(
  binding: &InputBinding,
  cursor: &Cursor<'_>,
  governing: &[BranchId],
  ctx: &InputContext<'_>,
  presence: &mut Presence,
) -> Value {
  let Some(dimensionality) = binding.source_dimensionality() else {
    return match binding {
      InputBinding::Map { entries } => Value::Object(
        entries
          .iter()
          .map(|(key, entry)| (key.clone(), resolve(entry, cursor, governing, ctx, presence)))
          .collect(),
      ),
      InputBinding::Literal { value } => value.clone(),
      _ => Value::Null,
    };
  };

  let (value, present) = match cursor {
    Cursor::Element(index) => match lookup(binding, ctx.inputs, ctx.results, index) {
      Some(value) => (value, true),
      None => (Value::Null, false),
    },
    Cursor::Collapse {
      parent,
      children,
      depth,
    } if dimensionality == *depth => {
      let mut any = false;
      let items: Vec<Value> = (0..*children)
        .map(|position| {
          let mut child = parent.to_vec();
          child.push(position);
          if !ctx.branches.admits(governing, &child) {
            return Value::Null;
          }
          match lookup(binding, ctx.inputs, ctx.results, &child) {
            Some(value) => {
              any = true;
              value
            }
            None => Value::Null,
          }
        })
        .collect();
      (Value::Array(items), any)
    }
    Cursor::Collapse { parent, .. } => match lookup(binding, ctx.inputs, ctx.results, parent) {
      Some(value) => (value, true),
      None => (Value::Null, false),
    },
  };

  presence.record(dimensionality, present);
  value
}
