//! Workflow execution.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use futures::future::try_join_all;
use indexmap::IndexMap;
use serde_json::Value;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use retina_block_registry::{
  Block, BlockError, BlockInput, DimensionalityTransform, StepContext, StepOutput,
};
use retina_compiler::CompiledStep;

use crate::batch::{BatchStructure, Index};
use crate::branch::{BranchId, BranchManager};
use crate::engine::ExecutionEngine;
use crate::error::ExecutionError;
use crate::output::{OutputContext, assemble};
use crate::runtime_input::{PreparedInputs, prepare};
use crate::step_input::{InputContext, Invocation, prepare_invocation};
use crate::store::{InputStore, ResultStore};

/// Outcome of one step task.
struct StepCompletion {
  step_name: String,
  indices: Vec<Index>,
  result: Result<Vec<StepOutput>, BlockError>,
}

/// Mutable state owned by the scheduler loop.
struct ExecutionState {
  inputs: InputStore,
  structure: BatchStructure,
  results: ResultStore,
  branches: BranchManager,
}

/// A single run of a workflow.
pub(crate) struct WorkflowExecution<'a> {
  engine: &'a ExecutionEngine,
  execution_id: String,
  cancel: CancellationToken,
}

impl<'a> WorkflowExecution<'a> {
  pub(crate) fn new(engine: &'a ExecutionEngine, execution_id: String, cancel: CancellationToken) -> Self {
    Self {
      engine,
      execution_id,
      cancel,
    }
  }

  /// Run the workflow to completion.
  #[instrument(
    name = "workflow_execute",
    skip_all,
    fields(execution_id = %self.execution_id)
  )]
  pub(crate) async fn wait(
    self,
    runtime_parameters: HashMap<String, Value>,
  ) -> Result<Vec<IndexMap<String, Value>>, ExecutionError> {
    info!(
      execution_id = %self.execution_id,
      steps = self.engine.plan.steps.len(),
      "workflow_started"
    );

    let result = self.run(runtime_parameters).await;

    match &result {
      Ok(records) => {
        info!(
          execution_id = %self.execution_id,
          records = records.len(),
          "workflow_completed"
        );
      }
      Err(e) => {
        error!(
          execution_id = %self.execution_id,
          error = %e,
          "workflow_failed"
        );
      }
    }

    result
  }

  async fn run(
    &self,
    runtime_parameters: HashMap<String, Value>,
  ) -> Result<Vec<IndexMap<String, Value>>, ExecutionError> {
    let plan = &self.engine.plan;
    let PreparedInputs {
      store,
      structure,
      batch_size,
    } = prepare(plan, runtime_parameters)?;

    let mut state = ExecutionState {
      inputs: store,
      structure,
      results: ResultStore::default(),
      branches: BranchManager::new(&self.execution_id),
    };

    // Kahn-style readiness over data and control dependencies
    let mut pending: HashMap<&str, usize> = plan
      .steps
      .iter()
      .map(|step| (step.name.as_str(), step.depends_on.len()))
      .collect();
    let mut dependents: HashMap<&str, Vec<&CompiledStep>> = HashMap::new();
    for step in &plan.steps {
      for upstream in &step.depends_on {
        dependents.entry(upstream.as_str()).or_default().push(step);
      }
    }
    let mut ready: VecDeque<&CompiledStep> = plan
      .steps
      .iter()
      .filter(|step| step.depends_on.is_empty())
      .collect();

    let limit = self.engine.config.concurrency_limit();
    let mut in_flight: JoinSet<StepCompletion> = JoinSet::new();
    let mut failure: Option<ExecutionError> = None;

    loop {
      if self.cancel.is_cancelled() {
        warn!(execution_id = %self.execution_id, "workflow cancelled");
        in_flight.abort_all();
        return Err(ExecutionError::Cancelled);
      }

      // Dispatch until the concurrency limit is reached. Skipped steps do not
      // occupy a slot and may make further steps ready.
      while failure.is_none() && in_flight.len() < limit {
        let Some(step) = ready.pop_front() else {
          break;
        };
        if !self.dispatch(step, &mut state, &mut in_flight) {
          release(step, &mut pending, &dependents, &mut ready);
        }
      }

      if in_flight.is_empty() {
        break;
      }

      let joined = tokio::select! {
        joined = in_flight.join_next() => joined,
        _ = self.cancel.cancelled() => {
          warn!(execution_id = %self.execution_id, "workflow cancelled during step execution");
          in_flight.abort_all();
          return Err(ExecutionError::Cancelled);
        }
      };
      let Some(joined) = joined else {
        break;
      };

      let completion = match joined {
        Ok(completion) => completion,
        Err(e) => {
          failure.get_or_insert(ExecutionError::Join {
            message: e.to_string(),
          });
          continue;
        }
      };

      let Some(step) = plan.step(&completion.step_name) else {
        continue;
      };
      match completion.result {
        Ok(outputs) if failure.is_none() => {
          match self.record(step, completion.indices, outputs, &mut state) {
            Ok(()) => release(step, &mut pending, &dependents, &mut ready),
            Err(e) => {
              failure.get_or_insert(e);
            }
          }
        }
        Ok(_) => {}
        Err(source) => {
          error!(
            execution_id = %self.execution_id,
            step_name = %step.name,
            error = %source,
            "step_failed"
          );
          failure.get_or_insert(ExecutionError::StepExecution {
            step_name: step.name.clone(),
            source,
          });
        }
      }
    }

    if let Some(failure) = failure {
      return Err(failure);
    }

    Ok(assemble(
      plan,
      batch_size,
      &OutputContext {
        inputs: &state.inputs,
        results: &state.results,
        structure: &state.structure,
      },
    ))
  }

  /// Prepare a ready step and spawn it. Returns false when the step is skipped.
  fn dispatch(
    &self,
    step: &CompiledStep,
    state: &mut ExecutionState,
    in_flight: &mut JoinSet<StepCompletion>,
  ) -> bool {
    let governing = state.branches.governing(&step.name, &step.governed_by);

    if let Some(exhausted) = governing
      .iter()
      .find(|id| state.branches.branch(**id).is_exhausted())
    {
      let reason = format!("{} is exhausted", state.branches.branch(*exhausted).name);
      self.skip(step, &governing, state, &reason);
      return false;
    }

    let invocation = prepare_invocation(
      step,
      &governing,
      &InputContext {
        inputs: &state.inputs,
        results: &state.results,
        structure: &state.structure,
        branches: &state.branches,
      },
    );
    if invocation.is_empty() {
      self.skip(step, &governing, state, "no element has inputs to run on");
      return false;
    }
    state.branches.close(&governing);

    let Some(block) = self.engine.blocks.get(&step.block_type).cloned() else {
      // Blocks are bound when the engine is built.
      error!(step_name = %step.name, block_type = %step.block_type, "block_missing");
      in_flight.spawn(missing_block(step.name.clone(), step.block_type.clone()));
      return true;
    };

    info!(
      execution_id = %self.execution_id,
      step_name = %step.name,
      block_type = %step.block_type,
      elements = invocation.indices.len(),
      "step_started"
    );

    let ctx = StepContext {
      execution_id: self.execution_id.clone(),
      step_name: step.name.clone(),
      init_parameters: Arc::clone(&self.engine.plan.init_parameters),
    };
    let batch_oriented = step.accepts_batch_input();
    let Invocation { indices, inputs } = invocation;
    in_flight.spawn(run_step(block, ctx, batch_oriented, indices, inputs));
    true
  }

  /// Record a step that will not run.
  fn skip(&self, step: &CompiledStep, governing: &[BranchId], state: &mut ExecutionState, reason: &str) {
    info!(
      execution_id = %self.execution_id,
      step_name = %step.name,
      reason,
      "step_skipped"
    );
    state.branches.close(governing);
    state.results.ensure(&step.name);
    if step.is_flow_control() {
      state.branches.open(
        &step.name,
        governing,
        step.dimensionality.input,
        &step.flow_targets,
        &[],
      );
    }
  }

  /// Store a completed step's outputs, or open branches for its decisions.
  fn record(
    &self,
    step: &CompiledStep,
    indices: Vec<Index>,
    outputs: Vec<StepOutput>,
    state: &mut ExecutionState,
  ) -> Result<(), ExecutionError> {
    let invalid = |message: String| ExecutionError::InvalidStepOutput {
      step_name: step.name.clone(),
      message,
    };

    if outputs.len() != indices.len() {
      return Err(invalid(format!(
        "expected {} results, got {}",
        indices.len(),
        outputs.len()
      )));
    }

    state.results.ensure(&step.name);
    let mut decisions: Vec<(Index, Vec<String>)> = Vec::new();
    for (index, output) in indices.into_iter().zip(outputs) {
      match (output, step.is_flow_control(), step.transform()) {
        (StepOutput::FlowControl(decision), true, _) => {
          if let Some(unknown) = decision
            .next_steps
            .iter()
            .find(|next| !step.flow_targets.contains(next))
          {
            return Err(invalid(format!(
              "selected step '{unknown}' is not one of its declared targets"
            )));
          }
          decisions.push((index, decision.next_steps));
        }
        (_, true, _) => {
          return Err(invalid(
            "flow-control blocks must return a decision".to_string(),
          ));
        }
        (StepOutput::Values(values), false, DimensionalityTransform::Identity)
        | (StepOutput::Values(values), false, DimensionalityTransform::Decrement) => {
          state.results.insert(&step.name, index, values);
        }
        (StepOutput::Nested(items), false, DimensionalityTransform::Increment) => {
          state
            .structure
            .register(&step.dimensionality.output_lineage, &index, items.len())
            .map_err(invalid)?;
          for (position, values) in items.into_iter().enumerate() {
            let mut child = index.clone();
            child.push(position);
            state.results.insert(&step.name, child, values);
          }
        }
        (StepOutput::Values(_), false, DimensionalityTransform::Increment) => {
          return Err(invalid(
            "blocks that increase dimensionality must return a nested batch".to_string(),
          ));
        }
        (_, false, _) => {
          return Err(invalid(
            "unexpected output shape for this block".to_string(),
          ));
        }
      }
    }

    info!(
      execution_id = %self.execution_id,
      step_name = %step.name,
      "step_completed"
    );

    if step.is_flow_control() {
      let own_branches = state.branches.governing(&step.name, &step.governed_by);
      state.branches.open(
        &step.name,
        &own_branches,
        step.dimensionality.input,
        &step.flow_targets,
        &decisions,
      );
    }
    Ok(())
  }
}

/// Mark a step finished and queue dependents whose dependencies are all met.
fn release<'p>(
  step: &CompiledStep,
  pending: &mut HashMap<&'p str, usize>,
  dependents: &HashMap<&'p str, Vec<&'p CompiledStep>>,
  ready: &mut VecDeque<&'p CompiledStep>,
) {
  let Some(downstream) = dependents.get(step.name.as_str()) else {
    return;
  };
  for &dependent in downstream {
    if let Some(count) = pending.get_mut(dependent.name.as_str()) {
      *count = count.saturating_sub(1);
      if *count == 0 {
        ready.push_back(dependent);
      }
    }
  }
}

/// Run one step's block over all of its elements.
async fn run_step(
  block: Arc<dyn Block>,
  ctx: StepContext,
  batch_oriented: bool,
  indices: Vec<Index>,
  inputs: Vec<BlockInput>,
) -> StepCompletion {
  let result = if batch_oriented {
    block.execute_batch(&ctx, inputs).await
  } else {
    try_join_all(inputs.into_iter().map(|input| block.execute(&ctx, input))).await
  };
  StepCompletion {
    step_name: ctx.step_name,
    indices,
    result,
  }
}

async fn missing_block(step_name: String, block_type: String) -> StepCompletion {
  StepCompletion {
    step_name,
    indices: Vec::new(),
    result: Err(BlockError::Backend {
      message: format!("no block registered for type '{block_type}'"),
    }),
  }
}
