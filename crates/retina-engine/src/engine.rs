//! Execution engine.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use retina_block_registry::{Block, BlockRegistry, InitParameters};
use retina_compiler::{ExecutionPlan, compile, compile_value};
use retina_config::WorkflowDefinition;
use retina_workflow::CompilationError;

use crate::config::EngineConfig;
use crate::error::ExecutionError;
use crate::execution::WorkflowExecution;

/// Runtime values keyed by workflow input name.
pub type RuntimeParameters = HashMap<String, Value>;

/// One record of named outputs per top-level input element.
pub type WorkflowResult = Vec<IndexMap<String, Value>>;

/// A compiled workflow bound to its blocks, ready to run any number of times.
pub struct ExecutionEngine {
  pub(crate) plan: Arc<ExecutionPlan>,
  pub(crate) blocks: HashMap<String, Arc<dyn Block>>,
  pub(crate) config: EngineConfig,
}

impl ExecutionEngine {
  /// Compile a definition and bind it to blocks from the registry.
  pub fn init(
    definition: &WorkflowDefinition,
    init_parameters: &InitParameters,
    registry: &BlockRegistry,
    config: EngineConfig,
  ) -> Result<Self, CompilationError> {
    let plan = compile(definition, init_parameters, registry)?;
    Self::from_plan(Arc::new(plan), registry, config)
  }

  /// Like [`ExecutionEngine::init`] for a definition given as raw JSON.
  pub fn init_value(
    definition: Value,
    init_parameters: &InitParameters,
    registry: &BlockRegistry,
    config: EngineConfig,
  ) -> Result<Self, CompilationError> {
    let plan = compile_value(definition, init_parameters, registry)?;
    Self::from_plan(Arc::new(plan), registry, config)
  }

  /// Bind an already compiled (possibly cached) plan to blocks from the registry.
  pub fn from_plan(
    plan: Arc<ExecutionPlan>,
    registry: &BlockRegistry,
    config: EngineConfig,
  ) -> Result<Self, CompilationError> {
    let mut blocks = HashMap::new();
    for step in &plan.steps {
      if blocks.contains_key(&step.block_type) {
        continue;
      }
      let block = registry
        .get(&step.block_type)
        .map_err(|_| CompilationError::UnknownBlockType {
          step_name: step.name.clone(),
          block_type: step.block_type.clone(),
        })?;
      blocks.insert(step.block_type.clone(), block);
    }

    debug!(
      steps = plan.steps.len(),
      block_types = blocks.len(),
      max_concurrent_steps = config.max_concurrent_steps,
      "engine_initialized"
    );

    Ok(Self {
      plan,
      blocks,
      config,
    })
  }

  pub fn plan(&self) -> &ExecutionPlan {
    &self.plan
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  /// Run the workflow once.
  pub async fn run_async(
    &self,
    runtime_parameters: RuntimeParameters,
  ) -> Result<WorkflowResult, ExecutionError> {
    self
      .run_async_with_cancel(runtime_parameters, CancellationToken::new())
      .await
  }

  /// Run the workflow once, stopping early when `cancel` fires.
  pub async fn run_async_with_cancel(
    &self,
    runtime_parameters: RuntimeParameters,
    cancel: CancellationToken,
  ) -> Result<WorkflowResult, ExecutionError> {
    let execution_id = uuid::Uuid::new_v4().to_string();
    WorkflowExecution::new(self, execution_id, cancel)
      .wait(runtime_parameters)
      .await
  }

  /// Blocking variant of [`ExecutionEngine::run_async`].
  ///
  /// Drives the run on a private current-thread runtime, so it must not be
  /// called from inside an async context.
  pub fn run(&self, runtime_parameters: RuntimeParameters) -> Result<WorkflowResult, ExecutionError> {
    if tokio::runtime::Handle::try_current().is_ok() {
      return Err(ExecutionError::RuntimeSetup {
        message: "blocking run called from within an async runtime; use run_async".to_string(),
      });
    }
    let runtime = tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()
      .map_err(|e| ExecutionError::RuntimeSetup {
        message: e.to_string(),
      })?;
    runtime.block_on(self.run_async(runtime_parameters))
  }
}

impl std::fmt::Debug for ExecutionEngine {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ExecutionEngine")
      .field("steps", &self.plan.step_names())
      .field("config", &self.config)
      .finish()
  }
}
