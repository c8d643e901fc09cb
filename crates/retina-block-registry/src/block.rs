use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BlockError;
use crate::manifest::BlockManifest;

/// Values supplied at compile time and shared by every step, e.g. API keys.
pub type InitParameters = HashMap<String, Value>;

/// Named outputs of one step invocation.
pub type OutputMap = IndexMap<String, Value>;

/// Per-step information available to a block while it runs.
#[derive(Debug, Clone)]
pub struct StepContext {
  pub execution_id: String,
  pub step_name: String,
  pub init_parameters: Arc<InitParameters>,
}

impl StepContext {
  pub fn init_parameter(&self, name: &str) -> Option<&Value> {
    self.init_parameters.get(name)
  }
}

/// Resolved property values for one invocation of a block.
///
/// Flow-control target properties arrive as arrays of step names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockInput {
  values: IndexMap<String, Value>,
}

impl BlockInput {
  pub fn new(values: IndexMap<String, Value>) -> Self {
    Self { values }
  }

  pub fn get(&self, name: &str) -> Option<&Value> {
    self.values.get(name)
  }

  pub fn require(&self, name: &str) -> Result<&Value, BlockError> {
    self
      .values
      .get(name)
      .filter(|v| !v.is_null())
      .ok_or_else(|| BlockError::InvalidInput {
        field: name.to_string(),
        message: "value is required".to_string(),
      })
  }

  /// Deserialize all values into a typed input struct.
  pub fn parse<T: DeserializeOwned>(&self) -> Result<T, BlockError> {
    let object: serde_json::Map<String, Value> = self
      .values
      .iter()
      .map(|(k, v)| (k.clone(), v.clone()))
      .collect();
    serde_json::from_value(Value::Object(object)).map_err(|e| BlockError::InvalidInput {
      field: "input".to_string(),
      message: e.to_string(),
    })
  }

  pub fn values(&self) -> &IndexMap<String, Value> {
    &self.values
  }

  pub fn into_values(self) -> IndexMap<String, Value> {
    self.values
  }
}

/// Steps selected by a flow-control block for one element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowDecision {
  pub next_steps: Vec<String>,
}

impl FlowDecision {
  pub fn select(steps: impl IntoIterator<Item = String>) -> Self {
    Self {
      next_steps: steps.into_iter().collect(),
    }
  }

  pub fn terminate() -> Self {
    Self::default()
  }
}

/// Result of one block invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutput {
  /// One set of outputs for the element.
  Values(OutputMap),
  /// A nested batch of outputs, produced by dimensionality-increasing blocks.
  Nested(Vec<OutputMap>),
  /// A branching decision, produced by flow-control blocks.
  FlowControl(FlowDecision),
}

/// A unit of work with a declared contract.
#[async_trait]
pub trait Block: Send + Sync {
  fn manifest(&self) -> &BlockManifest;

  /// Run on one element.
  async fn execute(&self, ctx: &StepContext, input: BlockInput) -> Result<StepOutput, BlockError>;

  /// Run on a whole batch. Output order must follow input order.
  ///
  /// Batch-oriented blocks may override this to process elements together;
  /// the default runs them one after another.
  async fn execute_batch(
    &self,
    ctx: &StepContext,
    inputs: Vec<BlockInput>,
  ) -> Result<Vec<StepOutput>, BlockError> {
    let mut outputs = Vec::with_capacity(inputs.len());
    for input in inputs {
      outputs.push(self.execute(ctx, input).await?);
    }
    Ok(outputs)
  }
}
