//! Blocks that decide which downstream steps run.

use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::debug;

use retina_block_registry::{
  Block, BlockError, BlockInput, BlockManifest, FlowDecision, Kind, PropertySpec, StepContext,
  StepOutput,
};

use crate::query::{Scope, Statement};

fn condition_properties(manifest: BlockManifest) -> BlockManifest {
  manifest
    .property(PropertySpec::config("condition_statement"))
    .property(
      PropertySpec::data_map("evaluation_parameters", [Kind::WILDCARD]).with_default(json!({})),
    )
}

fn evaluate(
  ctx: &StepContext,
  statement: &Statement,
  parameters: &Map<String, Value>,
) -> Result<bool, BlockError> {
  let outcome = statement.evaluate(&Scope::new(parameters))?;
  debug!(
    execution_id = %ctx.execution_id,
    step_name = %ctx.step_name,
    outcome,
    "condition_evaluated"
  );
  Ok(outcome)
}

#[derive(Deserialize)]
struct ConditionInput {
  condition_statement: Statement,
  #[serde(default)]
  evaluation_parameters: Map<String, Value>,
  #[serde(default)]
  steps_if_true: Vec<String>,
  #[serde(default)]
  steps_if_false: Vec<String>,
}

/// If-else branching on a statement, decided per element.
pub struct Condition {
  manifest: BlockManifest,
}

impl Condition {
  pub const BLOCK_TYPE: &'static str = "Condition";

  pub fn new() -> Self {
    let manifest = BlockManifest::new(Self::BLOCK_TYPE)
      .describe("Runs `steps_if_true` or `steps_if_false` depending on a statement")
      .batch_oriented()
      .flow_control();
    let manifest = condition_properties(manifest)
      .property(PropertySpec::step_targets("steps_if_true").with_default(json!([])))
      .property(PropertySpec::step_targets("steps_if_false").with_default(json!([])));
    Self { manifest }
  }
}

impl Default for Condition {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl Block for Condition {
  fn manifest(&self) -> &BlockManifest {
    &self.manifest
  }

  async fn execute(&self, ctx: &StepContext, input: BlockInput) -> Result<StepOutput, BlockError> {
    let input: ConditionInput = input.parse()?;
    let next_steps = if evaluate(ctx, &input.condition_statement, &input.evaluation_parameters)? {
      input.steps_if_true
    } else {
      input.steps_if_false
    };
    Ok(StepOutput::FlowControl(FlowDecision::select(next_steps)))
  }
}

#[derive(Deserialize)]
struct ContinueIfInput {
  condition_statement: Statement,
  #[serde(default)]
  evaluation_parameters: Map<String, Value>,
  next_steps: Vec<String>,
}

/// Lets an element continue to `next_steps` only while a statement holds.
pub struct ContinueIf {
  manifest: BlockManifest,
}

impl ContinueIf {
  pub const BLOCK_TYPE: &'static str = "ContinueIf";

  pub fn new() -> Self {
    let manifest = BlockManifest::new(Self::BLOCK_TYPE)
      .describe("Stops execution of `next_steps` for elements failing a statement")
      .batch_oriented()
      .flow_control();
    let manifest = condition_properties(manifest).property(PropertySpec::step_targets("next_steps"));
    Self { manifest }
  }
}

impl Default for ContinueIf {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl Block for ContinueIf {
  fn manifest(&self) -> &BlockManifest {
    &self.manifest
  }

  async fn execute(&self, ctx: &StepContext, input: BlockInput) -> Result<StepOutput, BlockError> {
    let input: ContinueIfInput = input.parse()?;
    let decision = if evaluate(ctx, &input.condition_statement, &input.evaluation_parameters)? {
      FlowDecision::select(input.next_steps)
    } else {
      FlowDecision::terminate()
    };
    Ok(StepOutput::FlowControl(decision))
  }
}

const DEFAULT_PROBABILITY: f64 = 0.5;

fn default_probability() -> f64 {
  DEFAULT_PROBABILITY
}

#[derive(Deserialize)]
struct ABTestInput {
  a_step: Vec<String>,
  b_step: Vec<String>,
  #[serde(default = "default_probability")]
  probability: f64,
}

/// Picks one of two steps at random, once for the whole batch.
pub struct ABTest {
  manifest: BlockManifest,
}

impl ABTest {
  pub const BLOCK_TYPE: &'static str = "ABTest";

  pub fn new() -> Self {
    let manifest = BlockManifest::new(Self::BLOCK_TYPE)
      .describe("Runs `a_step` with the given probability, `b_step` otherwise")
      .flow_control()
      .property(PropertySpec::step_targets("a_step"))
      .property(PropertySpec::step_targets("b_step"))
      .property(PropertySpec::config("probability").with_default(json!(DEFAULT_PROBABILITY)));
    Self { manifest }
  }
}

impl Default for ABTest {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl Block for ABTest {
  fn manifest(&self) -> &BlockManifest {
    &self.manifest
  }

  async fn execute(&self, ctx: &StepContext, input: BlockInput) -> Result<StepOutput, BlockError> {
    let input: ABTestInput = input.parse()?;
    if !(0.0..=1.0).contains(&input.probability) {
      return Err(BlockError::InvalidInput {
        field: "probability".to_string(),
        message: format!("must be within [0, 1], got {}", input.probability),
      });
    }

    let choose_a = rand::rng().random_bool(input.probability);
    debug!(
      execution_id = %ctx.execution_id,
      step_name = %ctx.step_name,
      variant = if choose_a { "a" } else { "b" },
      "ab_test_decided"
    );
    let next_steps = if choose_a { input.a_step } else { input.b_step };
    Ok(StepOutput::FlowControl(FlowDecision::select(next_steps)))
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use super::*;
  use indexmap::IndexMap;

  fn ctx() -> StepContext {
    StepContext {
      execution_id: "test".to_string(),
      step_name: "condition".to_string(),
      init_parameters: Arc::default(),
    }
  }

  fn input(value: Value) -> BlockInput {
    let values: IndexMap<String, Value> = value
      .as_object()
      .unwrap()
      .iter()
      .map(|(k, v)| (k.clone(), v.clone()))
      .collect();
    BlockInput::new(values)
  }

  fn at_least(threshold: u32) -> Value {
    json!({
      "type": "StatementGroup",
      "statements": [{
        "type": "BinaryStatement",
        "left_operand": {
          "type": "DynamicOperand",
          "operand_name": "prediction",
          "operations": [{"type": "SequenceLength"}]
        },
        "comparator": {"type": "(Number) >="},
        "right_operand": {"type": "StaticOperand", "value": threshold}
      }]
    })
  }

  #[tokio::test]
  async fn test_condition_selects_branch() {
    let block = Condition::new();
    let make = |threshold| {
      input(json!({
        "condition_statement": at_least(threshold),
        "evaluation_parameters": {"prediction": [1, 2, 3]},
        "steps_if_true": ["b"],
        "steps_if_false": ["c"],
      }))
    };

    let output = block.execute(&ctx(), make(2)).await.unwrap();
    assert_eq!(
      output,
      StepOutput::FlowControl(FlowDecision::select(["b".to_string()]))
    );
    let output = block.execute(&ctx(), make(4)).await.unwrap();
    assert_eq!(
      output,
      StepOutput::FlowControl(FlowDecision::select(["c".to_string()]))
    );
  }

  #[tokio::test]
  async fn test_condition_evaluation_error_is_reported() {
    let block = Condition::new();
    let err = block
      .execute(
        &ctx(),
        input(json!({
          "condition_statement": at_least(1),
          "evaluation_parameters": {"prediction": 7},
        })),
      )
      .await
      .unwrap_err();
    assert!(matches!(err, BlockError::Evaluation { .. }));
  }

  #[tokio::test]
  async fn test_continue_if_terminates_on_false() {
    let block = ContinueIf::new();
    let output = block
      .execute(
        &ctx(),
        input(json!({
          "condition_statement": at_least(5),
          "evaluation_parameters": {"prediction": []},
          "next_steps": ["classification"],
        })),
      )
      .await
      .unwrap();
    assert_eq!(output, StepOutput::FlowControl(FlowDecision::terminate()));
  }

  #[tokio::test]
  async fn test_ab_test_extremes_are_deterministic() {
    let block = ABTest::new();
    let decide = |probability: f64| {
      input(json!({"a_step": ["a"], "b_step": ["b"], "probability": probability}))
    };
    for _ in 0..10 {
      let output = block.execute(&ctx(), decide(1.0)).await.unwrap();
      assert_eq!(
        output,
        StepOutput::FlowControl(FlowDecision::select(["a".to_string()]))
      );
      let output = block.execute(&ctx(), decide(0.0)).await.unwrap();
      assert_eq!(
        output,
        StepOutput::FlowControl(FlowDecision::select(["b".to_string()]))
      );
    }
  }

  #[tokio::test]
  async fn test_ab_test_rejects_invalid_probability() {
    let block = ABTest::new();
    let err = block
      .execute(
        &ctx(),
        input(json!({"a_step": ["a"], "b_step": ["b"], "probability": 1.5})),
      )
      .await
      .unwrap_err();
    assert!(matches!(err, BlockError::InvalidInput { field, .. } if field == "probability"));
  }

  #[test]
  fn test_manifests() {
    let condition = Condition::new();
    assert!(condition.manifest().flow_control);
    assert!(condition.manifest().accepts_batch_input);
    assert!(
      condition
        .manifest()
        .find_property("evaluation_parameters")
        .unwrap()
        .accepts_batch()
    );
    let ab = ABTest::new();
    assert!(!ab.manifest().accepts_batch_input);
    assert!(!ab.manifest().find_property("probability").unwrap().required);
  }
}
