use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use retina_block_registry::{
  Block, BlockError, BlockInput, BlockManifest, Kind, OutputMap, OutputSpec, PropertySpec,
  StepContext, StepOutput,
};

use crate::query::{Operation, Scope, Statement, apply_operations};

fn predictions_output(predictions: Value) -> Result<StepOutput, BlockError> {
  if !predictions.is_array() {
    return Err(BlockError::Evaluation {
      message: "operations must produce a list of detections".to_string(),
    });
  }
  Ok(StepOutput::Values(OutputMap::from([(
    "predictions".to_string(),
    predictions,
  )])))
}

#[derive(Deserialize)]
struct DetectionsFilterInput {
  predictions: Value,
  filter_operation: Statement,
  #[serde(default)]
  operands: Map<String, Value>,
}

/// Keeps the detections for which `filter_operation` holds.
///
/// Inside the statement `_` is the detection under test; `operands` supply
/// any other names it refers to.
pub struct DetectionsFilter {
  manifest: BlockManifest,
}

impl DetectionsFilter {
  pub const BLOCK_TYPE: &'static str = "DetectionsFilter";

  pub fn new() -> Self {
    let manifest = BlockManifest::new(Self::BLOCK_TYPE)
      .describe("Filters detections with a statement evaluated per detection")
      .batch_oriented()
      .property(PropertySpec::batch(
        "predictions",
        [Kind::OBJECT_DETECTION_PREDICTION],
      ))
      .property(PropertySpec::config("filter_operation"))
      .property(PropertySpec::data_map("operands", [Kind::WILDCARD]).with_default(json!({})))
      .output(OutputSpec::new(
        "predictions",
        [Kind::OBJECT_DETECTION_PREDICTION],
      ));
    Self { manifest }
  }
}

impl Default for DetectionsFilter {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl Block for DetectionsFilter {
  fn manifest(&self) -> &BlockManifest {
    &self.manifest
  }

  async fn execute(&self, _ctx: &StepContext, input: BlockInput) -> Result<StepOutput, BlockError> {
    let input: DetectionsFilterInput = input.parse()?;
    let filter = Operation::DetectionsFilter {
      filter_operation: input.filter_operation,
    };
    let kept = filter.apply(input.predictions, &Scope::new(&input.operands))?;
    predictions_output(kept)
  }
}

#[derive(Deserialize)]
struct DetectionsTransformationInput {
  predictions: Value,
  operations: Vec<Operation>,
  #[serde(default)]
  operations_parameters: Map<String, Value>,
}

/// Applies a chain of operations, such as `DetectionsOffset` and
/// `DetectionsFilter`, to a list of detections.
pub struct DetectionsTransformation {
  manifest: BlockManifest,
}

impl DetectionsTransformation {
  pub const BLOCK_TYPE: &'static str = "DetectionsTransformation";

  pub fn new() -> Self {
    let manifest = BlockManifest::new(Self::BLOCK_TYPE)
      .describe("Transforms detections with a chain of operations")
      .batch_oriented()
      .property(PropertySpec::batch(
        "predictions",
        [Kind::OBJECT_DETECTION_PREDICTION],
      ))
      .property(PropertySpec::config("operations"))
      .property(
        PropertySpec::data_map("operations_parameters", [Kind::WILDCARD]).with_default(json!({})),
      )
      .output(OutputSpec::new(
        "predictions",
        [Kind::OBJECT_DETECTION_PREDICTION],
      ));
    Self { manifest }
  }
}

impl Default for DetectionsTransformation {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl Block for DetectionsTransformation {
  fn manifest(&self) -> &BlockManifest {
    &self.manifest
  }

  async fn execute(&self, _ctx: &StepContext, input: BlockInput) -> Result<StepOutput, BlockError> {
    let input: DetectionsTransformationInput = input.parse()?;
    let scope = Scope::new(&input.operations_parameters);
    let transformed = apply_operations(input.predictions, &input.operations, &scope)?;
    predictions_output(transformed)
  }
}
