use async_trait::async_trait;

use retina_block_registry::{
  Block, BlockError, BlockInput, BlockManifest, DimensionalityTransform, Kind, OutputMap,
  OutputSpec, PropertySpec, StepContext, StepOutput,
};

/// Folds each nested batch back into one list per parent element.
///
/// Children that were skipped or excluded by a branch appear as null, so the
/// list keeps one slot per child.
pub struct DimensionCollapse {
  manifest: BlockManifest,
}

impl DimensionCollapse {
  pub const BLOCK_TYPE: &'static str = "DimensionCollapse";

  pub fn new() -> Self {
    let manifest = BlockManifest::new(Self::BLOCK_TYPE)
      .describe("Collapses a nested batch into a list per parent element")
      .batch_oriented()
      .accepting_empty_values()
      .transform(DimensionalityTransform::Decrement)
      .property(PropertySpec::batch("data", [Kind::WILDCARD]))
      .output(OutputSpec::new("output", [Kind::LIST_OF_VALUES]));
    Self { manifest }
  }
}

impl Default for DimensionCollapse {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl Block for DimensionCollapse {
  fn manifest(&self) -> &BlockManifest {
    &self.manifest
  }

  async fn execute(&self, _ctx: &StepContext, input: BlockInput) -> Result<StepOutput, BlockError> {
    let data = input.require("data")?;
    if !data.is_array() {
      return Err(BlockError::InvalidInput {
        field: "data".to_string(),
        message: "expected the list of children".to_string(),
      });
    }
    Ok(StepOutput::Values(OutputMap::from([(
      "output".to_string(),
      data.clone(),
    )])))
  }
}
