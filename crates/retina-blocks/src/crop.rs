use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use retina_block_registry::{
  Block, BlockError, BlockInput, BlockManifest, DimensionalityTransform, Kind, OutputMap,
  OutputSpec, PropertySpec, StepContext, StepOutput,
};

use crate::data::{self, DataError, Detection, Image};

#[derive(Deserialize)]
struct CropInput {
  image: Value,
  predictions: Value,
}

/// Cuts one crop per detection out of an image.
///
/// Each element fans out into a nested batch with one crop per detection, in
/// detection order. A crop is an image object whose `parent_id` is the
/// detection it was cut from; `parent_coordinates` locate it in the parent.
pub struct Crop {
  manifest: BlockManifest,
}

impl Crop {
  pub const BLOCK_TYPE: &'static str = "Crop";

  pub fn new() -> Self {
    let manifest = BlockManifest::new(Self::BLOCK_TYPE)
      .describe("Crops every detected box out of its image")
      .batch_oriented()
      .transform(DimensionalityTransform::Increment)
      .property(PropertySpec::batch("image", [Kind::IMAGE]))
      .property(PropertySpec::batch(
        "predictions",
        [Kind::OBJECT_DETECTION_PREDICTION],
      ))
      .output(OutputSpec::new("crops", [Kind::IMAGE]));
    Self { manifest }
  }
}

impl Default for Crop {
  fn default() -> Self {
    Self::new()
  }
}

fn invalid(field: &str) -> impl Fn(DataError) -> BlockError + '_ {
  move |e| BlockError::InvalidInput {
    field: field.to_string(),
    message: e.to_string(),
  }
}

fn crop(image: &Image<'_>, detection: &Value, position: usize) -> Result<Value, DataError> {
  let parsed = Detection::from_value(detection)?;
  let (image_width, image_height) = (image.width()?, image.height()?);
  let bbox = parsed.bounding_box()?.clamp(image_width, image_height);

  let parent_id = match (parsed.detection_id(), image.parent_id()) {
    (Some(id), _) => id.to_string(),
    (None, Some(image_id)) => format!("{image_id}.{position}"),
    (None, None) => position.to_string(),
  };

  let mut fields = Map::new();
  fields.insert("width".to_string(), data::number(bbox.width())?);
  fields.insert("height".to_string(), data::number(bbox.height())?);
  fields.insert("parent_id".to_string(), Value::String(parent_id));
  if let Some(root) = image.root_parent_id() {
    fields.insert("root_parent_id".to_string(), Value::String(root.to_string()));
  }
  if let Some(id) = parsed.detection_id() {
    fields.insert("detection_id".to_string(), Value::String(id.to_string()));
  }
  fields.insert(
    "parent_coordinates".to_string(),
    json!({
      "left": data::number(bbox.x_min)?,
      "top": data::number(bbox.y_min)?,
      "parent_width": data::number(image_width)?,
      "parent_height": data::number(image_height)?,
    }),
  );
  fields.insert("detection".to_string(), detection.clone());
  Ok(Value::Object(fields))
}

#[async_trait]
impl Block for Crop {
  fn manifest(&self) -> &BlockManifest {
    &self.manifest
  }

  async fn execute(&self, _ctx: &StepContext, input: BlockInput) -> Result<StepOutput, BlockError> {
    let input: CropInput = input.parse()?;
    let image = Image::from_value(&input.image).map_err(invalid("image"))?;
    let detections = data::as_array(&input.predictions, "list of detections")
      .map_err(invalid("predictions"))?;

    let crops = detections
      .iter()
      .enumerate()
      .map(|(position, detection)| {
        let crop = crop(&image, detection, position).map_err(invalid("predictions"))?;
        Ok(OutputMap::from([("crops".to_string(), crop)]))
      })
      .collect::<Result<Vec<_>, BlockError>>()?;
    Ok(StepOutput::Nested(crops))
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
      step_name: "crop".to_string(),
      init_parameters: Arc::default(),
    }
  }

  fn input(image: Value, predictions: Value) -> BlockInput {
    BlockInput::new(IndexMap::from([
      ("image".to_string(), image),
      ("predictions".to_string(), predictions),
    ]))
  }

  #[tokio::test]
  async fn test_one_crop_per_detection() {
    let image = json!({"width": 200, "height": 100, "parent_id": "img-1"});
    let predictions = json!([
      {"x": 50, "y": 50, "width": 20, "height": 40, "class": "dog", "detection_id": "d1"},
      {"x": 190, "y": 10, "width": 40, "height": 40, "class": "cat"},
    ]);
    let output = Crop::new()
      .execute(&ctx(), input(image, predictions))
      .await
      .unwrap();

    let StepOutput::Nested(crops) = output else {
      panic!("expected nested output");
    };
    assert_eq!(crops.len(), 2);
    let first = &crops[0]["crops"];
    assert_eq!(first["parent_id"], json!("d1"));
    assert_eq!(first["root_parent_id"], json!("img-1"));
    assert_eq!(first["width"], json!(20));
    assert_eq!(first["parent_coordinates"]["left"], json!(40));
    assert_eq!(first["detection"]["class"], json!("dog"));

    // clamped to the right and top image borders
    let second = &crops[1]["crops"];
    assert_eq!(second["parent_id"], json!("img-1.1"));
    assert_eq!(second["width"], json!(30));
    assert_eq!(second["height"], json!(30));
  }

  #[tokio::test]
  async fn test_no_detections_yields_empty_batch() {
    let output = Crop::new()
      .execute(&ctx(), input(json!({"width": 10, "height": 10}), json!([])))
      .await
      .unwrap();
    assert_eq!(output, StepOutput::Nested(vec![]));
  }

  #[tokio::test]
  async fn test_malformed_predictions_are_rejected() {
    let err = Crop::new()
      .execute(&ctx(), input(json!({"width": 10, "height": 10}), json!({"x": 1})))
      .await
      .unwrap_err();
    assert!(matches!(err, BlockError::InvalidInput { field, .. } if field == "predictions"));
  }
}
