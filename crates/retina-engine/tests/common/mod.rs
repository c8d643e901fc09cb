//! Stub blocks shared by the engine integration tests.
//!
//! Models are deterministic: an image carries the detections the detector
//! should "find" under `detections`, and a crop carries them under
//! `detection.detections` (the detection it was cut from).

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use retina_block_registry::{
  Block, BlockError, BlockInput, BlockManifest, BlockRegistry, Kind, OutputMap, OutputSpec,
  PropertySpec, StepContext, StepOutput,
};
use retina_engine::RuntimeParameters;

fn values(name: &str, value: Value) -> StepOutput {
  StepOutput::Values(OutputMap::from([(name.to_string(), value)]))
}

pub struct ObjectDetectionModel {
  manifest: BlockManifest,
}

impl ObjectDetectionModel {
  pub fn new() -> Self {
    Self {
      manifest: BlockManifest::new("ObjectDetectionModel")
        .batch_oriented()
        .property(PropertySpec::batch("image", [Kind::IMAGE]))
        .property(PropertySpec::config("model_id").optional())
        .property(PropertySpec::config("class_filter").optional())
        .output(OutputSpec::new(
          "predictions",
          [Kind::OBJECT_DETECTION_PREDICTION],
        )),
    }
  }
}

#[async_trait]
impl Block for ObjectDetectionModel {
  fn manifest(&self) -> &BlockManifest {
    &self.manifest
  }

  async fn execute(&self, _ctx: &StepContext, input: BlockInput) -> Result<StepOutput, BlockError> {
    let image = input.require("image")?;
    let found = image
      .get("detections")
      .or_else(|| image.get("detection").and_then(|d| d.get("detections")))
      .and_then(Value::as_array)
      .cloned()
      .unwrap_or_default();

    let predictions: Vec<Value> = match input.get("class_filter").and_then(Value::as_array) {
      Some(classes) => found
        .into_iter()
        .filter(|d| d.get("class").is_some_and(|c| classes.contains(c)))
        .collect(),
      None => found,
    };
    Ok(values("predictions", Value::Array(predictions)))
  }
}

pub struct ClassificationModel {
  manifest: BlockManifest,
}

impl ClassificationModel {
  pub fn new() -> Self {
    Self {
      manifest: BlockManifest::new("ClassificationModel")
        .batch_oriented()
        .property(PropertySpec::batch("image", [Kind::IMAGE]))
        .property(PropertySpec::config("model_id").optional())
        .output(OutputSpec::new(
          "predictions",
          [Kind::CLASSIFICATION_PREDICTION],
        )),
    }
  }
}

#[async_trait]
impl Block for ClassificationModel {
  fn manifest(&self) -> &BlockManifest {
    &self.manifest
  }

  async fn execute(&self, _ctx: &StepContext, input: BlockInput) -> Result<StepOutput, BlockError> {
    let image = input.require("image")?;
    Ok(values(
      "predictions",
      json!({"top": "beagle", "parent_id": image.get("parent_id").cloned().unwrap_or(Value::Null)}),
    ))
  }
}

/// Tracks how many `Sleep` steps run at the same time.
#[derive(Default)]
pub struct Gauge {
  current: AtomicUsize,
  peak: AtomicUsize,
  runs: AtomicUsize,
}

impl Gauge {
  pub fn peak(&self) -> usize {
    self.peak.load(Ordering::SeqCst)
  }

  pub fn runs(&self) -> usize {
    self.runs.load(Ordering::SeqCst)
  }
}

/// Sleeps for `millis`, then echoes `value`.
pub struct Sleep {
  manifest: BlockManifest,
  gauge: Arc<Gauge>,
}

impl Sleep {
  pub fn new(gauge: Arc<Gauge>) -> Self {
    Self {
      manifest: BlockManifest::new("Sleep")
        .property(PropertySpec::data("value", [Kind::WILDCARD]))
        .property(PropertySpec::config("millis").with_default(json!(20)))
        .output(OutputSpec::new("value", [Kind::WILDCARD])),
      gauge,
    }
  }
}

#[async_trait]
impl Block for Sleep {
  fn manifest(&self) -> &BlockManifest {
    &self.manifest
  }

  async fn execute(&self, _ctx: &StepContext, input: BlockInput) -> Result<StepOutput, BlockError> {
    let millis = input.get("millis").and_then(Value::as_u64).unwrap_or(20);
    let now = self.gauge.current.fetch_add(1, Ordering::SeqCst) + 1;
    self.gauge.peak.fetch_max(now, Ordering::SeqCst);
    self.gauge.runs.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(millis)).await;
    self.gauge.current.fetch_sub(1, Ordering::SeqCst);
    Ok(values(
      "value",
      input.get("value").cloned().unwrap_or(Value::Null),
    ))
  }
}

/// Always fails with a backend error.
pub struct Fail {
  manifest: BlockManifest,
}

impl Fail {
  pub fn new() -> Self {
    Self {
      manifest: BlockManifest::new("Fail")
        .property(PropertySpec::data("value", [Kind::WILDCARD]))
        .output(OutputSpec::new("value", [Kind::WILDCARD])),
    }
  }
}

#[async_trait]
impl Block for Fail {
  fn manifest(&self) -> &BlockManifest {
    &self.manifest
  }

  async fn execute(&self, _ctx: &StepContext, _input: BlockInput) -> Result<StepOutput, BlockError> {
    Err(BlockError::Backend {
      message: "model server unavailable".to_string(),
    })
  }
}

/// Raises a flag when executed.
pub struct Probe {
  manifest: BlockManifest,
  executed: Arc<AtomicBool>,
}

impl Probe {
  pub fn new(executed: Arc<AtomicBool>) -> Self {
    Self {
      manifest: BlockManifest::new("Probe")
        .property(PropertySpec::data("value", [Kind::WILDCARD]))
        .output(OutputSpec::new("value", [Kind::WILDCARD])),
      executed,
    }
  }
}

#[async_trait]
impl Block for Probe {
  fn manifest(&self) -> &BlockManifest {
    &self.manifest
  }

  async fn execute(&self, _ctx: &StepContext, input: BlockInput) -> Result<StepOutput, BlockError> {
    self.executed.store(true, Ordering::SeqCst);
    Ok(values(
      "value",
      input.get("value").cloned().unwrap_or(Value::Null),
    ))
  }
}

/// Built-in blocks plus the model stubs.
pub fn create_registry() -> BlockRegistry {
  let mut registry = retina_blocks::builtin_registry().unwrap();
  registry
    .register(Arc::new(ObjectDetectionModel::new()))
    .unwrap();
  registry
    .register(Arc::new(ClassificationModel::new()))
    .unwrap();
  registry
}

pub fn detection(id: &str, class: &str, x: u32, y: u32, size: u32) -> Value {
  json!({
    "x": x,
    "y": y,
    "width": size,
    "height": size,
    "confidence": 0.9,
    "class": class,
    "class_id": 0,
    "detection_id": id,
  })
}

pub fn image(id: &str, detections: Vec<Value>) -> Value {
  json!({
    "width": 1000,
    "height": 1000,
    "parent_id": id,
    "detections": detections,
  })
}

pub fn params(entries: Vec<(&str, Value)>) -> RuntimeParameters {
  entries
    .into_iter()
    .map(|(name, value)| (name.to_string(), value))
    .collect::<HashMap<_, _>>()
}
