use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::kind::Kind;

/// How a block changes the dimensionality of the data it consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DimensionalityTransform {
  /// Output has the same dimensionality as the input.
  #[default]
  Identity,
  /// Every input element fans out into a nested batch (e.g. crops per detection).
  Increment,
  /// Each nested batch is folded into one value per parent element.
  Decrement,
}

impl DimensionalityTransform {
  pub fn offset(&self) -> isize {
    match self {
      DimensionalityTransform::Identity => 0,
      DimensionalityTransform::Increment => 1,
      DimensionalityTransform::Decrement => -1,
    }
  }
}

/// What a property is allowed to hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PropertyKind {
  /// A literal or a selector to data of one of the given kinds.
  Data { kinds: Vec<Kind>, batch: bool },
  /// An object whose values are each a literal or a selector.
  DataMap { kinds: Vec<Kind>, batch: bool },
  /// One or more `$steps.<name>` references to steps governed by this block.
  StepTargets,
  /// A literal only; selectors are rejected.
  Config,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySpec {
  pub name: String,
  pub kind: PropertyKind,
  pub required: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub default: Option<Value>,
}

impl PropertySpec {
  /// A data property accepting non-batch values of the given kinds.
  pub fn data(name: &str, kinds: impl IntoIterator<Item = Kind>) -> Self {
    Self {
      name: name.to_string(),
      kind: PropertyKind::Data {
        kinds: kinds.into_iter().collect(),
        batch: false,
      },
      required: true,
      default: None,
    }
  }

  /// A data property that accepts batch-oriented values.
  pub fn batch(name: &str, kinds: impl IntoIterator<Item = Kind>) -> Self {
    Self {
      name: name.to_string(),
      kind: PropertyKind::Data {
        kinds: kinds.into_iter().collect(),
        batch: true,
      },
      required: true,
      default: None,
    }
  }

  /// A map of named values, each of which may be batch-oriented.
  pub fn data_map(name: &str, kinds: impl IntoIterator<Item = Kind>) -> Self {
    Self {
      name: name.to_string(),
      kind: PropertyKind::DataMap {
        kinds: kinds.into_iter().collect(),
        batch: true,
      },
      required: true,
      default: None,
    }
  }

  pub fn step_targets(name: &str) -> Self {
    Self {
      name: name.to_string(),
      kind: PropertyKind::StepTargets,
      required: true,
      default: None,
    }
  }

  pub fn config(name: &str) -> Self {
    Self {
      name: name.to_string(),
      kind: PropertyKind::Config,
      required: true,
      default: None,
    }
  }

  /// Make the property optional with the given default.
  pub fn with_default(mut self, default: Value) -> Self {
    self.required = false;
    self.default = Some(default);
    self
  }

  /// Make the property optional without a default.
  pub fn optional(mut self) -> Self {
    self.required = false;
    self
  }

  pub fn accepts_batch(&self) -> bool {
    matches!(
      self.kind,
      PropertyKind::Data { batch: true, .. } | PropertyKind::DataMap { batch: true, .. }
    )
  }

  /// Kinds accepted by a data property. Empty for non-data properties.
  pub fn accepted_kinds(&self) -> &[Kind] {
    match &self.kind {
      PropertyKind::Data { kinds, .. } | PropertyKind::DataMap { kinds, .. } => kinds,
      PropertyKind::StepTargets | PropertyKind::Config => &[],
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSpec {
  pub name: String,
  pub kinds: Vec<Kind>,
}

impl OutputSpec {
  pub fn new(name: &str, kinds: impl IntoIterator<Item = Kind>) -> Self {
    Self {
      name: name.to_string(),
      kinds: kinds.into_iter().collect(),
    }
  }
}

/// The declared contract of a block type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockManifest {
  /// Type name used in definitions, e.g. "Crop".
  pub block_type: String,
  #[serde(default)]
  pub description: String,
  pub properties: Vec<PropertySpec>,
  pub outputs: Vec<OutputSpec>,
  /// The block receives whole batches in one call.
  pub accepts_batch_input: bool,
  /// Missing upstream values are passed as null instead of skipping the element.
  pub accepts_empty_values: bool,
  /// The block emits flow-control decisions instead of data.
  pub flow_control: bool,
  pub dimensionality: DimensionalityTransform,
  /// Init parameters the block needs, e.g. "workflows_core.api_key".
  #[serde(default)]
  pub init_parameters: Vec<String>,
}

impl BlockManifest {
  pub fn new(block_type: &str) -> Self {
    Self {
      block_type: block_type.to_string(),
      description: String::new(),
      properties: Vec::new(),
      outputs: Vec::new(),
      accepts_batch_input: false,
      accepts_empty_values: false,
      flow_control: false,
      dimensionality: DimensionalityTransform::Identity,
      init_parameters: Vec::new(),
    }
  }

  pub fn describe(mut self, description: &str) -> Self {
    self.description = description.to_string();
    self
  }

  pub fn property(mut self, property: PropertySpec) -> Self {
    self.properties.push(property);
    self
  }

  pub fn output(mut self, output: OutputSpec) -> Self {
    self.outputs.push(output);
    self
  }

  pub fn batch_oriented(mut self) -> Self {
    self.accepts_batch_input = true;
    self
  }

  pub fn accepting_empty_values(mut self) -> Self {
    self.accepts_empty_values = true;
    self
  }

  pub fn flow_control(mut self) -> Self {
    self.flow_control = true;
    self
  }

  pub fn transform(mut self, transform: DimensionalityTransform) -> Self {
    self.dimensionality = transform;
    self
  }

  pub fn init_parameter(mut self, name: &str) -> Self {
    self.init_parameters.push(name.to_string());
    self
  }

  pub fn find_property(&self, name: &str) -> Option<&PropertySpec> {
    self.properties.iter().find(|p| p.name == name)
  }

  pub fn find_output(&self, name: &str) -> Option<&OutputSpec> {
    self.outputs.iter().find(|o| o.name == name)
  }
}
