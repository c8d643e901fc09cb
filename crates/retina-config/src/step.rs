use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A step declaration: block type, unique name, and raw properties.
///
/// Property values stay untyped here. Whether a string is a selector, a
/// literal, or a list of step references is decided against the block's
/// manifest during resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDef {
  #[serde(rename = "type")]
  pub block_type: String,
  pub name: String,
  #[serde(flatten)]
  pub properties: IndexMap<String, Value>,
}
