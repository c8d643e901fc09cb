use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Dimensionality assumed for a batch input that does not declare one.
pub const DEFAULT_BATCH_DIMENSIONALITY: usize = 1;

fn default_dimensionality() -> usize {
  DEFAULT_BATCH_DIMENSIONALITY
}

/// A declared workflow input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InputDef {
  /// A batch of images, one per top-level element.
  WorkflowImage { name: String },
  /// A scalar value shared by every element of the batch.
  WorkflowParameter {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    kind: Vec<String>,
  },
  /// Batch-oriented data of arbitrary nesting depth.
  WorkflowBatchInput {
    name: String,
    #[serde(default = "default_dimensionality")]
    dimensionality: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    kind: Vec<String>,
  },
}

impl InputDef {
  pub fn name(&self) -> &str {
    match self {
      InputDef::WorkflowImage { name }
      | InputDef::WorkflowParameter { name, .. }
      | InputDef::WorkflowBatchInput { name, .. } => name,
    }
  }

  /// Number of nesting levels the runtime value carries.
  pub fn dimensionality(&self) -> usize {
    match self {
      InputDef::WorkflowImage { .. } => 1,
      InputDef::WorkflowParameter { .. } => 0,
      InputDef::WorkflowBatchInput { dimensionality, .. } => *dimensionality,
    }
  }

  pub fn is_batch(&self) -> bool {
    self.dimensionality() > 0
  }

  /// Declared kind names. Empty means "any".
  pub fn kinds(&self) -> Vec<String> {
    match self {
      InputDef::WorkflowImage { .. } => vec!["image".to_string()],
      InputDef::WorkflowParameter { kind, .. } | InputDef::WorkflowBatchInput { kind, .. } => {
        kind.clone()
      }
    }
  }

  pub fn default_value(&self) -> Option<&Value> {
    match self {
      InputDef::WorkflowParameter { default_value, .. } => default_value.as_ref(),
      _ => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_batch_input_defaults_to_one_level() {
    let input: InputDef =
      serde_json::from_value(json!({"type": "WorkflowBatchInput", "name": "data"})).unwrap();
    assert_eq!(input.dimensionality(), 1);
    assert!(input.is_batch());
  }

  #[test]
  fn test_parameter_is_scalar() {
    let input: InputDef = serde_json::from_value(
      json!({"type": "WorkflowParameter", "name": "classes", "default_value": ["dog"]}),
    )
    .unwrap();
    assert_eq!(input.dimensionality(), 0);
    assert_eq!(input.default_value(), Some(&json!(["dog"])));
    assert!(input.kinds().is_empty());
  }

  #[test]
  fn test_unknown_input_type_is_rejected() {
    let result: Result<InputDef, _> =
      serde_json::from_value(json!({"type": "WorkflowVideo", "name": "video"}));
    assert!(result.is_err());
  }
}
