use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::input::InputDef;
use crate::output::OutputDef;
use crate::step::StepDef;

/// Major version of the definition format understood by this engine.
pub const SUPPORTED_VERSION_MAJOR: &str = "1";

/// A complete workflow document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
  pub version: String,
  #[serde(default)]
  pub inputs: Vec<InputDef>,
  #[serde(default)]
  pub steps: Vec<StepDef>,
  #[serde(default)]
  pub outputs: Vec<OutputDef>,
}

impl WorkflowDefinition {
  /// Parse a definition from a JSON value.
  pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
    serde_json::from_value(value)
  }

  /// Parse a definition from a JSON string.
  pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
    serde_json::from_str(json)
  }

  /// Whether the declared version belongs to the supported major line ("1", "1.0", "1.2.3").
  pub fn is_supported_version(&self) -> bool {
    self
      .version
      .split('.')
      .next()
      .is_some_and(|major| major == SUPPORTED_VERSION_MAJOR)
  }

  pub fn input(&self, name: &str) -> Option<&InputDef> {
    self.inputs.iter().find(|input| input.name() == name)
  }

  pub fn step(&self, name: &str) -> Option<&StepDef> {
    self.steps.iter().find(|step| step.name == name)
  }
}
