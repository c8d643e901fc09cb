use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputType {
  JsonField,
}

/// A named workflow output bound to a selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputDef {
  #[serde(rename = "type", default = "default_output_type")]
  pub output_type: OutputType,
  pub name: String,
  pub selector: String,
}

fn default_output_type() -> OutputType {
  OutputType::JsonField
}
