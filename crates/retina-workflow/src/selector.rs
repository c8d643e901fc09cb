use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CompilationError;
use crate::node::NodeId;

pub const INPUTS_PREFIX: &str = "$inputs";
pub const STEPS_PREFIX: &str = "$steps";

const WILDCARD_PROPERTY: &str = "*";

/// A reference from a step property or an output to data in the workflow.
///
/// Grammar:
/// - `$inputs.<name>`
/// - `$steps.<name>.<property>`
/// - `$steps.<name>.*` (all outputs of a step)
/// - `$steps.<name>` (the step itself, only valid as a flow-control target)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
  Input { name: String },
  StepOutput { step: String, property: String },
  StepWildcard { step: String },
  StepReference { step: String },
}

impl Selector {
  /// Whether a raw string is meant as a selector.
  ///
  /// Anything starting with `$` is; malformed ones are rejected by [`Selector::parse`]
  /// rather than silently treated as literals.
  pub fn looks_like_selector(raw: &str) -> bool {
    raw.starts_with('$')
  }

  pub fn parse(raw: &str) -> Result<Self, CompilationError> {
    let malformed = |message: &str| CompilationError::InvalidReferenceTarget {
      selector: raw.to_string(),
      message: message.to_string(),
    };

    let parts: Vec<&str> = raw.split('.').collect();
    if parts.iter().skip(1).any(|part| !is_valid_segment(part)) {
      return Err(malformed("selector segments must be non-empty names"));
    }

    match parts.as_slice() {
      [INPUTS_PREFIX, name] if *name != WILDCARD_PROPERTY => Ok(Selector::Input {
        name: name.to_string(),
      }),
      [STEPS_PREFIX, step] if *step != WILDCARD_PROPERTY => Ok(Selector::StepReference {
        step: step.to_string(),
      }),
      [STEPS_PREFIX, step, WILDCARD_PROPERTY] if *step != WILDCARD_PROPERTY => {
        Ok(Selector::StepWildcard {
          step: step.to_string(),
        })
      }
      [STEPS_PREFIX, step, property] if *step != WILDCARD_PROPERTY => Ok(Selector::StepOutput {
        step: step.to_string(),
        property: property.to_string(),
      }),
      _ => Err(malformed(
        "expected '$inputs.<name>', '$steps.<name>', '$steps.<name>.<property>' or '$steps.<name>.*'",
      )),
    }
  }

  /// The graph node this selector points at.
  pub fn node(&self) -> NodeId {
    match self {
      Selector::Input { name } => NodeId::Input(name.clone()),
      Selector::StepOutput { step, .. }
      | Selector::StepWildcard { step }
      | Selector::StepReference { step } => NodeId::Step(step.clone()),
    }
  }

  pub fn step_name(&self) -> Option<&str> {
    match self {
      Selector::Input { .. } => None,
      Selector::StepOutput { step, .. }
      | Selector::StepWildcard { step }
      | Selector::StepReference { step } => Some(step),
    }
  }

  /// Whether the selector addresses data (as opposed to a step as a whole).
  pub fn is_data_reference(&self) -> bool {
    !matches!(self, Selector::StepReference { .. })
  }
}

fn is_valid_segment(segment: &str) -> bool {
  !segment.is_empty()
    && segment
      .chars()
      .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '*')
}

impl fmt::Display for Selector {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Selector::Input { name } => write!(f, "{INPUTS_PREFIX}.{name}"),
      Selector::StepOutput { step, property } => write!(f, "{STEPS_PREFIX}.{step}.{property}"),
      Selector::StepWildcard { step } => write!(f, "{STEPS_PREFIX}.{step}.{WILDCARD_PROPERTY}"),
      Selector::StepReference { step } => write!(f, "{STEPS_PREFIX}.{step}"),
    }
  }
}

impl FromStr for Selector {
  type Err = CompilationError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Selector::parse(s)
  }
}

impl Serialize for Selector {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: Serializer,
  {
    serializer.collect_str(self)
  }
}

impl<'de> Deserialize<'de> for Selector {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: Deserializer<'de>,
  {
    let raw = String::deserialize(deserializer)?;
    Selector::parse(&raw).map_err(serde::de::Error::custom)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_input_selector() {
    assert_eq!(
      Selector::parse("$inputs.image").unwrap(),
      Selector::Input {
        name: "image".to_string()
      }
    );
  }

  #[test]
  fn test_parse_step_selectors() {
    assert_eq!(
      Selector::parse("$steps.detection.predictions").unwrap(),
      Selector::StepOutput {
        step: "detection".to_string(),
        property: "predictions".to_string()
      }
    );
    assert_eq!(
      Selector::parse("$steps.detection.*").unwrap(),
      Selector::StepWildcard {
        step: "detection".to_string()
      }
    );
    assert_eq!(
      Selector::parse("$steps.detection").unwrap(),
      Selector::StepReference {
        step: "detection".to_string()
      }
    );
  }

  #[test]
  fn test_malformed_selectors_are_rejected() {
    for raw in [
      "$inputs",
      "$inputs.",
      "$inputs.a.b",
      "$steps",
      "$steps..x",
      "$steps.a.b.c",
      "$outputs.x",
      "$input.image",
      "$steps.*",
    ] {
      let err = Selector::parse(raw).unwrap_err();
      match err {
        CompilationError::InvalidReferenceTarget { selector, .. } => assert_eq!(selector, raw),
        other => panic!("unexpected error for {raw}: {other:?}"),
      }
    }
  }

  #[test]
  fn test_display_is_canonical() {
    for raw in [
      "$inputs.image",
      "$steps.a",
      "$steps.a.*",
      "$steps.a.predictions",
    ] {
      assert_eq!(Selector::parse(raw).unwrap().to_string(), raw);
    }
  }

  #[test]
  fn test_looks_like_selector() {
    assert!(Selector::looks_like_selector("$inputs.x"));
    assert!(Selector::looks_like_selector("$whatever"));
    assert!(!Selector::looks_like_selector("dog"));
  }
}
