use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CompilationError;
use crate::selector::Selector;

/// A step property once selectors have been recognised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
  Literal(Value),
  Selector(Selector),
  /// Step references of a flow-control property.
  Targets(Vec<Selector>),
  /// A named collection of values, each independently a literal or a selector.
  Map(IndexMap<String, PropertyValue>),
}

impl PropertyValue {
  /// Interpret a raw value as either a selector or a literal.
  ///
  /// Only top-level strings are candidates; selectors nested inside arrays or
  /// objects of a plain data property stay literal.
  pub fn scalar(raw: &Value) -> Result<Self, CompilationError> {
    match raw {
      Value::String(s) if Selector::looks_like_selector(s) => {
        Ok(PropertyValue::Selector(Selector::parse(s)?))
      }
      other => Ok(PropertyValue::Literal(other.clone())),
    }
  }

  /// Interpret a raw object whose values may each be a selector.
  pub fn map(raw: &serde_json::Map<String, Value>) -> Result<Self, CompilationError> {
    let mut entries = IndexMap::with_capacity(raw.len());
    for (key, value) in raw {
      entries.insert(key.clone(), PropertyValue::scalar(value)?);
    }
    Ok(PropertyValue::Map(entries))
  }

  /// Every selector referenced by this value, in declaration order.
  pub fn selectors(&self) -> Vec<&Selector> {
    match self {
      PropertyValue::Literal(_) => Vec::new(),
      PropertyValue::Selector(selector) => vec![selector],
      PropertyValue::Targets(targets) => targets.iter().collect(),
      PropertyValue::Map(entries) => entries.values().flat_map(|v| v.selectors()).collect(),
    }
  }
}
