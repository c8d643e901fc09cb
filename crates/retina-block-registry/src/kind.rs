use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Semantic type tag attached to data in a workflow.
///
/// Kinds are open: blocks may introduce their own by name. The constants
/// below cover the built-in vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Kind(Cow<'static, str>);

impl Kind {
  pub const WILDCARD: Kind = Kind(Cow::Borrowed("*"));
  pub const IMAGE: Kind = Kind(Cow::Borrowed("image"));
  pub const OBJECT_DETECTION_PREDICTION: Kind = Kind(Cow::Borrowed("object_detection_prediction"));
  pub const CLASSIFICATION_PREDICTION: Kind = Kind(Cow::Borrowed("classification_prediction"));
  pub const BOOLEAN: Kind = Kind(Cow::Borrowed("boolean"));
  pub const INTEGER: Kind = Kind(Cow::Borrowed("integer"));
  pub const FLOAT: Kind = Kind(Cow::Borrowed("float"));
  pub const STRING: Kind = Kind(Cow::Borrowed("string"));
  pub const LIST_OF_VALUES: Kind = Kind(Cow::Borrowed("list_of_values"));
  pub const DICTIONARY: Kind = Kind(Cow::Borrowed("dictionary"));

  pub fn new(name: impl Into<String>) -> Self {
    Kind(Cow::Owned(name.into()))
  }

  pub fn name(&self) -> &str {
    &self.0
  }

  pub fn is_wildcard(&self) -> bool {
    self.0 == "*"
  }

  /// Whether data declared with `produced` kinds may flow into a slot accepting `accepted`.
  ///
  /// An empty list or a wildcard on either side accepts anything; otherwise
  /// the two sets must share at least one kind.
  pub fn compatible(produced: &[Kind], accepted: &[Kind]) -> bool {
    let open = |kinds: &[Kind]| kinds.is_empty() || kinds.iter().any(Kind::is_wildcard);
    if open(produced) || open(accepted) {
      return true;
    }
    produced.iter().any(|kind| accepted.contains(kind))
  }
}

impl fmt::Display for Kind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for Kind {
  fn from(name: &str) -> Self {
    Kind::new(name)
  }
}
