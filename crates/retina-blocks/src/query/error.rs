use retina_block_registry::BlockError;
use thiserror::Error;

use crate::data::DataError;

/// Errors raised while evaluating statements and operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
  #[error("operand '{name}' is not provided")]
  UnknownOperand { name: String },

  #[error("{context} expects {expected}, found {found}")]
  TypeMismatch {
    context: &'static str,
    expected: &'static str,
    found: &'static str,
  },

  #[error("cannot convert '{value}' to {target}")]
  Conversion { value: String, target: &'static str },

  #[error("division by zero")]
  DivisionByZero,

  #[error(transparent)]
  Data(#[from] DataError),
}

impl From<QueryError> for BlockError {
  fn from(e: QueryError) -> Self {
    BlockError::Evaluation {
      message: e.to_string(),
    }
  }
}
