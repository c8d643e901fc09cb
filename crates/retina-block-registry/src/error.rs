use thiserror::Error;

/// Errors a block reports while executing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BlockError {
  /// The block received input it cannot work with.
  #[error("invalid input '{field}': {message}")]
  InvalidInput { field: String, message: String },

  /// A statement or operation could not be evaluated.
  #[error("evaluation failed: {message}")]
  Evaluation { message: String },

  /// A model or external backend failed.
  #[error("backend failure: {message}")]
  Backend { message: String },
}

/// Errors that can occur when working with the block registry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
  /// Block type already registered.
  #[error("block type already registered: {block_type}")]
  AlreadyRegistered { block_type: String },

  /// Block type not found in the registry.
  #[error("block type not found: {block_type}")]
  NotFound { block_type: String },
}
