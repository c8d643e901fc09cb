//! Execution errors.

use retina_block_registry::BlockError;

/// Errors that can occur while running a workflow.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
  /// Runtime parameters do not match the declared inputs.
  #[error("invalid runtime input '{input_name}': {message}")]
  RuntimeInput { input_name: String, message: String },

  /// A block failed.
  #[error("step '{step_name}' failed: {source}")]
  StepExecution {
    step_name: String,
    #[source]
    source: BlockError,
  },

  /// A block returned output that does not fit its contract.
  #[error("step '{step_name}' produced invalid output: {message}")]
  InvalidStepOutput { step_name: String, message: String },

  /// Execution was cancelled.
  #[error("execution cancelled")]
  Cancelled,

  /// A step task panicked or was aborted.
  #[error("step task failed to complete: {message}")]
  Join { message: String },

  /// The blocking runner could not set up its runtime.
  #[error("failed to set up runtime: {message}")]
  RuntimeSetup { message: String },
}
