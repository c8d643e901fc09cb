use thiserror::Error;

/// Errors raised while turning a definition into an execution plan.
///
/// Messages that concern a reference always carry the offending selector
/// verbatim so callers can point users at the exact string they wrote.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompilationError {
  #[error("invalid definition: {message}")]
  InvalidDefinition { message: String },

  #[error("unsupported workflow definition version '{version}'")]
  UnsupportedVersion { version: String },

  #[error("duplicate {kind} name '{name}'")]
  DuplicateName { kind: String, name: String },

  #[error("step '{step_name}' uses unknown block type '{block_type}'")]
  UnknownBlockType {
    step_name: String,
    block_type: String,
  },

  #[error("invalid property '{property}' of step '{step_name}': {message}")]
  InvalidStepProperty {
    step_name: String,
    property: String,
    message: String,
  },

  #[error("invalid reference target '{selector}': {message}")]
  InvalidReferenceTarget { selector: String, message: String },

  #[error("reference '{selector}' has incompatible kind: {message}")]
  ReferenceType { selector: String, message: String },

  #[error("invalid execution graph structure: {message}")]
  ExecutionGraphStructure { message: String },

  #[error("dimensionality conflict in step '{step_name}': {message}")]
  DimensionalityConflict { step_name: String, message: String },

  #[error("step '{step_name}' requires init parameter '{parameter}'")]
  MissingInitParameter { step_name: String, parameter: String },
}
