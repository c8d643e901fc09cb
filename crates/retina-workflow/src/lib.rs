//! Retina Workflow
//!
//! Shared building blocks between the resolver, the compiler and the engine:
//!
//! - [`Selector`]: parsed `$inputs.*` / `$steps.*` references
//! - [`PropertyValue`]: a step property after selectors have been recognised
//! - [`ExecutionGraph`]: the dependency graph over inputs, steps and outputs
//! - [`CompilationError`]: every way a definition can be rejected before running

mod error;
mod graph;
mod node;
mod property;
mod selector;

pub use error::CompilationError;
pub use graph::{Edge, EdgeKind, ExecutionGraph};
pub use node::{INPUT_NODE, NodeId, NodeKind, OUTPUT_NODE, STEP_NODE};
pub use property::PropertyValue;
pub use selector::{INPUTS_PREFIX, STEPS_PREFIX, Selector};

/// Lineage marker of data that comes straight from workflow inputs.
pub const WORKFLOW_INPUT_LINEAGE: &str = "<workflow_input>";

/// Name of the implicit branch every execution starts in.
pub const ROOT_BRANCH_NAME: &str = "Branch[root]";
