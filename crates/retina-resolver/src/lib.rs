//! Retina Resolver
//!
//! Turns a [`retina_config::WorkflowDefinition`] into a [`ResolvedWorkflow`]:
//! every step is matched to a registered block, every property is interpreted
//! against the block's manifest, every selector is checked to point at
//! something that exists, and the dependency graph is built and checked for
//! cycles.

mod resolved;
mod resolver;

pub use resolved::{ResolvedInput, ResolvedOutput, ResolvedStep, ResolvedWorkflow};
pub use resolver::WorkflowResolver;
