//! Retina Blocks
//!
//! Built-in blocks and the query language they evaluate.
//!
//! ```text
//! flow control     Condition, ContinueIf, ABTest
//! fan out          Crop                      (+1 dimensionality)
//! fan in           DimensionCollapse         (-1 dimensionality)
//! detections       DetectionsFilter, DetectionsTransformation
//!                        │
//!                        └── query: statements, operands, operations
//! ```
//!
//! Model blocks are not part of this crate; callers register their own
//! implementations next to the built-ins.

mod collapse;
mod crop;
pub mod data;
mod detections;
mod flow_control;
pub mod query;

use std::sync::Arc;

use retina_block_registry::{BlockRegistry, RegistryError};

pub use collapse::DimensionCollapse;
pub use crop::Crop;
pub use detections::{DetectionsFilter, DetectionsTransformation};
pub use flow_control::{ABTest, Condition, ContinueIf};

/// Register every built-in block.
pub fn register_builtins(registry: &mut BlockRegistry) -> Result<(), RegistryError> {
  registry.register(Arc::new(Condition::new()))?;
  registry.register(Arc::new(ContinueIf::new()))?;
  registry.register(Arc::new(ABTest::new()))?;
  registry.register(Arc::new(Crop::new()))?;
  registry.register(Arc::new(DetectionsFilter::new()))?;
  registry.register(Arc::new(DetectionsTransformation::new()))?;
  registry.register(Arc::new(DimensionCollapse::new()))?;
  Ok(())
}

/// A registry holding only the built-in blocks.
pub fn builtin_registry() -> Result<BlockRegistry, RegistryError> {
  let mut registry = BlockRegistry::new();
  register_builtins(&mut registry)?;
  Ok(registry)
}
