use std::collections::HashMap;
use std::sync::Arc;

use crate::block::Block;
use crate::error::RegistryError;
use crate::manifest::BlockManifest;

/// Maps block type names to implementations.
#[derive(Clone, Default)]
pub struct BlockRegistry {
  blocks: HashMap<String, Arc<dyn Block>>,
}

impl BlockRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a block under the type name from its manifest.
  pub fn register(&mut self, block: Arc<dyn Block>) -> Result<(), RegistryError> {
    let block_type = block.manifest().block_type.clone();
    if self.blocks.contains_key(&block_type) {
      return Err(RegistryError::AlreadyRegistered { block_type });
    }
    self.blocks.insert(block_type, block);
    Ok(())
  }

  pub fn get(&self, block_type: &str) -> Result<Arc<dyn Block>, RegistryError> {
    self
      .blocks
      .get(block_type)
      .cloned()
      .ok_or_else(|| RegistryError::NotFound {
        block_type: block_type.to_string(),
      })
  }

  pub fn manifest(&self, block_type: &str) -> Option<&BlockManifest> {
    self.blocks.get(block_type).map(|block| block.manifest())
  }

  pub fn contains(&self, block_type: &str) -> bool {
    self.blocks.contains_key(block_type)
  }

  /// Registered type names, sorted.
  pub fn block_types(&self) -> Vec<&str> {
    let mut types: Vec<&str> = self.blocks.keys().map(String::as_str).collect();
    types.sort_unstable();
    types
  }
}

impl std::fmt::Debug for BlockRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("BlockRegistry")
      .field("block_types", &self.block_types())
      .finish()
  }
}
