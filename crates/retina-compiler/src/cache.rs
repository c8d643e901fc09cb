//! Plan caching.
//!
//! Compiling is pure for a given definition, init parameters and registry,
//! so plans are compiled once and shared. A cache is bound to the registry it
//! was first used with; use one cache per registry.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use tracing::debug;

use retina_block_registry::{BlockRegistry, InitParameters};
use retina_config::WorkflowDefinition;
use retina_workflow::CompilationError;

use crate::compiler::compile;
use crate::plan::ExecutionPlan;

/// Cache key for compiled plans: the canonical definition JSON and the init
/// parameters serialized with sorted keys.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct PlanKey {
  pub definition: String,
  pub init_parameters: String,
}

impl PlanKey {
  pub fn new(
    definition: &WorkflowDefinition,
    init_parameters: &InitParameters,
  ) -> Result<Self, CompilationError> {
    let serialize = |e: serde_json::Error| CompilationError::InvalidDefinition {
      message: format!("definition cannot be serialized: {e}"),
    };
    let sorted: BTreeMap<&String, &serde_json::Value> = init_parameters.iter().collect();
    Ok(Self {
      definition: serde_json::to_string(definition).map_err(serialize)?,
      init_parameters: serde_json::to_string(&sorted).map_err(serialize)?,
    })
  }
}

/// Caches compiled plans by definition and init parameters.
pub struct PlanCache {
  cache: RwLock<HashMap<PlanKey, Arc<ExecutionPlan>>>,
}

impl PlanCache {
  pub fn new() -> Self {
    Self {
      cache: RwLock::new(HashMap::new()),
    }
  }

  /// Get a compiled plan from cache, or compile and cache it.
  pub fn get_or_compile(
    &self,
    definition: &WorkflowDefinition,
    init_parameters: &InitParameters,
    registry: &BlockRegistry,
  ) -> Result<Arc<ExecutionPlan>, CompilationError> {
    let key = PlanKey::new(definition, init_parameters)?;

    // Try read lock first
    {
      let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
      if let Some(plan) = cache.get(&key) {
        debug!(steps = plan.steps.len(), "plan_cache_hit");
        return Ok(plan.clone());
      }
    }

    let plan = Arc::new(compile(definition, init_parameters, registry)?);

    {
      let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
      cache.insert(key, plan.clone());
    }

    Ok(plan)
  }

  pub fn len(&self) -> usize {
    self.cache.read().unwrap_or_else(|e| e.into_inner()).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Clear the cache.
  pub fn clear(&self) {
    let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
    cache.clear();
  }
}

impl Default for PlanCache {
  fn default() -> Self {
    Self::new()
  }
}
