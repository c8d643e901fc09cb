//! Retina Compiler
//!
//! Compiles a workflow definition into an immutable [`ExecutionPlan`]:
//!
//! 1. resolve the definition against the block registry
//! 2. check required init parameters
//! 3. order steps topologically
//! 4. derive every step's dimensionality and lineage
//! 5. bind every step property to a literal, a workflow input or a step output
//!
//! The plan is plain data; the engine executes it against the blocks from
//! the same registry.

mod cache;
mod compiler;
mod dimensionality;
mod plan;

pub use cache::{PlanCache, PlanKey};
pub use compiler::{compile, compile_value};
pub use plan::{
  CompiledInput, CompiledOutput, CompiledStep, ExecutionPlan, InputBinding, StepDimensionality,
};
