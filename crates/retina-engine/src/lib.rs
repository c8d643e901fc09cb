//! Retina Engine
//!
//! Executes compiled workflow plans.
//!
//! # Architecture
//!
//! ```text
//! ExecutionEngine
//! ├── init(definition, init_parameters, registry, config) - compiles and binds blocks
//! ├── run_async(runtime_parameters) -> Vec<outputs per input element>
//! ├── run_async_with_cancel(runtime_parameters, cancel)
//! └── run(runtime_parameters) - blocking wrapper on a private runtime
//!
//! WorkflowExecution
//! └── wait() - dependency-driven scheduling with at most
//!     `max_concurrent_steps` step tasks in flight
//! ```
//!
//! Data is addressed by batch index: a path of positions, one per nesting
//! level. Flow-control steps partition indices into branches; a governed step
//! only runs on the indices its branches selected.
//!
//! # Usage
//!
//! ```ignore
//! use retina_engine::{EngineConfig, ExecutionEngine};
//!
//! let engine = ExecutionEngine::init(&definition, &init_parameters, &registry, EngineConfig::default())?;
//! let results = engine.run_async(runtime_parameters).await?;
//! ```

mod batch;
mod branch;
mod config;
mod engine;
mod error;
mod execution;
mod output;
mod runtime_input;
mod step_input;
mod store;

pub use batch::Index;
pub use config::{DEFAULT_MAX_CONCURRENT_STEPS, EngineConfig, MAX_CONCURRENT_STEPS_ENV};
pub use engine::{ExecutionEngine, RuntimeParameters, WorkflowResult};
pub use error::ExecutionError;
