//! Retina Config
//!
//! This crate contains the serializable workflow definition types for Retina.
//! These types mirror the JSON document a user writes: declared inputs, steps
//! with their block type and properties, and named outputs. They carry no
//! validation beyond shape; the resolver and compiler turn a definition into
//! an executable plan.
//!
//! Definitions can be loaded from:
//! - JSON files (via CLI with `retina run workflow.json`)
//! - any `serde_json::Value` built in code

mod definition;
mod input;
mod output;
mod step;

pub use definition::{SUPPORTED_VERSION_MAJOR, WorkflowDefinition};
pub use input::{DEFAULT_BATCH_DIMENSIONALITY, InputDef};
pub use output::{OutputDef, OutputType};
pub use step::StepDef;
