//! Retina Block Registry
//!
//! A block is a reusable unit of work with a declared contract: which
//! properties it takes, which of them may carry batches or step references,
//! which outputs it produces and how it changes the dimensionality of the
//! data flowing through it.
//!
//! The [`BlockRegistry`] maps block type names to implementations. It is an
//! explicit value handed to the compiler and the engine, so callers can mix
//! the built-in blocks with their own or replace them entirely in tests.

mod block;
mod error;
mod kind;
mod manifest;
mod registry;

pub use block::{Block, BlockInput, FlowDecision, InitParameters, OutputMap, StepContext, StepOutput};
pub use error::{BlockError, RegistryError};
pub use kind::Kind;
pub use manifest::{BlockManifest, DimensionalityTransform, OutputSpec, PropertyKind, PropertySpec};
pub use registry::BlockRegistry;
