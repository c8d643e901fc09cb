use std::fmt;

use serde::{Deserialize, Serialize};

pub const INPUT_NODE: &str = "INPUT_NODE";
pub const STEP_NODE: &str = "STEP_NODE";
pub const OUTPUT_NODE: &str = "OUTPUT_NODE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
  Input,
  Step,
  Output,
}

impl NodeKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      NodeKind::Input => INPUT_NODE,
      NodeKind::Step => STEP_NODE,
      NodeKind::Output => OUTPUT_NODE,
    }
  }
}

/// Identity of a node in the execution graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeId {
  Input(String),
  Step(String),
  Output(String),
}

impl NodeId {
  pub fn kind(&self) -> NodeKind {
    match self {
      NodeId::Input(_) => NodeKind::Input,
      NodeId::Step(_) => NodeKind::Step,
      NodeId::Output(_) => NodeKind::Output,
    }
  }

  pub fn name(&self) -> &str {
    match self {
      NodeId::Input(name) | NodeId::Step(name) | NodeId::Output(name) => name,
    }
  }

  pub fn step_name(&self) -> Option<&str> {
    match self {
      NodeId::Step(name) => Some(name),
      _ => None,
    }
  }
}

impl fmt::Display for NodeId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      NodeId::Input(name) => write!(f, "$inputs.{name}"),
      NodeId::Step(name) => write!(f, "$steps.{name}"),
      NodeId::Output(name) => write!(f, "$outputs.{name}"),
    }
  }
}
