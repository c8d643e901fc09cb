use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::CompilationError;
use crate::node::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
  /// Data flows from the source into the target.
  Data,
  /// The source decides whether the target runs.
  Control,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
  pub from: NodeId,
  pub to: NodeId,
  pub kind: EdgeKind,
}

/// Directed graph over inputs, steps and outputs.
///
/// Nodes keep their insertion order; traversal helpers use it to break ties
/// so the same definition always yields the same order.
#[derive(Debug, Clone)]
pub struct ExecutionGraph {
  nodes: Vec<NodeId>,
  positions: HashMap<NodeId, usize>,
  edges: Vec<Edge>,
  /// Adjacency list: node -> list of (downstream node, edge kind).
  adjacency: HashMap<NodeId, Vec<(NodeId, EdgeKind)>>,
  /// Reverse adjacency: node -> list of (upstream node, edge kind).
  reverse_adjacency: HashMap<NodeId, Vec<(NodeId, EdgeKind)>>,
}

impl ExecutionGraph {
  /// Build a graph from nodes and edges.
  ///
  /// Duplicate edges are collapsed; an edge touching an undeclared node is an error.
  pub fn new(nodes: Vec<NodeId>, edges: Vec<Edge>) -> Result<Self, CompilationError> {
    let mut positions = HashMap::with_capacity(nodes.len());
    let mut adjacency: HashMap<NodeId, Vec<(NodeId, EdgeKind)>> = HashMap::new();
    let mut reverse_adjacency: HashMap<NodeId, Vec<(NodeId, EdgeKind)>> = HashMap::new();

    for (position, node) in nodes.iter().enumerate() {
      if positions.insert(node.clone(), position).is_some() {
        return Err(CompilationError::DuplicateName {
          kind: node.kind().as_str().to_string(),
          name: node.name().to_string(),
        });
      }
      adjacency.entry(node.clone()).or_default();
      reverse_adjacency.entry(node.clone()).or_default();
    }

    let mut unique_edges: Vec<Edge> = Vec::with_capacity(edges.len());
    for edge in edges {
      for endpoint in [&edge.from, &edge.to] {
        if !positions.contains_key(endpoint) {
          return Err(CompilationError::ExecutionGraphStructure {
            message: format!(
              "edge {} -> {} references unknown node {}",
              edge.from, edge.to, endpoint
            ),
          });
        }
      }
      if unique_edges.contains(&edge) {
        continue;
      }
      adjacency
        .entry(edge.from.clone())
        .or_default()
        .push((edge.to.clone(), edge.kind));
      reverse_adjacency
        .entry(edge.to.clone())
        .or_default()
        .push((edge.from.clone(), edge.kind));
      unique_edges.push(edge);
    }

    Ok(Self {
      nodes,
      positions,
      edges: unique_edges,
      adjacency,
      reverse_adjacency,
    })
  }

  pub fn nodes(&self) -> &[NodeId] {
    &self.nodes
  }

  pub fn edges(&self) -> &[Edge] {
    &self.edges
  }

  pub fn contains(&self, node: &NodeId) -> bool {
    self.positions.contains_key(node)
  }

  /// Get downstream nodes for a given node.
  pub fn downstream(&self, node: &NodeId) -> &[(NodeId, EdgeKind)] {
    self
      .adjacency
      .get(node)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Get upstream nodes for a given node.
  pub fn upstream(&self, node: &NodeId) -> &[(NodeId, EdgeKind)] {
    self
      .reverse_adjacency
      .get(node)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Nodes with no incoming edges, in insertion order.
  pub fn entry_points(&self) -> Vec<&NodeId> {
    self
      .nodes
      .iter()
      .filter(|node| self.upstream(node).is_empty())
      .collect()
  }

  /// Topological order (Kahn), ties broken by insertion order.
  pub fn topological_order(&self) -> Result<Vec<NodeId>, CompilationError> {
    let mut in_degree: HashMap<&NodeId, usize> = self
      .nodes
      .iter()
      .map(|node| (node, self.upstream(node).len()))
      .collect();

    let mut ready: BinaryHeap<Reverse<usize>> = self
      .nodes
      .iter()
      .filter(|node| in_degree.get(node).copied() == Some(0))
      .map(|node| Reverse(self.positions[node]))
      .collect();

    let mut order = Vec::with_capacity(self.nodes.len());
    while let Some(Reverse(position)) = ready.pop() {
      let node = &self.nodes[position];
      order.push(node.clone());
      for (next, _) in self.downstream(node) {
        if let Some(degree) = in_degree.get_mut(next) {
          *degree -= 1;
          if *degree == 0 {
            ready.push(Reverse(self.positions[next]));
          }
        }
      }
    }

    if order.len() != self.nodes.len() {
      let stuck = self
        .nodes
        .iter()
        .find(|node| in_degree.get(node).is_some_and(|d| *d > 0))
        .map(|node| node.to_string())
        .unwrap_or_default();
      return Err(CompilationError::ExecutionGraphStructure {
        message: format!("cycle detected involving {stuck}"),
      });
    }

    Ok(order)
  }
}
