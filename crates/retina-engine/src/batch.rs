//! Batch indices and nesting structure.

use std::collections::HashMap;

/// Position of an element: one entry per nesting level, outermost first.
pub type Index = Vec<usize>;

/// Leading `dimensionality` positions of an index.
pub(crate) fn prefix(index: &[usize], dimensionality: usize) -> &[usize] {
  &index[..dimensionality.min(index.len())]
}

/// Child counts per parent index, per nesting level.
///
/// A level is identified by the lineage leading to it, so two nested batches
/// created by different steps never share counts.
#[derive(Debug, Default)]
pub(crate) struct BatchStructure {
  levels: HashMap<Vec<String>, HashMap<Index, usize>>,
}

impl BatchStructure {
  /// Record how many children `parent` has at the level named by `lineage`.
  ///
  /// Registering the same count twice is fine; a different count is an error.
  pub fn register(&mut self, lineage: &[String], parent: &[usize], count: usize) -> Result<(), String> {
    let level = self.levels.entry(lineage.to_vec()).or_default();
    match level.get(parent) {
      Some(existing) if *existing != count => Err(format!(
        "element {parent:?} already has {existing} children at this level, got {count}"
      )),
      Some(_) => Ok(()),
      None => {
        level.insert(parent.to_vec(), count);
        Ok(())
      }
    }
  }

  pub fn children(&self, lineage: &[String], parent: &[usize]) -> Option<usize> {
    self.levels.get(lineage)?.get(parent).copied()
  }

  /// Every index at depth `lineage.len()`, in lexicographic order.
  pub fn indices(&self, lineage: &[String]) -> Vec<Index> {
    let mut frontier: Vec<Index> = vec![Vec::new()];
    for depth in 1..=lineage.len() {
      let level = &lineage[..depth];
      let mut next = Vec::new();
      for parent in frontier {
        let count = self.children(level, &parent).unwrap_or(0);
        for position in 0..count {
          let mut child = parent.clone();
          child.push(position);
          next.push(child);
        }
      }
      frontier = next;
    }
    frontier
  }
}
