//! Execution branches created by flow-control steps.
//!
//! Branches form a tree rooted at `Branch[root]`. When a flow-control step
//! `G` finishes, it opens one branch `Branch[G -> T]` per target `T`, masking
//! the batch indices at `G`'s dimensionality for which `T` was selected. A
//! branch whose mask is empty is exhausted; once its target has been
//! dispatched or skipped it is closed.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, info};

use retina_workflow::ROOT_BRANCH_NAME;

use crate::batch::{Index, prefix};

pub(crate) type BranchId = usize;

pub(crate) const ROOT_BRANCH: BranchId = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BranchState {
  Active,
  Exhausted,
  Closed,
}

#[derive(Debug)]
pub(crate) struct Branch {
  pub name: String,
  pub parent: Option<BranchId>,
  pub dimensionality: usize,
  /// `None` admits every index.
  mask: Option<BTreeSet<Index>>,
  pub state: BranchState,
}

impl Branch {
  /// Whether an element belongs to this branch.
  ///
  /// Indices shallower than the branch's dimensionality cannot be decided
  /// here and are admitted; their children are checked individually.
  pub fn admits(&self, index: &[usize]) -> bool {
    match &self.mask {
      None => true,
      Some(_) if index.len() < self.dimensionality => true,
      Some(mask) => mask.contains(prefix(index, self.dimensionality)),
    }
  }

  pub fn is_exhausted(&self) -> bool {
    match &self.mask {
      None => false,
      Some(mask) => mask.is_empty(),
    }
  }
}

#[derive(Debug)]
pub(crate) struct BranchManager {
  execution_id: String,
  branches: Vec<Branch>,
  /// (flow-control step, target step) -> branch
  by_edge: HashMap<(String, String), BranchId>,
}

impl BranchManager {
  pub fn new(execution_id: &str) -> Self {
    Self {
      execution_id: execution_id.to_string(),
      branches: vec![Branch {
        name: ROOT_BRANCH_NAME.to_string(),
        parent: None,
        dimensionality: 0,
        mask: None,
        state: BranchState::Active,
      }],
      by_edge: HashMap::new(),
    }
  }

  pub fn branch(&self, id: BranchId) -> &Branch {
    &self.branches[id]
  }

  /// Branches governing a step, one per flow-control step that targets it.
  ///
  /// Governors that have not decided yet contribute nothing; the scheduler
  /// only asks once they have all completed.
  pub fn governing(&self, step: &str, governed_by: &[String]) -> Vec<BranchId> {
    governed_by
      .iter()
      .filter_map(|governor| {
        self
          .by_edge
          .get(&(governor.clone(), step.to_string()))
          .copied()
      })
      .collect()
  }

  /// Whether an element is admitted by every governing branch.
  pub fn admits(&self, governing: &[BranchId], index: &[usize]) -> bool {
    governing.iter().all(|id| self.branches[*id].admits(index))
  }

  /// Open one branch per target of a completed (or skipped) flow-control step.
  ///
  /// `decisions` lists, per element index, the targets selected there.
  pub fn open(
    &mut self,
    flow_step: &str,
    flow_step_branches: &[BranchId],
    dimensionality: usize,
    targets: &[String],
    decisions: &[(Index, Vec<String>)],
  ) {
    let parent = flow_step_branches.last().copied().unwrap_or(ROOT_BRANCH);
    for target in targets {
      let mask: BTreeSet<Index> = decisions
        .iter()
        .filter(|(_, selected)| selected.contains(target))
        .map(|(index, _)| index.clone())
        .collect();
      let state = if mask.is_empty() {
        BranchState::Exhausted
      } else {
        BranchState::Active
      };
      let id = self.branches.len();
      let name = format!("Branch[{flow_step} -> {target}]");
      info!(
        execution_id = %self.execution_id,
        branch = %name,
        parent = %self.branches[parent].name,
        selected = mask.len(),
        exhausted = state == BranchState::Exhausted,
        "branch_created"
      );
      self.branches.push(Branch {
        name,
        parent: Some(parent),
        dimensionality,
        mask: Some(mask),
        state,
      });
      self
        .by_edge
        .insert((flow_step.to_string(), target.clone()), id);
    }
  }

  /// Close branches once the step they govern has been dispatched or skipped.
  pub fn close(&mut self, ids: &[BranchId]) {
    for id in ids {
      let branch = &self.branches[*id];
      if branch.state == BranchState::Closed {
        continue;
      }
      let parent = branch
        .parent
        .map(|p| self.branches[p].name.as_str())
        .unwrap_or_default();
      info!(
        execution_id = %self.execution_id,
        branch = %branch.name,
        parent = %parent,
        "branch_closed"
      );
      self.branches[*id].state = BranchState::Closed;
    }
    debug!(
      execution_id = %self.execution_id,
      open = self
        .branches
        .iter()
        .filter(|b| b.state != BranchState::Closed)
        .count(),
      "branches_remaining"
    );
  }
}
