//! Parallel fan-out of transformers with a deterministic merge.
//!
//! Every branch sees the same input; outputs are merged in branch order and
//! the later branch wins on a shared key. Such collisions are reported, not
//! silently dropped.

use crate::compose::debug::Pass;
use crate::compose::node::Node;
use crate::config::CollisionPolicy;
use crate::error::{MergeCollision, PipelineError, PipelineResult};
use crate::observation::Observation;
use std::collections::HashMap;
use std::fmt;

/// A set of transformer branches applied to the same observation.
///
/// Only what the branches emit ends up in the output; the input's own fields
/// are not carried through. Add a [`Select`](crate::components::Select)
/// branch to keep fields as they are.
///
/// # Example
/// ```ignore
/// let union = Union::new(vec![
///     Step::new(Select::new(["age"])).into(),
///     Step::new(StandardScaler::new()).into(),
/// ])?;
/// ```
#[derive(Debug)]
pub struct Union {
    name: String,
    custom_name: bool,
    branches: Vec<Node>,
    policy: CollisionPolicy,
    last_collisions: Vec<MergeCollision>,
}

impl Union {
    /// Build a union from its branches.
    ///
    /// # Errors
    /// [`PipelineError::Construction`] if there are no branches or a branch
    /// is not a transformer.
    pub fn new(branches: Vec<Node>) -> PipelineResult<Self> {
        if branches.is_empty() {
            return Err(PipelineError::Construction(
                "a union needs at least one branch".to_string(),
            ));
        }
        let mut union = Self {
            name: String::new(),
            custom_name: false,
            branches: Vec::with_capacity(branches.len()),
            policy: CollisionPolicy::default(),
            last_collisions: Vec::new(),
        };
        for branch in branches {
            union.push(branch)?;
        }
        Ok(union)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self.custom_name = true;
        self
    }

    pub fn with_policy(mut self, policy: CollisionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Append a branch.
    pub fn push(&mut self, branch: impl Into<Node>) -> PipelineResult<()> {
        let branch = self.admit(branch.into())?;
        self.branches.push(branch);
        self.refresh_name();
        Ok(())
    }

    /// Insert a branch ahead of the existing ones.
    pub fn push_front(&mut self, branch: impl Into<Node>) -> PipelineResult<()> {
        let branch = self.admit(branch.into())?;
        self.branches.insert(0, branch);
        self.refresh_name();
        Ok(())
    }

    /// Check a new branch and rename any node in it whose name is already
    /// used anywhere below this union.
    fn admit(&self, mut branch: Node) -> PipelineResult<Node> {
        if !branch.is_transformer() {
            return Err(PipelineError::Construction(format!(
                "union branch '{}' is not a transformer",
                branch.name()
            )));
        }
        let mut taken = Vec::new();
        for existing in &self.branches {
            existing.collect_names(&mut taken);
        }
        branch.claim_names(&mut taken);
        Ok(branch)
    }

    pub(crate) fn refresh_name(&mut self) {
        if !self.custom_name {
            self.name = self
                .branches
                .iter()
                .map(Node::label_part)
                .collect::<Vec<_>>()
                .join(" + ");
        }
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
        self.custom_name = true;
    }

    pub(crate) fn has_custom_name(&self) -> bool {
        self.custom_name
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> CollisionPolicy {
        self.policy
    }

    pub fn branches(&self) -> &[Node] {
        &self.branches
    }

    pub(crate) fn branches_mut(&mut self) -> &mut [Node] {
        &mut self.branches
    }

    pub(crate) fn into_branches(self) -> Vec<Node> {
        self.branches
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    /// Collisions detected by the most recent merge.
    pub fn last_collisions(&self) -> &[MergeCollision] {
        &self.last_collisions
    }

    /// Run every branch on `x` and merge their outputs.
    ///
    /// Branches update their unsupervised state as they run. A failing branch
    /// aborts the union; branches after it do not run.
    pub fn transform(&mut self, x: &Observation) -> PipelineResult<Observation> {
        self.run(x, &mut Pass::new(true), 0)
    }

    pub(crate) fn run(
        &mut self,
        x: &Observation,
        pass: &mut Pass<'_>,
        depth: usize,
    ) -> PipelineResult<Observation> {
        self.last_collisions.clear();
        let branch_names: Vec<String> = self.branches.iter().map(|b| b.name().to_string()).collect();

        let mut merged = Observation::new();
        let mut owners: HashMap<String, usize> = HashMap::new();
        let mut collisions = Vec::new();

        for (position, branch) in self.branches.iter_mut().enumerate() {
            let emitted = branch.run(x, pass, depth + 1, position, false)?;
            for (key, value) in emitted {
                if let Some(previous) = owners.insert(key.clone(), position) {
                    let collision = MergeCollision {
                        union: self.name.clone(),
                        key: key.clone(),
                        overwritten: branch_names[previous].clone(),
                        winner: branch_names[position].clone(),
                    };
                    match self.policy {
                        CollisionPolicy::Reject => {
                            collisions.push(collision.clone());
                            self.last_collisions = collisions;
                            return Err(PipelineError::MergeCollision(collision));
                        }
                        CollisionPolicy::LastWriterWins => {
                            tracing::warn!(
                                union = %self.name,
                                key = %collision.key,
                                overwritten = %collision.overwritten,
                                winner = %collision.winner,
                                "union merge collision"
                            );
                            collisions.push(collision);
                        }
                    }
                }
                merged.insert(key, value);
            }
        }

        self.last_collisions = collisions;
        Ok(merged)
    }
}

impl fmt::Display for Union {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
