//! The recursive node tree: `Step | Union | Pipeline`.

use crate::compose::debug::{Pass, TraceOutcome};
use crate::compose::pipeline::Pipeline;
use crate::compose::step::Step;
use crate::compose::union::Union;
use crate::error::{Operation, PipelineError, PipelineResult};
use crate::observation::{Observation, Value};
use crate::traits::{Capabilities, Component};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which variant a node is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Step,
    Union,
    Pipeline,
}

/// Structural description of one node, for renderers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub name: String,
    pub kind: NodeKind,
    pub depth: usize,
    pub position: usize,
    pub capabilities: Capabilities,
}

/// A node in a pipeline. Parents own their children exclusively.
#[derive(Debug)]
pub enum Node {
    Step(Step),
    Union(Union),
    Pipeline(Pipeline),
}

impl From<Step> for Node {
    fn from(step: Step) -> Self {
        Node::Step(step)
    }
}

impl From<Union> for Node {
    fn from(union: Union) -> Self {
        Node::Union(union)
    }
}

impl From<Pipeline> for Node {
    fn from(pipeline: Pipeline) -> Self {
        Node::Pipeline(pipeline)
    }
}

impl Node {
    pub fn name(&self) -> &str {
        match self {
            Node::Step(s) => s.name(),
            Node::Union(u) => u.name(),
            Node::Pipeline(p) => p.name(),
        }
    }

    pub(crate) fn set_name(&mut self, name: String) {
        match self {
            Node::Step(s) => s.set_name(name),
            Node::Union(u) => u.set_name(name),
            Node::Pipeline(p) => p.set_name(name),
        }
    }

    /// Name as it appears inside a parent's derived name: composites with a
    /// derived name are parenthesized.
    pub(crate) fn label_part(&self) -> String {
        match self {
            Node::Step(s) => s.name().to_string(),
            Node::Union(u) if !u.has_custom_name() && u.len() > 1 => format!("({})", u.name()),
            Node::Pipeline(p) if !p.has_custom_name() && p.len() > 1 => {
                format!("({})", p.name())
            }
            other => other.name().to_string(),
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Step(_) => NodeKind::Step,
            Node::Union(_) => NodeKind::Union,
            Node::Pipeline(_) => NodeKind::Pipeline,
        }
    }

    /// A union only transforms; a pipeline has the capabilities of its last node.
    pub fn capabilities(&self) -> Capabilities {
        match self {
            Node::Step(s) => s.capabilities(),
            Node::Union(_) => Capabilities::transformer(),
            Node::Pipeline(p) => p.capabilities(),
        }
    }

    pub fn is_transformer(&self) -> bool {
        self.capabilities().transform
    }

    pub fn as_step(&self) -> Option<&Step> {
        match self {
            Node::Step(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_union(&self) -> Option<&Union> {
        match self {
            Node::Union(u) => Some(u),
            _ => None,
        }
    }

    pub fn as_pipeline(&self) -> Option<&Pipeline> {
        match self {
            Node::Pipeline(p) => Some(p),
            _ => None,
        }
    }

    /// Learned state; composites nest their children's state by name.
    pub fn params(&self) -> serde_json::Value {
        match self {
            Node::Step(s) => s.params(),
            Node::Union(u) => children_params(u.branches()),
            Node::Pipeline(p) => p.params(),
        }
    }

    /// Depth-first search for a node by name, this node included.
    pub fn find(&self, name: &str) -> Option<&Node> {
        if self.name() == name {
            return Some(self);
        }
        match self {
            Node::Step(_) => None,
            Node::Union(u) => u.branches().iter().find_map(|b| b.find(name)),
            Node::Pipeline(p) => p.nodes().iter().find_map(|n| n.find(name)),
        }
    }

    /// The component of the step called `name`, searched depth-first.
    ///
    /// Only components are handed out mutably, so a lookup can change learned
    /// state but never the shape of the tree.
    pub(crate) fn find_component_mut(&mut self, name: &str) -> Option<&mut dyn Component> {
        match self {
            Node::Step(step) if step.name() == name => Some(step.component_mut()),
            Node::Step(_) => None,
            Node::Union(u) => u
                .branches_mut()
                .iter_mut()
                .find_map(|b| b.find_component_mut(name)),
            Node::Pipeline(p) => p
                .nodes_mut()
                .iter_mut()
                .find_map(|n| n.find_component_mut(name)),
        }
    }

    pub(crate) fn children(&self) -> &[Node] {
        match self {
            Node::Step(_) => &[],
            Node::Union(u) => u.branches(),
            Node::Pipeline(p) => p.nodes(),
        }
    }

    /// Every step of this subtree, depth-first.
    pub(crate) fn for_each_step<'a>(&'a self, f: &mut impl FnMut(&'a Step)) {
        match self {
            Node::Step(step) => f(step),
            other => {
                for child in other.children() {
                    child.for_each_step(f);
                }
            }
        }
    }

    pub(crate) fn find_step_mut(&mut self, name: &str) -> Option<&mut Step> {
        match self {
            Node::Step(step) if step.name() == name => Some(step),
            Node::Step(_) => None,
            Node::Union(u) => u.branches_mut().iter_mut().find_map(|b| b.find_step_mut(name)),
            Node::Pipeline(p) => p.nodes_mut().iter_mut().find_map(|n| n.find_step_mut(name)),
        }
    }

    /// Push the name of this node and of every node below it.
    pub(crate) fn collect_names(&self, out: &mut Vec<String>) {
        out.push(self.name().to_string());
        for child in self.children() {
            child.collect_names(out);
        }
    }

    /// Rename nodes of this subtree that clash with `taken`, children first,
    /// and add the resulting names to `taken`.
    ///
    /// Derived composite names are recomputed after their children are
    /// renamed.
    pub(crate) fn claim_names(&mut self, taken: &mut Vec<String>) {
        match self {
            Node::Step(_) => {}
            Node::Union(u) => {
                for branch in u.branches_mut() {
                    branch.claim_names(taken);
                }
                u.refresh_name();
            }
            Node::Pipeline(p) => {
                for node in p.nodes_mut() {
                    node.claim_names(taken);
                }
                p.refresh_name();
            }
        }
        let name = unique_name(self.name(), taken.iter().map(String::as_str));
        if name != self.name() {
            self.set_name(name);
        }
        taken.push(self.name().to_string());
    }

    /// Parallel composition.
    ///
    /// If either side is a union without a custom name, the other side joins
    /// it as extra branches rather than nesting a union inside a union. A
    /// union with a custom name always stays a single, findable branch.
    pub fn union(self, other: impl Into<Node>) -> PipelineResult<Node> {
        let other = other.into();
        for side in [&self, &other] {
            if !side.is_transformer() {
                return Err(PipelineError::Construction(format!(
                    "'{}' is not a transformer and cannot be part of a union",
                    side.name()
                )));
            }
        }
        let union = match (self, other) {
            (Node::Union(mut left), right) if !left.has_custom_name() => {
                match right {
                    Node::Union(right) if !right.has_custom_name() => {
                        for branch in right.into_branches() {
                            left.push(branch)?;
                        }
                    }
                    right => left.push(right)?,
                }
                left
            }
            (left, Node::Union(mut right)) if !right.has_custom_name() => {
                right.push_front(left)?;
                right
            }
            (left, right) => Union::new(vec![left, right])?,
        };
        Ok(Node::Union(union))
    }

    /// Sequential composition into a new pipeline.
    pub fn then(self, next: impl Into<Node>) -> PipelineResult<Pipeline> {
        Pipeline::new(self).then(next)
    }

    pub(crate) fn describe_into(&self, depth: usize, position: usize, out: &mut Vec<NodeInfo>) {
        out.push(NodeInfo {
            name: self.name().to_string(),
            kind: self.kind(),
            depth,
            position,
            capabilities: self.capabilities(),
        });
        for (i, child) in self.children().iter().enumerate() {
            child.describe_into(depth + 1, i, out);
        }
    }

    /// Transform `x` through this node.
    ///
    /// `overlay` only matters for steps: in a pipeline a step's output is
    /// written over its input, in a union a step contributes only what it
    /// emits.
    pub(crate) fn run(
        &mut self,
        x: &Observation,
        pass: &mut Pass<'_>,
        depth: usize,
        position: usize,
        overlay: bool,
    ) -> PipelineResult<Observation> {
        match self {
            Node::Step(step) => {
                let out = step.run(x, pass.update, overlay)?;
                pass.record(step.name(), NodeKind::Step, depth, position, &out);
                Ok(out)
            }
            Node::Union(union) => {
                let slot = pass.reserve(union.name(), NodeKind::Union, depth, position);
                let out = union.run(x, pass, depth)?;
                pass.fill(slot, &out, union.last_collisions());
                Ok(out)
            }
            Node::Pipeline(pipeline) => {
                let slot = pass.reserve(pipeline.name(), NodeKind::Pipeline, depth, position);
                let out = pipeline.run_transform(x, pass, depth + 1)?;
                pass.fill(slot, &out, &[]);
                Ok(out)
            }
        }
    }

    /// Predict with this node as the terminal one.
    pub(crate) fn predict(&mut self, x: &Observation, pass: &mut Pass<'_>) -> PipelineResult<Value> {
        match self {
            Node::Step(step) => step.predict(x),
            Node::Pipeline(pipeline) => pipeline.run_predict(x, pass),
            Node::Union(union) => Err(PipelineError::UnsupportedOperation {
                node: union.name().to_string(),
                operation: Operation::Predict,
            }),
        }
    }

    /// Learn with this node as the terminal one.
    pub(crate) fn learn(
        &mut self,
        x: &Observation,
        y: &Value,
        pass: &mut Pass<'_>,
    ) -> PipelineResult<()> {
        match self {
            Node::Step(step) => step.learn(x, y),
            Node::Pipeline(pipeline) => pipeline.run_learn(x, y, pass),
            Node::Union(union) => Err(PipelineError::UnsupportedOperation {
                node: union.name().to_string(),
                operation: Operation::Learn,
            }),
        }
    }

    /// Predict with this node as the terminal one, recording what it saw and,
    /// where supported, the per-feature breakdown.
    pub(crate) fn explain(
        &mut self,
        x: &Observation,
        pass: &mut Pass<'_>,
        depth: usize,
        position: usize,
    ) -> PipelineResult<TraceOutcome> {
        match self {
            Node::Step(step) => {
                let prediction = step.predict(x)?;
                let node = step.name().to_string();
                if step.capabilities().explain {
                    Ok(TraceOutcome::Breakdown {
                        node,
                        prediction,
                        contributions: step.contributions(x)?,
                    })
                } else {
                    Ok(TraceOutcome::Prediction { node, prediction })
                }
            }
            Node::Pipeline(pipeline) => {
                let slot = pass.reserve(pipeline.name(), NodeKind::Pipeline, depth, position);
                let prefix = pipeline.len() - 1;
                let xt = pipeline.run_nodes(x, pass, depth + 1, prefix)?;
                pass.fill(slot, &xt, &[]);
                pipeline.nodes_mut()[prefix].explain(&xt, pass, depth + 1, prefix)
            }
            Node::Union(union) => Err(PipelineError::UnsupportedOperation {
                node: union.name().to_string(),
                operation: Operation::Predict,
            }),
        }
    }
}

pub(crate) fn children_params(children: &[Node]) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = children
        .iter()
        .map(|c| (c.name().to_string(), c.params()))
        .collect();
    serde_json::Value::Object(map)
}

/// `base` if free, otherwise `base` followed by the smallest free integer suffix.
pub(crate) fn unique_name<'a>(base: &str, existing: impl Iterator<Item = &'a str> + Clone) -> String {
    let taken = |candidate: &str| existing.clone().any(|n| n == candidate);
    if !taken(base) {
        return base.to_string();
    }
    (1..)
        .map(|i| format!("{base}{i}"))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| base.to_string())
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
