//! Sequential composition and the caller-facing entry points.

use crate::compose::debug::{Pass, Recorder, Trace, TraceOutcome};
use crate::compose::node::{children_params, Node, NodeInfo};
use crate::config::PipelineConfig;
use crate::error::{Operation, PipelineError, PipelineResult};
use crate::serialization::PipelineState;
use crate::observation::{Observation, Value};
use crate::traits::{Capabilities, Component};
use std::fmt;
use tracing::instrument;

/// An ordered sequence of nodes; every node but the last is a transformer.
///
/// Transformers update their state on every observation they see, whether it
/// arrives through `transform`, `predict`, `learn` or `debug`. The terminal
/// supervised node only changes on `learn`.
///
/// # Example
/// ```ignore
/// let mut model = Pipeline::new(Step::new(StandardScaler::new()))
///     .then(Step::new(LinearRegression::new()))?;
///
/// let y_pred = model.predict(&x)?;
/// model.learn(&x, &y)?;
/// ```
#[derive(Debug)]
pub struct Pipeline {
    name: String,
    custom_name: bool,
    nodes: Vec<Node>,
    config: PipelineConfig,
}

impl Pipeline {
    /// Start a pipeline from its first node. A pipeline passed in is returned as is.
    pub fn new(first: impl Into<Node>) -> Self {
        match first.into() {
            Node::Pipeline(pipeline) => pipeline,
            node => {
                let mut pipeline = Self {
                    name: String::new(),
                    custom_name: false,
                    nodes: vec![node],
                    config: PipelineConfig::default(),
                };
                pipeline.refresh_name();
                pipeline
            }
        }
    }

    /// Build a pipeline from a list of nodes, keeping nested pipelines as nodes.
    ///
    /// # Errors
    /// [`PipelineError::Construction`] if `nodes` is empty or a node other
    /// than the last is not a transformer.
    pub fn from_nodes(nodes: Vec<Node>) -> PipelineResult<Self> {
        let mut nodes = nodes.into_iter();
        let first = nodes.next().ok_or_else(|| {
            PipelineError::Construction("a pipeline needs at least one node".to_string())
        })?;
        let mut pipeline = Self {
            name: String::new(),
            custom_name: false,
            nodes: vec![first],
            config: PipelineConfig::default(),
        };
        for node in nodes {
            pipeline.push_node(node)?;
        }
        pipeline.refresh_name();
        Ok(pipeline)
    }

    /// Append a node. An unnamed pipeline is spliced in node by node.
    pub fn then(mut self, next: impl Into<Node>) -> PipelineResult<Self> {
        match next.into() {
            Node::Pipeline(other) if !other.custom_name => {
                for node in other.nodes {
                    self.push_node(node)?;
                }
            }
            node => self.push_node(node)?,
        }
        self.refresh_name();
        Ok(self)
    }

    /// Append a node after checking the current last one is a transformer.
    ///
    /// Names stay unique across the whole tree, nested pipelines and union
    /// branches included, so a by-name lookup has exactly one answer.
    fn push_node(&mut self, mut node: Node) -> PipelineResult<()> {
        let last = self.last();
        if !last.is_transformer() {
            return Err(PipelineError::Construction(format!(
                "'{}' is not a transformer and cannot be followed by '{}'",
                last.name(),
                node.name()
            )));
        }
        let mut taken = Vec::new();
        for existing in &self.nodes {
            existing.collect_names(&mut taken);
        }
        node.claim_names(&mut taken);
        self.nodes.push(node);
        Ok(())
    }

    pub(crate) fn refresh_name(&mut self) {
        if !self.custom_name {
            self.name = self
                .nodes
                .iter()
                .map(Node::label_part)
                .collect::<Vec<_>>()
                .join(" | ");
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.set_name(name.into());
        self
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
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

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always `false`: a pipeline holds at least one node.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The terminal node.
    pub fn last(&self) -> &Node {
        &self.nodes[self.nodes.len() - 1]
    }

    /// A pipeline has the capabilities of its terminal node.
    pub fn capabilities(&self) -> Capabilities {
        self.last().capabilities()
    }

    fn require(&self, operation: Operation) -> PipelineResult<()> {
        let capabilities = self.capabilities();
        let supported = match operation {
            Operation::Transform => true,
            Operation::Predict => capabilities.predict,
            Operation::Learn => capabilities.learn,
            Operation::Explain => capabilities.explain,
        };
        if supported {
            Ok(())
        } else {
            Err(PipelineError::UnsupportedOperation {
                node: self.last().name().to_string(),
                operation,
            })
        }
    }

    /// Pass `x` through every transformer, updating each one.
    ///
    /// A terminal node that is not a transformer is skipped, so the result is
    /// always an observation.
    #[instrument(level = "debug", skip_all, fields(pipeline = %self.name))]
    pub fn transform(&mut self, x: &Observation) -> PipelineResult<Observation> {
        tracing::debug!("transform");
        self.run_transform(x, &mut Pass::new(true), 0)
    }

    /// Transform `x` through the leading nodes, updating them, then predict
    /// with the terminal node without changing its learned state.
    ///
    /// # Errors
    /// [`PipelineError::UnsupportedOperation`] if the terminal node cannot
    /// predict; no node runs in that case.
    #[instrument(level = "debug", skip_all, fields(pipeline = %self.name))]
    pub fn predict(&mut self, x: &Observation) -> PipelineResult<Value> {
        self.require(Operation::Predict)?;
        tracing::debug!("predict");
        self.run_predict(x, &mut Pass::new(true))
    }

    /// Transform `x` through the leading nodes and let the terminal node
    /// learn from the result and `y`.
    ///
    /// The leading transformers update as well unless
    /// [`PipelineConfig::update_unsupervised_on_learn`] is off.
    ///
    /// # Errors
    /// [`PipelineError::UnsupportedOperation`] if the terminal node cannot
    /// learn; no node runs in that case.
    #[instrument(level = "debug", skip_all, fields(pipeline = %self.name))]
    pub fn learn(&mut self, x: &Observation, y: &Value) -> PipelineResult<()> {
        self.require(Operation::Learn)?;
        tracing::debug!("learn");
        let mut pass = Pass::new(self.config.update_unsupervised_on_learn);
        self.run_learn(x, y, &mut pass)
    }

    /// Replay `x` with `predict` semantics and record the observation after
    /// every node.
    ///
    /// Transformers update exactly as in [`Pipeline::predict`]; the terminal
    /// node never learns.
    #[instrument(level = "debug", skip_all, fields(pipeline = %self.name))]
    pub fn debug(&mut self, x: &Observation) -> PipelineResult<Trace> {
        tracing::debug!("debug");
        let mut recorder = Recorder::default();
        let outcome = {
            let mut pass = Pass::recording(&mut recorder);
            if self.capabilities().predict {
                self.run_explain(x, &mut pass)?
            } else {
                self.run_transform(x, &mut pass, 0)?;
                TraceOutcome::None
            }
        };
        Ok(Trace {
            input: x.clone(),
            entries: recorder.into_entries(),
            outcome,
        })
    }

    /// Fold `x` through the first `count` nodes.
    pub(crate) fn run_nodes(
        &mut self,
        x: &Observation,
        pass: &mut Pass<'_>,
        depth: usize,
        count: usize,
    ) -> PipelineResult<Observation> {
        let mut current = x.clone();
        for (position, node) in self.nodes[..count].iter_mut().enumerate() {
            current = node.run(&current, pass, depth, position, true)?;
            tracing::trace!(node = %node.name(), depth, "node ran");
        }
        Ok(current)
    }

    pub(crate) fn run_transform(
        &mut self,
        x: &Observation,
        pass: &mut Pass<'_>,
        depth: usize,
    ) -> PipelineResult<Observation> {
        let count = if self.last().is_transformer() {
            self.nodes.len()
        } else {
            self.nodes.len() - 1
        };
        self.run_nodes(x, pass, depth, count)
    }

    pub(crate) fn run_predict(&mut self, x: &Observation, pass: &mut Pass<'_>) -> PipelineResult<Value> {
        let terminal = self.nodes.len() - 1;
        let xt = self.run_nodes(x, pass, 0, terminal)?;
        self.nodes[terminal].predict(&xt, pass)
    }

    pub(crate) fn run_learn(
        &mut self,
        x: &Observation,
        y: &Value,
        pass: &mut Pass<'_>,
    ) -> PipelineResult<()> {
        let terminal = self.nodes.len() - 1;
        let xt = self.run_nodes(x, pass, 0, terminal)?;
        self.nodes[terminal].learn(&xt, y, pass)
    }

    fn run_explain(&mut self, x: &Observation, pass: &mut Pass<'_>) -> PipelineResult<TraceOutcome> {
        let terminal = self.nodes.len() - 1;
        let xt = self.run_nodes(x, pass, 0, terminal)?;
        self.nodes[terminal].explain(&xt, pass, 0, terminal)
    }

    /// Look a node up by name, searching nested pipelines and union branches.
    pub fn get(&self, name: &str) -> PipelineResult<&Node> {
        self.nodes
            .iter()
            .find_map(|node| node.find(name))
            .ok_or_else(|| PipelineError::NotFound(name.to_string()))
    }

    /// The component of the step called `name`, for in-place changes to its
    /// learned state.
    ///
    /// The tree itself cannot be changed through this handle.
    ///
    /// # Errors
    /// [`PipelineError::NotFound`] if no step has that name; composites are
    /// not steps.
    pub fn get_mut(&mut self, name: &str) -> PipelineResult<&mut dyn Component> {
        self.nodes
            .iter_mut()
            .find_map(|node| node.find_component_mut(name))
            .ok_or_else(|| PipelineError::NotFound(name.to_string()))
    }

    /// Encoded learned state of every stateful step, keyed by step name.
    pub fn save_state(&self) -> PipelineResult<PipelineState> {
        let mut steps = Vec::new();
        for node in &self.nodes {
            node.for_each_step(&mut |step| steps.push(step));
        }
        let mut state = PipelineState::new();
        for step in steps {
            if let Some(bytes) = step.save_state()? {
                state.insert(step.name().to_string(), bytes);
            }
        }
        tracing::debug!(pipeline = %self.name, steps = state.len(), "state saved");
        Ok(state)
    }

    /// Load state produced by [`Pipeline::save_state`] on a pipeline of the
    /// same shape. Steps missing from `state` keep their current state.
    ///
    /// # Errors
    /// [`PipelineError::NotFound`] if `state` names a step this pipeline does
    /// not have, or the step's error if its bytes do not decode.
    pub fn load_state(&mut self, state: &PipelineState) -> PipelineResult<()> {
        for (name, bytes) in state {
            let step = self
                .nodes
                .iter_mut()
                .find_map(|node| node.find_step_mut(name))
                .ok_or_else(|| PipelineError::NotFound(name.clone()))?;
            step.load_state(bytes)?;
        }
        Ok(())
    }

    /// Learned state of every node, keyed by node name.
    pub fn params(&self) -> serde_json::Value {
        children_params(&self.nodes)
    }

    /// The node tree in pre-order, for external renderers.
    pub fn describe(&self) -> Vec<NodeInfo> {
        let mut out = Vec::new();
        for (position, node) in self.nodes.iter().enumerate() {
            node.describe_into(0, position, &mut out);
        }
        out
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
