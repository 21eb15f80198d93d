//! Capability contracts for components wrapped by the engine.
//!
//! A component implements zero or more of:
//! - [`Transformer`]: maps an observation to a new one and keeps unsupervised
//!   state that advances on every observation it sees.
//! - [`Predictor`]: maps an observation to a prediction without a label.
//! - [`SupervisedLearner`]: updates its state from an observation and its label.
//! - [`Explain`]: breaks a prediction down into per-feature contributions.
//!
//! The object-safe [`Component`] trait exposes these capabilities through
//! accessors so that nodes can check them at construction time and dispatch
//! at call time.

use crate::error::ComponentResult;
use crate::observation::{Observation, Value};
use serde::{Deserialize, Serialize};
use std::any::type_name;

/// Maps observations to observations, learning unsupervised state online.
pub trait Transformer {
    /// Absorb `x` into the transformer's running state.
    ///
    /// Stateless transformers keep the default no-op.
    fn update(&mut self, _x: &Observation) -> ComponentResult<()> {
        Ok(())
    }

    /// Transform `x` with the current state. Returns only the emitted fields.
    fn transform_one(&self, x: &Observation) -> ComponentResult<Observation>;
}

/// Produces a prediction from an observation.
pub trait Predictor {
    fn predict_one(&self, x: &Observation) -> ComponentResult<Value>;
}

/// Learns from an observation and its ground-truth label.
pub trait SupervisedLearner {
    fn learn_one(&mut self, x: &Observation, y: &Value) -> ComponentResult<()>;
}

/// One row of a per-feature prediction breakdown.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub feature: String,
    pub value: f64,
    pub weight: f64,
    /// Usually `value * weight`.
    pub contribution: f64,
}

/// Decomposes a prediction into per-feature contributions.
pub trait Explain {
    fn contributions(&self, x: &Observation) -> ComponentResult<Vec<Contribution>>;
}

/// The set of capabilities a node or component offers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub transform: bool,
    pub predict: bool,
    pub learn: bool,
    pub explain: bool,
}

impl Capabilities {
    /// Capabilities of a pure transformer.
    pub fn transformer() -> Self {
        Self {
            transform: true,
            ..Self::default()
        }
    }
}

/// An object the engine can wrap in a step.
///
/// Implement the accessors for the capabilities the type offers, returning
/// `Some(self)`; the defaults report the capability as absent.
///
/// `as_transformer` and `as_transformer_mut` must be overridden together, as
/// must `as_learner` and `as_learner_mut`. A [`Step`](crate::Step) only
/// grants a capability when both accessors return `Some`.
///
/// # Example
/// ```ignore
/// impl Component for Doubler {
///     fn as_transformer(&self) -> Option<&dyn Transformer> { Some(self) }
///     fn as_transformer_mut(&mut self) -> Option<&mut dyn Transformer> { Some(self) }
/// }
/// ```
pub trait Component: Send {
    /// Default step name: the short type name (`StandardScaler`).
    fn name(&self) -> String {
        short_type_name(type_name::<Self>()).to_string()
    }

    fn as_transformer(&self) -> Option<&dyn Transformer> {
        None
    }

    fn as_transformer_mut(&mut self) -> Option<&mut dyn Transformer> {
        None
    }

    fn as_predictor(&self) -> Option<&dyn Predictor> {
        None
    }

    fn as_learner(&self) -> Option<&dyn SupervisedLearner> {
        None
    }

    fn as_learner_mut(&mut self) -> Option<&mut dyn SupervisedLearner> {
        None
    }

    fn as_explain(&self) -> Option<&dyn Explain> {
        None
    }

    /// Learned state as JSON, for inspection.
    fn params(&self) -> serde_json::Value {
        serde_json::Value::Null
    }

    /// Learned state as bytes, or `None` for a stateless component.
    ///
    /// Components implementing [`Stateful`](crate::serialization::Stateful)
    /// forward to `state_to_bytes`.
    fn save_state(&self) -> ComponentResult<Option<Vec<u8>>> {
        Ok(None)
    }

    /// Replace the learned state with bytes produced by `save_state`.
    fn load_state(&mut self, _bytes: &[u8]) -> ComponentResult<()> {
        Err(format!("{} has no learned state to load", self.name()).into())
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            transform: self.as_transformer().is_some(),
            predict: self.as_predictor().is_some(),
            learn: self.as_learner().is_some(),
            explain: self.as_explain().is_some(),
        }
    }
}

/// Strip module path and generic arguments from a type name.
///
/// `streamlearne_rs::components::scaling::StandardScaler` becomes `StandardScaler`.
pub(crate) fn short_type_name(full_name: &str) -> &str {
    let before_generic = match full_name.find('<') {
        Some(pos) => &full_name[..pos],
        None => full_name,
    };
    match before_generic.rfind("::") {
        Some(pos) => &before_generic[pos + 2..],
        None => before_generic,
    }
}
