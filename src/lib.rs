//! # streamlearne-rs
//!
//! Online, sample-at-a-time model composition. Feature transformers and a
//! final estimator are chained into a single [`Pipeline`] that processes one
//! observation at a time and updates its state incrementally instead of
//! fitting on a batch.
//!
//! ## Core Rules
//!
//! - **Unsupervised state advances eagerly**: a transformer updates on every
//!   observation that flows through it, on `transform`, `predict`, `learn`
//!   and `debug` alike.
//! - **Supervised state advances only with a label**: the terminal
//!   estimator changes on `learn` and never on `predict`.
//! - **Deterministic fan-out**: a [`Union`] runs its branches on the same
//!   input in order and merges their outputs last-writer-wins, reporting
//!   every collision.
//! - **Honest debugging**: [`Pipeline::debug`] replays an observation with
//!   `predict` semantics and records the observation after every node.
//!
//! ## Quick Start
//!
//! ```rust
//! use streamlearne_rs::components::{LinearRegression, StandardScaler};
//! use streamlearne_rs::{Observation, Pipeline, Step, Value};
//!
//! let mut model = Pipeline::new(Step::new(StandardScaler::new()))
//!     .then(Step::new(LinearRegression::new()))
//!     .unwrap();
//!
//! let x = Observation::new().with("f", 10.0);
//! let y_pred = model.predict(&x).unwrap();
//! model.learn(&x, &Value::from(5.0)).unwrap();
//!
//! let trace = model.debug(&x).unwrap();
//! println!("{trace}");
//! # let _ = y_pred;
//! ```
//!
//! ## Module Structure
//!
//! - `observation`: feature values and the observation map
//! - `traits`: capability contracts (`Transformer`, `Predictor`, ...)
//! - `compose`: steps, unions, pipelines and the debug trace
//! - `components`: reference scaler, regressor and selectors
//! - `config`: pipeline and union settings
//! - `optim`: optimizers used by components
//! - `serialization`: binary persistence of learned state

pub mod components;
pub mod compose;
pub mod config;
pub mod error;
pub mod observation;
pub mod optim;
pub mod serialization;
pub mod traits;

pub use compose::{Node, NodeInfo, NodeKind, Pipeline, Step, Trace, TraceEntry, TraceOutcome, Union};
pub use config::{CollisionPolicy, PipelineConfig};
pub use error::{ComponentError, ComponentResult, MergeCollision, Operation, PipelineError, PipelineResult};
pub use observation::{Observation, Value};
pub use serialization::{PipelineState, Stateful};
pub use traits::{
    Capabilities, Component, Contribution, Explain, Predictor, SupervisedLearner, Transformer,
};
