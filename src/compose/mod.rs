//! Composition engine: steps, unions and pipelines.
//!
//! A [`Pipeline`] is an ordered sequence of [`Node`]s. Each node is either a
//! [`Step`] wrapping one component, a [`Union`] fanning the same observation
//! out to several transformer branches, or a nested pipeline.
//!
//! Transformers update their unsupervised state on every observation that
//! flows through them. The terminal supervised node only changes on `learn`.

pub mod debug;
pub mod node;
pub mod pipeline;
pub mod step;
pub mod union;

pub use debug::{Trace, TraceEntry, TraceOutcome};
pub use node::{Node, NodeInfo, NodeKind};
pub use pipeline::Pipeline;
pub use step::Step;
pub use union::Union;
