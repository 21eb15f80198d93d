//! Error types for pipeline construction and execution.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error raised by a wrapped component's own transform/predict/learn.
///
/// The engine forwards it unchanged inside [`PipelineError::Component`].
pub type ComponentError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for component capability methods.
pub type ComponentResult<T> = std::result::Result<T, ComponentError>;

/// The operation a caller asked a node to perform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Transform,
    Predict,
    Learn,
    Explain,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Transform => "transform",
            Operation::Predict => "predict",
            Operation::Learn => "learn",
            Operation::Explain => "explain",
        };
        f.write_str(s)
    }
}

/// Two union branches emitted the same key; the later branch won.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeCollision {
    /// Name of the union where the merge happened.
    pub union: String,
    /// The colliding output key.
    pub key: String,
    /// Branch whose value was replaced.
    pub overwritten: String,
    /// Branch whose value was kept.
    pub winner: String,
}

impl fmt::Display for MergeCollision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "key '{}' in union '{}' emitted by '{}' was replaced by '{}'",
            self.key, self.union, self.overwritten, self.winner
        )
    }
}

/// Errors produced by the composition engine.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Invalid composition, detected when the pipeline or union is built.
    #[error("Construction error: {0}")]
    Construction(String),

    #[error("Node '{node}' does not support {operation}")]
    UnsupportedOperation { node: String, operation: Operation },

    #[error("No node or branch named '{0}'")]
    NotFound(String),

    /// Only raised by unions configured with [`CollisionPolicy::Reject`](crate::config::CollisionPolicy::Reject).
    #[error("Merge collision: {0}")]
    MergeCollision(MergeCollision),

    #[error("{0}")]
    Component(#[from] ComponentError),
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
