//! Reference components for building pipelines end to end.
//!
//! - [`StandardScaler`]: online z-score per numeric feature.
//! - [`LinearRegression`]: online least squares trained by SGD.
//! - [`Select`]: keeps a fixed set of features.
//! - [`FuncTransformer`]: stateless transformer from a closure.

pub mod func;
pub mod linear;
pub mod scaling;
pub mod select;

pub use func::FuncTransformer;
pub use linear::{LinearRegression, LinearRegressionConfig, LinearRegressionParams};
pub use scaling::{FeatureStats, StandardScaler, StandardScalerConfig, StandardScalerParams};
pub use select::Select;

use thiserror::Error;

/// Errors raised by the reference components.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EstimatorError {
    #[error("Target must be numeric, got {0}")]
    NonNumericTarget(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}
