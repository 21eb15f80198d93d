//! Online linear regression.
//!
//! The model keeps one weight per feature name plus an intercept:
//! ```text
//! y = Σ w_i · x_i + b
//! ```
//! Each `learn_one` call performs one SGD step on the squared loss. The
//! gradient with respect to the prediction is `pred - y`; the factor of 2 is
//! absorbed into the learning rate.
//!
//! Features never seen before start with a weight of 0, so the feature set
//! can grow over the stream.

use crate::components::EstimatorError;
use crate::error::ComponentResult;
use crate::observation::{Observation, Value};
use crate::optim::{Optimizer, SGD};
use crate::serialization::Stateful;
use crate::traits::{Component, Contribution, Explain, Predictor, SupervisedLearner};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Hyperparameters of a LinearRegression.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearRegressionConfig {
    /// Learning rate for the feature weights.
    pub lr: f64,
    /// Learning rate for the intercept. 0 keeps the intercept fixed.
    pub intercept_lr: f64,
    /// L2 penalty strength.
    pub l2: f64,
    /// Gradients are clipped to `[-clip_gradient, clip_gradient]`.
    pub clip_gradient: f64,
}

impl Default for LinearRegressionConfig {
    fn default() -> Self {
        Self {
            lr: 0.01,
            intercept_lr: 0.01,
            l2: 0.0,
            clip_gradient: 1e12,
        }
    }
}

/// Serializable learned state of a LinearRegression.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LinearRegressionParams {
    pub weights: BTreeMap<String, f64>,
    pub intercept: f64,
}

/// Online linear regression trained with SGD.
#[derive(Clone, Debug)]
pub struct LinearRegression {
    config: LinearRegressionConfig,
    optimizer: SGD,
    params: LinearRegressionParams,
}

impl Default for LinearRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearRegression {
    pub fn new() -> Self {
        let config = LinearRegressionConfig::default();
        Self {
            optimizer: SGD::new(config.lr),
            config,
            params: LinearRegressionParams::default(),
        }
    }

    /// Build from a validated configuration.
    ///
    /// # Errors
    /// [`EstimatorError::InvalidParameter`] unless `lr` is finite and
    /// positive, `intercept_lr` and `l2` are finite and non-negative, and
    /// `clip_gradient` is positive (infinity disables clipping).
    pub fn from_config(config: LinearRegressionConfig) -> Result<Self, EstimatorError> {
        let checks = [
            ("lr", config.lr, config.lr.is_finite() && config.lr > 0.0),
            (
                "intercept_lr",
                config.intercept_lr,
                config.intercept_lr.is_finite() && config.intercept_lr >= 0.0,
            ),
            ("l2", config.l2, config.l2.is_finite() && config.l2 >= 0.0),
            ("clip_gradient", config.clip_gradient, config.clip_gradient > 0.0),
        ];
        if let Some((name, value, _)) = checks.iter().find(|(_, _, valid)| !valid) {
            return Err(EstimatorError::InvalidParameter(format!(
                "{name} is out of range: {value}"
            )));
        }
        Ok(Self {
            optimizer: SGD::new(config.lr),
            config,
            params: LinearRegressionParams::default(),
        })
    }

    pub fn with_lr(mut self, lr: f64) -> Self {
        self.config.lr = lr;
        self.optimizer = SGD::new(lr);
        self
    }

    pub fn with_intercept_lr(mut self, intercept_lr: f64) -> Self {
        self.config.intercept_lr = intercept_lr;
        self
    }

    pub fn with_l2(mut self, l2: f64) -> Self {
        self.config.l2 = l2;
        self
    }

    pub fn config(&self) -> &LinearRegressionConfig {
        &self.config
    }

    pub fn weights(&self) -> &BTreeMap<String, f64> {
        &self.params.weights
    }

    pub fn intercept(&self) -> f64 {
        self.params.intercept
    }

    /// Restore learned state, keeping the current hyperparameters.
    pub fn with_params(mut self, params: LinearRegressionParams) -> Self {
        self.params = params;
        self
    }

    fn raw_predict(&self, x: &Observation) -> f64 {
        x.numeric()
            .map(|(name, value)| self.params.weights.get(name).copied().unwrap_or(0.0) * value)
            .sum::<f64>()
            + self.params.intercept
    }
}

impl Predictor for LinearRegression {
    fn predict_one(&self, x: &Observation) -> ComponentResult<Value> {
        Ok(Value::Number(self.raw_predict(x)))
    }
}

impl SupervisedLearner for LinearRegression {
    fn learn_one(&mut self, x: &Observation, y: &Value) -> ComponentResult<()> {
        let y = y
            .as_f64()
            .ok_or_else(|| EstimatorError::NonNumericTarget(y.kind().to_string()))?;

        let clip = self.config.clip_gradient;
        let loss_gradient = (self.raw_predict(x) - y).clamp(-clip, clip);

        let gradients: BTreeMap<String, f64> = x
            .numeric()
            .map(|(name, value)| {
                let w = self.params.weights.get(name).copied().unwrap_or(0.0);
                (name.to_string(), loss_gradient * value + self.config.l2 * w)
            })
            .collect();
        self.optimizer.step(&mut self.params.weights, &gradients);
        self.params.intercept -= self.config.intercept_lr * loss_gradient;
        Ok(())
    }
}

impl Explain for LinearRegression {
    /// One row per numeric feature plus an `Intercept` row, largest
    /// contribution first.
    fn contributions(&self, x: &Observation) -> ComponentResult<Vec<Contribution>> {
        let mut rows: Vec<Contribution> = x
            .numeric()
            .map(|(name, value)| {
                let weight = self.params.weights.get(name).copied().unwrap_or(0.0);
                Contribution {
                    feature: name.to_string(),
                    value,
                    weight,
                    contribution: value * weight,
                }
            })
            .collect();
        rows.push(Contribution {
            feature: "Intercept".to_string(),
            value: 1.0,
            weight: self.params.intercept,
            contribution: self.params.intercept,
        });
        rows.sort_by(|a, b| b.contribution.total_cmp(&a.contribution));
        Ok(rows)
    }
}

impl Stateful for LinearRegression {
    type Params = LinearRegressionParams;

    fn extract_params(&self) -> LinearRegressionParams {
        self.params.clone()
    }

    fn load_params(&mut self, params: LinearRegressionParams) {
        self.params = params;
    }
}

impl Component for LinearRegression {
    fn as_predictor(&self) -> Option<&dyn Predictor> {
        Some(self)
    }

    fn as_learner(&self) -> Option<&dyn SupervisedLearner> {
        Some(self)
    }

    fn as_learner_mut(&mut self) -> Option<&mut dyn SupervisedLearner> {
        Some(self)
    }

    fn as_explain(&self) -> Option<&dyn Explain> {
        Some(self)
    }

    fn params(&self) -> serde_json::Value {
        serde_json::to_value(&self.params).unwrap_or(serde_json::Value::Null)
    }

    fn save_state(&self) -> ComponentResult<Option<Vec<u8>>> {
        Ok(Some(self.state_to_bytes()?))
    }

    fn load_state(&mut self, bytes: &[u8]) -> ComponentResult<()> {
        Ok(self.load_state_bytes(bytes)?)
    }
}
