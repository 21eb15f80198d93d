//! Online Standard Scaler (z-score normalization).
//!
//! Each numeric feature is scaled with its running mean and standard
//! deviation:
//! ```text
//! z = (x - u) / s
//! ```
//! `u` and `s` are the running mean and population variance from
//! `online_statistics`, updated one observation at a time, so the scaler
//! never needs a fitting pass.
//!
//! # Example
//! ```ignore
//! use streamlearne_rs::components::StandardScaler;
//! use streamlearne_rs::traits::Transformer;
//!
//! let mut scaler = StandardScaler::new();
//! for x in stream {
//!     scaler.update(&x)?;
//!     let scaled = scaler.transform_one(&x)?;
//! }
//!
//! // Persist and restore the running statistics:
//! let bytes = scaler.state_to_bytes()?;
//! let mut restored = StandardScaler::new();
//! restored.load_state_bytes(&bytes)?;
//! ```

use crate::error::ComponentResult;
use crate::observation::Observation;
use crate::serialization::Stateful;
use crate::traits::{Component, Transformer};
use online_statistics::mean::Mean;
use online_statistics::stats::Univariate;
use online_statistics::variance::Variance;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Configuration for StandardScaler.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StandardScalerConfig {
    /// If true, center each feature on its running mean.
    pub with_mean: bool,
    /// If true, scale each feature to unit variance.
    pub with_std: bool,
}

impl Default for StandardScalerConfig {
    fn default() -> Self {
        Self {
            with_mean: true,
            with_std: true,
        }
    }
}

/// Running statistics of one feature.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureStats {
    pub count: u64,
    pub mean: f64,
    /// Population variance.
    pub var: f64,
}

/// Live statistics of one feature.
#[derive(Clone, Debug)]
struct RunningFeature {
    count: u64,
    mean: Mean<f64>,
    var: Variance<f64>,
}

impl RunningFeature {
    fn new() -> Self {
        Self {
            count: 0,
            mean: Mean::new(),
            var: Variance::new(0),
        }
    }

    fn update(&mut self, x: f64) {
        self.count += 1;
        self.mean.update(x);
        self.var.update(x);
    }

    fn stats(&self) -> FeatureStats {
        FeatureStats {
            count: self.count,
            mean: self.mean.get(),
            var: self.var.get(),
        }
    }

    /// Rebuild running statistics that report `stats`.
    ///
    /// Replays a sample of `count` values with that mean and population
    /// variance: pairs at `mean ± spread`, plus `mean` itself when `count` is
    /// odd. Later updates then continue exactly as on the original stream.
    fn from_stats(stats: &FeatureStats) -> Self {
        let mut feature = Self::new();
        let pairs = stats.count / 2;
        let spread = if pairs == 0 {
            0.0
        } else {
            (stats.var.max(0.0) * stats.count as f64 / (2 * pairs) as f64).sqrt()
        };
        for _ in 0..pairs {
            feature.update(stats.mean + spread);
            feature.update(stats.mean - spread);
        }
        if stats.count % 2 == 1 {
            feature.update(stats.mean);
        }
        feature
    }
}

/// Serializable state of a StandardScaler.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StandardScalerParams {
    pub config: StandardScalerConfig,
    pub features: BTreeMap<String, FeatureStats>,
}

/// Online StandardScaler.
///
/// Only numeric features are emitted (booleans count as 0/1). A feature with
/// zero variance so far is emitted as 0.
#[derive(Clone, Debug, Default)]
pub struct StandardScaler {
    config: StandardScalerConfig,
    stats: BTreeMap<String, RunningFeature>,
}

impl StandardScaler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether to center features on their mean.
    pub fn with_mean(mut self, with_mean: bool) -> Self {
        self.config.with_mean = with_mean;
        self
    }

    /// Set whether to scale features to unit variance.
    pub fn with_std(mut self, with_std: bool) -> Self {
        self.config.with_std = with_std;
        self
    }

    pub fn config(&self) -> &StandardScalerConfig {
        &self.config
    }

    /// Running mean of a feature, if it has been seen.
    pub fn mean(&self, feature: &str) -> Option<f64> {
        self.stats.get(feature).map(|s| s.mean.get())
    }

    /// Running population variance of a feature, if it has been seen.
    pub fn var(&self, feature: &str) -> Option<f64> {
        self.stats.get(feature).map(|s| s.var.get())
    }

    pub fn from_params(params: StandardScalerParams) -> Self {
        let mut scaler = Self::new();
        scaler.load_params(params);
        scaler
    }

    fn scale(&self, feature: &str, x: f64) -> f64 {
        let (mean, var) = self
            .stats
            .get(feature)
            .map(|s| (s.mean.get(), s.var.get()))
            .unwrap_or((0.0, 0.0));

        let centered = if self.config.with_mean { x - mean } else { x };
        if !self.config.with_std {
            return centered;
        }
        if var > 0.0 {
            centered / var.sqrt()
        } else {
            0.0
        }
    }
}

impl Transformer for StandardScaler {
    fn update(&mut self, x: &Observation) -> ComponentResult<()> {
        for (name, value) in x.numeric() {
            self.stats
                .entry(name.to_string())
                .or_insert_with(RunningFeature::new)
                .update(value);
        }
        Ok(())
    }

    fn transform_one(&self, x: &Observation) -> ComponentResult<Observation> {
        Ok(x
            .numeric()
            .map(|(name, value)| (name, self.scale(name, value)))
            .collect())
    }
}

impl Stateful for StandardScaler {
    type Params = StandardScalerParams;

    fn extract_params(&self) -> StandardScalerParams {
        StandardScalerParams {
            config: self.config.clone(),
            features: self
                .stats
                .iter()
                .map(|(name, feature)| (name.clone(), feature.stats()))
                .collect(),
        }
    }

    fn load_params(&mut self, params: StandardScalerParams) {
        self.config = params.config;
        self.stats = params
            .features
            .iter()
            .map(|(name, stats)| (name.clone(), RunningFeature::from_stats(stats)))
            .collect();
    }
}

impl Component for StandardScaler {
    fn as_transformer(&self) -> Option<&dyn Transformer> {
        Some(self)
    }

    fn as_transformer_mut(&mut self) -> Option<&mut dyn Transformer> {
        Some(self)
    }

    fn params(&self) -> serde_json::Value {
        serde_json::to_value(self.extract_params()).unwrap_or(serde_json::Value::Null)
    }

    fn save_state(&self) -> ComponentResult<Option<Vec<u8>>> {
        Ok(Some(self.state_to_bytes()?))
    }

    fn load_state(&mut self, bytes: &[u8]) -> ComponentResult<()> {
        Ok(self.load_state_bytes(bytes)?)
    }
}
