//! Optimizers for online learners with sparse, named weights.

use std::collections::BTreeMap;

/// Updates named weights from their gradients.
///
/// Weights missing from `weights` start at zero. Weights without a gradient
/// are left untouched.
pub trait Optimizer {
    fn step(&mut self, weights: &mut BTreeMap<String, f64>, gradients: &BTreeMap<String, f64>);

    fn learning_rate(&self) -> f64;
}

/// Plain stochastic gradient descent: `w ← w - η · g`.
#[derive(Clone, Debug)]
pub struct SGD {
    lr: f64,
}

impl SGD {
    pub fn new(lr: f64) -> Self {
        Self { lr }
    }
}

impl Default for SGD {
    fn default() -> Self {
        Self::new(0.01)
    }
}

impl Optimizer for SGD {
    fn step(&mut self, weights: &mut BTreeMap<String, f64>, gradients: &BTreeMap<String, f64>) {
        for (name, g) in gradients {
            *weights.entry(name.clone()).or_insert(0.0) -= self.lr * g;
        }
    }

    fn learning_rate(&self) -> f64 {
        self.lr
    }
}
