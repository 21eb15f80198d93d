use crate::error::ComponentResult;
use crate::observation::Observation;
use crate::traits::{Component, Transformer};
use std::collections::BTreeSet;

/// Keeps only the named features.
///
/// Used as the pass-through branch of a union, since a union's output only
/// holds what its branches emit. Missing features are skipped.
#[derive(Clone, Debug)]
pub struct Select {
    keys: BTreeSet<String>,
}

impl Select {
    pub fn new<K: Into<String>>(keys: impl IntoIterator<Item = K>) -> Self {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }
}

impl Transformer for Select {
    fn transform_one(&self, x: &Observation) -> ComponentResult<Observation> {
        Ok(self
            .keys
            .iter()
            .filter_map(|k| x.get(k).map(|v| (k.as_str(), v.clone())))
            .collect())
    }
}

impl Component for Select {
    fn as_transformer(&self) -> Option<&dyn Transformer> {
        Some(self)
    }

    fn as_transformer_mut(&mut self) -> Option<&mut dyn Transformer> {
        Some(self)
    }

    fn params(&self) -> serde_json::Value {
        serde_json::json!({ "keys": self.keys })
    }
}
