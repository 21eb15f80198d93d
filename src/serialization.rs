//! Binary persistence of learned component state.
//!
//! A component opts in by implementing [`Stateful`]: it names the parameter
//! struct that fully describes its learned state and how to load one back.
//! The struct travels as bincode. [`Component::save_state`] and
//! [`Component::load_state`] forward to it, which lets
//! [`Pipeline::save_state`](crate::Pipeline::save_state) snapshot every step
//! of a running pipeline by name and restore it into a freshly built one.
//!
//! [`Component::save_state`]: crate::traits::Component::save_state
//! [`Component::load_state`]: crate::traits::Component::load_state

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;

/// Encoded state of every stateful step of a pipeline, keyed by step name.
pub type PipelineState = BTreeMap<String, Vec<u8>>;

/// A component whose learned state can be exported and loaded back.
///
/// Hyperparameters that are not part of `Params` are left as they are by
/// [`Stateful::load_params`].
pub trait Stateful {
    type Params: Serialize + DeserializeOwned;

    fn extract_params(&self) -> Self::Params;

    fn load_params(&mut self, params: Self::Params);

    fn state_to_bytes(&self) -> bincode::Result<Vec<u8>> {
        bincode::serialize(&self.extract_params())
    }

    fn load_state_bytes(&mut self, bytes: &[u8]) -> bincode::Result<()> {
        self.load_params(bincode::deserialize(bytes)?);
        Ok(())
    }
}

/// Encode a whole pipeline snapshot so it can be written out as one blob.
pub fn encode_pipeline_state(state: &PipelineState) -> bincode::Result<Vec<u8>> {
    bincode::serialize(state)
}

pub fn decode_pipeline_state(bytes: &[u8]) -> bincode::Result<PipelineState> {
    bincode::deserialize(bytes)
}
