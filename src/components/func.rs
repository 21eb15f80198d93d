use crate::error::ComponentResult;
use crate::observation::Observation;
use crate::traits::{Component, Transformer};
use std::fmt;

/// A stateless transformer built from a closure.
///
/// The closure returns the fields to emit. Inside a pipeline they are written
/// over the input; inside a union they are all the branch contributes.
pub struct FuncTransformer<F> {
    func: F,
}

impl<F> FuncTransformer<F>
where
    F: Fn(&Observation) -> Observation + Send + 'static,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> Transformer for FuncTransformer<F>
where
    F: Fn(&Observation) -> Observation + Send + 'static,
{
    fn transform_one(&self, x: &Observation) -> ComponentResult<Observation> {
        Ok((self.func)(x))
    }
}

impl<F> Component for FuncTransformer<F>
where
    F: Fn(&Observation) -> Observation + Send + 'static,
{
    fn as_transformer(&self) -> Option<&dyn Transformer> {
        Some(self)
    }

    fn as_transformer_mut(&mut self) -> Option<&mut dyn Transformer> {
        Some(self)
    }
}

impl<F> fmt::Debug for FuncTransformer<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FuncTransformer").finish_non_exhaustive()
    }
}
