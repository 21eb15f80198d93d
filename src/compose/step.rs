//! A single named component in a pipeline.

use crate::error::{Operation, PipelineError, PipelineResult};
use crate::observation::{Observation, Value};
use crate::traits::{Capabilities, Component, Contribution};
use std::fmt;

/// Wraps one component under a stable name.
///
/// Transformers wrapped in a step are live-updating: every `transform` first
/// lets the component absorb the observation, then transforms it. Supervised
/// state only changes through [`Step::learn`].
///
/// Capabilities are fixed when the step is built. A transform or learn
/// capability is only granted when the component answers both the shared and
/// the mutable accessor for it, so construction checks and dispatch agree.
pub struct Step {
    name: String,
    component: Box<dyn Component>,
    capabilities: Capabilities,
}

impl Step {
    /// Wrap a component, naming the step after it.
    pub fn new(component: impl Component + 'static) -> Self {
        let name = component.name();
        Self::from_boxed(name, Box::new(component))
    }

    pub fn named(name: impl Into<String>, component: impl Component + 'static) -> Self {
        Self::from_boxed(name, Box::new(component))
    }

    pub fn from_boxed(name: impl Into<String>, mut component: Box<dyn Component>) -> Self {
        let capabilities = dispatchable_capabilities(component.as_mut());
        Self {
            name: name.into(),
            component,
            capabilities,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub fn component(&self) -> &dyn Component {
        self.component.as_ref()
    }

    pub fn component_mut(&mut self) -> &mut dyn Component {
        self.component.as_mut()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn params(&self) -> serde_json::Value {
        self.component.params()
    }

    /// Encoded learned state, `None` for a stateless component.
    pub fn save_state(&self) -> PipelineResult<Option<Vec<u8>>> {
        Ok(self.component.save_state()?)
    }

    pub fn load_state(&mut self, bytes: &[u8]) -> PipelineResult<()> {
        self.component.load_state(bytes)?;
        tracing::debug!(node = %self.name, bytes = bytes.len(), "step state loaded");
        Ok(())
    }

    fn unsupported(&self, operation: Operation) -> PipelineError {
        PipelineError::UnsupportedOperation {
            node: self.name.clone(),
            operation,
        }
    }

    /// Run the wrapped transformer.
    ///
    /// With `update`, the transformer absorbs `x` before transforming it.
    /// With `overlay`, the emitted fields are written over a copy of `x`;
    /// otherwise only the emitted fields are returned.
    pub(crate) fn run(
        &mut self,
        x: &Observation,
        update: bool,
        overlay: bool,
    ) -> PipelineResult<Observation> {
        let Some(transformer) = self.component.as_transformer_mut() else {
            return Err(PipelineError::UnsupportedOperation {
                node: self.name.clone(),
                operation: Operation::Transform,
            });
        };

        if update {
            transformer.update(x)?;
        }
        let emitted = transformer.transform_one(x)?;
        tracing::trace!(node = %self.name, emitted = emitted.len(), "step transformed");

        if overlay {
            let mut out = x.clone();
            out.overlay(emitted);
            Ok(out)
        } else {
            Ok(emitted)
        }
    }

    /// Update the transformer with `x` and return `x` with the emitted fields
    /// written over it.
    pub fn transform(&mut self, x: &Observation) -> PipelineResult<Observation> {
        self.run(x, true, true)
    }

    /// Predict without touching any learned state.
    pub fn predict(&self, x: &Observation) -> PipelineResult<Value> {
        let predictor = self
            .component
            .as_predictor()
            .ok_or_else(|| self.unsupported(Operation::Predict))?;
        Ok(predictor.predict_one(x)?)
    }

    pub fn learn(&mut self, x: &Observation, y: &Value) -> PipelineResult<()> {
        let Some(learner) = self.component.as_learner_mut() else {
            return Err(PipelineError::UnsupportedOperation {
                node: self.name.clone(),
                operation: Operation::Learn,
            });
        };
        learner.learn_one(x, y)?;
        tracing::trace!(node = %self.name, "step learned");
        Ok(())
    }

    pub fn contributions(&self, x: &Observation) -> PipelineResult<Vec<Contribution>> {
        let explain = self
            .component
            .as_explain()
            .ok_or_else(|| self.unsupported(Operation::Explain))?;
        Ok(explain.contributions(x)?)
    }
}

fn dispatchable_capabilities(component: &mut dyn Component) -> Capabilities {
    let declared = component.capabilities();
    Capabilities {
        transform: declared.transform && component.as_transformer_mut().is_some(),
        learn: declared.learn && component.as_learner_mut().is_some(),
        ..declared
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{FuncTransformer, LinearRegression, StandardScaler};
    use crate::error::ComponentResult;
    use crate::traits::Transformer;

    /// Answers `as_transformer` but not `as_transformer_mut`.
    struct HalfTransformer;

    impl Transformer for HalfTransformer {
        fn transform_one(&self, x: &Observation) -> ComponentResult<Observation> {
            Ok(x.clone())
        }
    }

    impl Component for HalfTransformer {
        fn as_transformer(&self) -> Option<&dyn Transformer> {
            Some(self)
        }
    }

    #[test]
    fn test_step_named_after_component() {
        let step = Step::new(StandardScaler::new());
        assert_eq!(step.name(), "StandardScaler");

        let step = Step::named("scale", StandardScaler::new());
        assert_eq!(step.name(), "scale");
    }

    #[test]
    fn test_transform_overlays_emitted_fields() {
        let mut step = Step::new(FuncTransformer::new(|x: &Observation| {
            let mut out = Observation::new();
            out.insert("double", x.get_f64("a").unwrap_or(0.0) * 2.0);
            out.insert("a", -1.0);
            out
        }));
        let x = Observation::new().with("a", 3.0).with("keep", "me");

        let out = step.transform(&x).unwrap();

        assert_eq!(out.get_f64("double"), Some(6.0));
        assert_eq!(out.get_f64("a"), Some(-1.0));
        assert_eq!(out.get("keep"), Some(&Value::from("me")));
        // Input is left untouched.
        assert_eq!(x.get_f64("a"), Some(3.0));
    }

    #[test]
    fn test_transform_updates_transformer_state() {
        let mut step = Step::new(StandardScaler::new());
        step.transform(&Observation::new().with("f", 10.0)).unwrap();

        assert_eq!(step.params()["features"]["f"]["mean"], serde_json::json!(10.0));
    }

    #[test]
    fn test_learn_on_transformer_is_unsupported() {
        let mut step = Step::new(StandardScaler::new());
        let err = step
            .learn(&Observation::new().with("f", 1.0), &Value::from(1.0))
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::UnsupportedOperation {
                operation: Operation::Learn,
                ..
            }
        ));
    }

    #[test]
    fn test_transform_on_predictor_is_unsupported() {
        let mut step = Step::new(LinearRegression::new());
        let err = step.transform(&Observation::new()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::UnsupportedOperation {
                operation: Operation::Transform,
                ..
            }
        ));
    }

    #[test]
    fn test_predict_and_learn_on_regressor() {
        let mut step = Step::new(LinearRegression::new());
        let x = Observation::new().with("f", 1.0);

        assert_eq!(step.predict(&x).unwrap(), Value::Number(0.0));
        step.learn(&x, &Value::from(1.0)).unwrap();
        assert!(step.predict(&x).unwrap().as_f64().unwrap() > 0.0);
    }

    #[test]
    fn test_capabilities_require_both_accessors() {
        assert!(HalfTransformer.capabilities().transform);

        let mut step = Step::new(HalfTransformer);
        assert!(!step.capabilities().transform);
        assert!(matches!(
            step.transform(&Observation::new()).unwrap_err(),
            PipelineError::UnsupportedOperation {
                operation: Operation::Transform,
                ..
            }
        ));
    }

    #[test]
    fn test_step_state_round_trip() {
        let mut source = Step::new(StandardScaler::new());
        source.transform(&Observation::new().with("f", 4.0)).unwrap();
        let bytes = source.save_state().unwrap().unwrap();

        let mut target = Step::new(StandardScaler::new());
        target.load_state(&bytes).unwrap();
        assert_eq!(target.params(), source.params());

        let stateless = Step::new(FuncTransformer::new(|x: &Observation| x.clone()));
        assert!(stateless.save_state().unwrap().is_none());
    }
}
