use proptest::prelude::*;
use serde_json::json;
use std::collections::BTreeMap;
use streamlearne_rs::components::{FuncTransformer, LinearRegression, Select, StandardScaler};
use streamlearne_rs::{
    ComponentResult, Component, Node, NodeKind, Observation, Operation, Pipeline, PipelineConfig,
    PipelineError, Step, TraceOutcome, Transformer, Union, Value,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn scaler_regression() -> Pipeline {
    Pipeline::new(Step::new(StandardScaler::new()))
        .then(Step::new(LinearRegression::new()))
        .unwrap()
}

fn params_of(model: &Pipeline, name: &str) -> serde_json::Value {
    model.get(name).unwrap().params()
}

fn add(name: &str, delta: f64) -> Step {
    Step::named(
        name,
        FuncTransformer::new(move |x: &Observation| {
            Observation::new().with("f", x.get_f64("f").unwrap_or(0.0) + delta)
        }),
    )
}

fn emits(name: &str, out: Observation) -> Node {
    Step::named(name, FuncTransformer::new(move |_: &Observation| out.clone())).into()
}

#[test]
fn test_predict_updates_transformers_but_not_terminal() {
    init_tracing();
    let x = Observation::new().with("f", 10.0).with("g", -2.0);

    let mut predicted = scaler_regression();
    let mut transformed = scaler_regression();
    predicted.predict(&x).unwrap();
    transformed.transform(&x).unwrap();

    assert_eq!(
        params_of(&predicted, "StandardScaler"),
        params_of(&transformed, "StandardScaler")
    );
    assert_eq!(params_of(&predicted, "StandardScaler")["features"]["f"]["count"], json!(1));
    assert_eq!(
        params_of(&predicted, "LinearRegression"),
        json!({ "weights": {}, "intercept": 0.0 })
    );
}

#[test]
fn test_learn_updates_terminal_and_transformers() {
    init_tracing();
    let x = Observation::new().with("f", 3.0);

    let mut learned = scaler_regression();
    let mut transformed = scaler_regression();
    learned.learn(&x, &Value::from(1.0)).unwrap();
    transformed.transform(&x).unwrap();

    assert_eq!(
        params_of(&learned, "StandardScaler"),
        params_of(&transformed, "StandardScaler")
    );
    let intercept = params_of(&learned, "LinearRegression")["intercept"]
        .as_f64()
        .unwrap();
    assert!(intercept > 0.0);
}

#[test]
fn test_repeated_predict_never_changes_terminal() {
    let mut model = scaler_regression();
    for i in 0..20 {
        model
            .predict(&Observation::new().with("f", i as f64))
            .unwrap();
    }
    assert_eq!(params_of(&model, "LinearRegression")["weights"], json!({}));
    assert_eq!(params_of(&model, "StandardScaler")["features"]["f"]["count"], json!(20));
}

#[test]
fn test_worked_example_without_update_on_learn() {
    init_tracing();
    let mut model = scaler_regression()
        .with_config(PipelineConfig::default().with_update_unsupervised_on_learn(false));
    let x = Observation::new().with("f", 10.0);

    let y_pred = model.predict(&x).unwrap();
    assert_eq!(y_pred, Value::Number(0.0));
    let scaler_after_predict = params_of(&model, "StandardScaler");
    assert_eq!(scaler_after_predict["features"]["f"]["mean"], json!(10.0));

    model.learn(&x, &Value::from(5.0)).unwrap();

    assert_eq!(params_of(&model, "StandardScaler"), scaler_after_predict);
    assert!(params_of(&model, "LinearRegression")["intercept"].as_f64().unwrap() > 0.0);
}

#[test]
fn test_worked_example_with_default_config() {
    let mut model = scaler_regression();
    let x = Observation::new().with("f", 10.0);

    model.predict(&x).unwrap();
    model.learn(&x, &Value::from(5.0)).unwrap();

    // The learn pass is a second observation for the scaler.
    assert_eq!(params_of(&model, "StandardScaler")["features"]["f"]["count"], json!(2));
}

fn nested_scalers(update_on_learn: bool) -> Pipeline {
    let union = Node::from(Step::named("branch_scaler", StandardScaler::new()))
        .union(emits("bias", Observation::new().with("bias", 1.0)))
        .unwrap();
    let inner = Pipeline::new(Step::named("inner_scaler", StandardScaler::new())).with_name("inner");
    Pipeline::new(union)
        .then(inner)
        .unwrap()
        .then(Step::new(LinearRegression::new()))
        .unwrap()
        .with_config(PipelineConfig::default().with_update_unsupervised_on_learn(update_on_learn))
}

#[test]
fn test_update_on_learn_flag_reaches_branches_and_nested_pipelines() {
    init_tracing();
    let x = Observation::new().with("f", 4.0).with("g", 1.0);

    for (update_on_learn, expected) in [(false, 1), (true, 2)] {
        let mut model = nested_scalers(update_on_learn);
        model.predict(&x).unwrap();
        model.learn(&x, &Value::from(3.0)).unwrap();

        assert_eq!(
            params_of(&model, "branch_scaler")["features"]["f"]["count"],
            json!(expected)
        );
        assert_eq!(
            params_of(&model, "inner_scaler")["features"]["g"]["count"],
            json!(expected)
        );
        assert!(params_of(&model, "LinearRegression")["intercept"].as_f64().unwrap() > 0.0);
    }
}

#[test]
fn test_same_name_in_branch_and_top_level_stays_distinct() {
    let union = Node::from(Step::new(StandardScaler::new()))
        .union(emits("bias", Observation::new().with("bias", 1.0)))
        .unwrap();
    let mut model = Pipeline::new(union)
        .then(Step::new(StandardScaler::new()))
        .unwrap()
        .then(Step::new(LinearRegression::new()))
        .unwrap();

    model.transform(&Observation::new().with("f", 1.0)).unwrap();

    // The branch scaler sees the raw input, the top-level one the union output.
    assert!(params_of(&model, "StandardScaler")["features"]["bias"].is_null());
    assert_eq!(
        params_of(&model, "StandardScaler1")["features"]["bias"]["count"],
        json!(1)
    );
}

#[test]
fn test_pipeline_state_survives_a_rebuild() {
    init_tracing();
    let mut trained = nested_scalers(true);
    for i in 0..30 {
        let x = Observation::new().with("f", i as f64).with("g", (i % 3) as f64);
        trained.learn(&x, &Value::from(i as f64 * 0.5)).unwrap();
    }

    let blob = streamlearne_rs::serialization::encode_pipeline_state(&trained.save_state().unwrap())
        .unwrap();
    let mut rebuilt = nested_scalers(true);
    rebuilt
        .load_state(&streamlearne_rs::serialization::decode_pipeline_state(&blob).unwrap())
        .unwrap();

    let x = Observation::new().with("f", 7.0).with("g", 1.0);
    let expected = trained.predict(&x).unwrap().as_f64().unwrap();
    let got = rebuilt.predict(&x).unwrap().as_f64().unwrap();
    assert!((expected - got).abs() < 1e-9, "{expected} vs {got}");
}

#[test]
fn test_unsupported_learn_mutates_nothing() {
    let mut model = Pipeline::new(Step::new(StandardScaler::new()));
    let err = model
        .learn(&Observation::new().with("f", 1.0), &Value::from(1.0))
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::UnsupportedOperation {
            operation: Operation::Learn,
            ..
        }
    ));
    assert_eq!(params_of(&model, "StandardScaler")["features"], json!({}));
}

#[test]
fn test_union_collision_in_pipeline_trace() {
    init_tracing();
    let union = emits("B1", Observation::new().with("a", 1.0))
        .union(emits("B2", Observation::new().with("a", 2.0).with("b", 3.0)))
        .unwrap();
    let mut model = Pipeline::new(union)
        .then(Step::new(LinearRegression::new()))
        .unwrap();

    let trace = model.debug(&Observation::new()).unwrap();

    let union_entry = trace.entry("B1 + B2").unwrap();
    assert_eq!(union_entry.kind, NodeKind::Union);
    assert_eq!(
        union_entry.observation,
        Observation::new().with("a", 2.0).with("b", 3.0)
    );
    assert_eq!(union_entry.collisions.len(), 1);
    assert_eq!(union_entry.collisions[0].key, "a");
    assert_eq!(union_entry.collisions[0].overwritten, "B1");
    assert_eq!(union_entry.collisions[0].winner, "B2");

    let children: Vec<(&str, usize)> = trace
        .entries
        .iter()
        .filter(|e| e.depth == 1)
        .map(|e| (e.label.as_str(), e.position))
        .collect();
    assert_eq!(children, vec![("B1", 0), ("B2", 1)]);
}

#[test]
fn test_debug_matches_predict() {
    let x = Observation::new().with("f", 4.0).with("g", 1.0);
    let warmup = [
        (Observation::new().with("f", 1.0).with("g", 0.0), 2.0),
        (Observation::new().with("f", 2.0).with("g", 1.0), 3.0),
    ];

    let mut debugged = scaler_regression();
    let mut predicted = scaler_regression();
    for (xi, yi) in &warmup {
        debugged.learn(xi, &Value::from(*yi)).unwrap();
        predicted.learn(xi, &Value::from(*yi)).unwrap();
    }

    let trace = debugged.debug(&x).unwrap();
    let y_pred = predicted.predict(&x).unwrap();

    assert_eq!(trace.prediction(), Some(&y_pred));
    assert_eq!(debugged.params(), predicted.params());

    let contributions = trace.contributions().unwrap();
    let total: f64 = contributions.iter().map(|c| c.contribution).sum();
    assert!((total - y_pred.as_f64().unwrap()).abs() < 1e-9);
    assert!(contributions.iter().any(|c| c.feature == "Intercept"));
}

#[test]
fn test_debug_twice_on_stateless_pipeline_is_identical() {
    let mut model = Pipeline::new(add("a", 1.0))
        .then(add("b", 2.0))
        .unwrap()
        .then(Step::new(LinearRegression::new()))
        .unwrap();
    let x = Observation::new().with("f", 1.0);

    let first = model.debug(&x).unwrap();
    let second = model.debug(&x).unwrap();

    assert_eq!(first, second);
    assert!(matches!(first.outcome, TraceOutcome::Breakdown { .. }));
}

#[test]
fn test_debug_twice_shows_scaler_advancing() {
    let mut model = scaler_regression();
    let first = model.debug(&Observation::new().with("f", 10.0)).unwrap();
    let second = model.debug(&Observation::new().with("f", 20.0)).unwrap();

    // First value is its own mean; the second sits one std above the new mean.
    assert_eq!(first.entry("StandardScaler").unwrap().observation.get_f64("f"), Some(0.0));
    let z = second
        .entry("StandardScaler")
        .unwrap()
        .observation
        .get_f64("f")
        .unwrap();
    assert!((z - 1.0).abs() < 1e-12);
    assert_eq!(params_of(&model, "LinearRegression")["weights"], json!({}));
}

#[test]
fn test_debug_render_lists_every_node() {
    let union = Node::from(Step::named("keep", Select::new(["f"])))
        .union(Step::new(StandardScaler::new()))
        .unwrap();
    let mut model = Pipeline::new(union)
        .then(Step::new(LinearRegression::new()))
        .unwrap();

    let rendered = model.debug(&Observation::new().with("f", 2.0)).unwrap().to_string();

    assert!(rendered.starts_with("0. Input"));
    assert!(rendered.contains("1. keep + StandardScaler"));
    assert!(rendered.contains("  1.1. keep"));
    assert!(rendered.contains("  1.2. StandardScaler"));
    assert!(rendered.contains("2. LinearRegression"));
    assert!(rendered.contains("Intercept"));
    assert!(rendered.trim_end().ends_with("Prediction: 0.0000"));
}

#[test]
fn test_three_transformers_equal_manual_chaining() {
    let mut model = Pipeline::new(Step::new(StandardScaler::new()))
        .then(add("shift", 1.0))
        .unwrap()
        .then(Step::named(
            "square",
            FuncTransformer::new(|x: &Observation| {
                let f = x.get_f64("f").unwrap_or(0.0);
                Observation::new().with("f", f * f)
            }),
        ))
        .unwrap()
        .then(Step::new(LinearRegression::new()))
        .unwrap();

    let mut scaler = StandardScaler::new();
    let xs = [3.0, 5.0, -1.0, 8.0];
    for f in xs {
        let x = Observation::new().with("f", f).with("tag", "t");
        let out = model.transform(&x).unwrap();

        scaler.update(&x).unwrap();
        let mut manual = x.clone();
        manual.overlay(scaler.transform_one(&x).unwrap());
        let shifted = manual.get_f64("f").unwrap() + 1.0;
        manual.insert("f", shifted * shifted);

        assert_eq!(out, manual);
    }
}

#[test]
fn test_non_transformer_in_the_middle_is_construction_error() {
    let err = Pipeline::new(Step::new(StandardScaler::new()))
        .then(Step::new(LinearRegression::new()))
        .unwrap()
        .then(Step::new(StandardScaler::new()))
        .unwrap_err();

    assert!(matches!(err, PipelineError::Construction(_)));
    assert!(err.to_string().starts_with("Construction error"));
}

#[derive(Debug, thiserror::Error)]
#[error("sensor offline")]
struct SensorOffline;

struct Flaky;

impl Transformer for Flaky {
    fn transform_one(&self, x: &Observation) -> ComponentResult<Observation> {
        if x.contains_key("bad") {
            Err(SensorOffline.into())
        } else {
            Ok(Observation::new())
        }
    }
}

impl Component for Flaky {
    fn as_transformer(&self) -> Option<&dyn Transformer> {
        Some(self)
    }

    fn as_transformer_mut(&mut self) -> Option<&mut dyn Transformer> {
        Some(self)
    }
}

#[test]
fn test_component_errors_propagate_unchanged() {
    let mut model = Pipeline::new(Step::new(Flaky))
        .then(Step::new(LinearRegression::new()))
        .unwrap();

    let err = model
        .learn(&Observation::new().with("bad", true), &Value::from(1.0))
        .unwrap_err();
    match err {
        PipelineError::Component(inner) => assert!(inner.downcast_ref::<SensorOffline>().is_some()),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(params_of(&model, "LinearRegression")["weights"], json!({}));

    // A failed observation does not poison the next one.
    model
        .learn(&Observation::new().with("f", 1.0), &Value::from(1.0))
        .unwrap();
}

#[test]
fn test_nested_union_branch_contributes_full_output() {
    let inner = Pipeline::new(add("plus_one", 1.0))
        .then(add("plus_two", 2.0))
        .unwrap()
        .with_name("shifted");
    let mut union = Union::new(vec![
        inner.into(),
        emits("flag", Observation::new().with("z", true)),
    ])
    .unwrap();

    let out = union
        .transform(&Observation::new().with("f", 1.0).with("g", 5.0))
        .unwrap();

    // The nested pipeline passes its input fields through, the step branch does not.
    assert_eq!(
        out,
        Observation::new().with("f", 4.0).with("g", 5.0).with("z", true)
    );
    assert!(union.last_collisions().is_empty());
}

fn feature_map() -> impl Strategy<Value = BTreeMap<String, f64>> {
    prop::collection::btree_map("[a-e]", -100.0f64..100.0, 0..4)
}

proptest! {
    #[test]
    fn prop_union_merge_is_last_writer_wins(branches in prop::collection::vec(feature_map(), 1..5)) {
        let nodes: Vec<Node> = branches
            .iter()
            .enumerate()
            .map(|(i, map)| emits(&format!("b{i}"), map.iter().map(|(k, v)| (k.as_str(), *v)).collect()))
            .collect();
        let mut union = Union::new(nodes).unwrap();

        let out = union.transform(&Observation::new().with("input", 1.0)).unwrap();

        let mut expected: BTreeMap<String, f64> = BTreeMap::new();
        let mut expected_collisions = 0;
        for map in &branches {
            for (k, v) in map {
                if expected.insert(k.clone(), *v).is_some() {
                    expected_collisions += 1;
                }
            }
        }
        let expected: Observation = expected.into_iter().collect();
        prop_assert_eq!(out, expected);
        prop_assert_eq!(union.last_collisions().len(), expected_collisions);
    }

    #[test]
    fn prop_sequential_chain_matches_manual_fold(
        start in -1000.0f64..1000.0,
        deltas in prop::collection::vec(-10.0f64..10.0, 1..6),
    ) {
        let mut model = Pipeline::new(add("s0", deltas[0]));
        for (i, d) in deltas.iter().enumerate().skip(1) {
            model = model.then(add(&format!("s{i}"), *d)).unwrap();
        }

        let out = model.transform(&Observation::new().with("f", start)).unwrap();

        let mut expected = start;
        for d in &deltas {
            expected += d;
        }
        prop_assert_eq!(out.get_f64("f"), Some(expected));
    }

    #[test]
    fn prop_predict_leaves_regression_untouched(values in prop::collection::vec(-50.0f64..50.0, 1..20)) {
        let mut model = scaler_regression();
        for v in &values {
            model.predict(&Observation::new().with("f", *v)).unwrap();
        }
        prop_assert_eq!(params_of(&model, "LinearRegression")["weights"].clone(), json!({}));
        prop_assert_eq!(
            params_of(&model, "StandardScaler")["features"]["f"]["count"].clone(),
            json!(values.len())
        );
    }
}
