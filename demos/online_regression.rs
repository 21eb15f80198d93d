//! Online regression on a synthetic stream.
//!
//! Run with `RUST_LOG=streamlearne_rs=debug` to see the pipeline's logs.

use streamlearne_rs::components::{FuncTransformer, LinearRegression, Select, StandardScaler};
use streamlearne_rs::{Node, Observation, Pipeline, PipelineError, Step, Value};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), PipelineError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // raw features and their squares, scaled, then a linear model
    let features = Node::from(Step::new(Select::new(["size", "rooms"])))
        .union(Step::named(
            "squares",
            FuncTransformer::new(|x: &Observation| {
                x.numeric()
                    .map(|(k, v)| (format!("{k}_sq"), v * v))
                    .collect()
            }),
        ))?;
    let mut model = Pipeline::new(features)
        .then(Step::new(StandardScaler::new()))?
        .then(Step::new(LinearRegression::new().with_lr(0.05)))?;

    println!("Pipeline: {model}");

    let mut abs_error = 0.0;
    for i in 0..2_000 {
        let size = 30.0 + (i * 7 % 120) as f64;
        let rooms = 1.0 + (i % 5) as f64;
        let price = 2.0 * size + 15.0 * rooms + 0.01 * size * size + 50.0;
        let x = Observation::new().with("size", size).with("rooms", rooms);

        let y_pred = model.predict(&x)?;
        abs_error += (y_pred.as_f64().unwrap_or(0.0) - price).abs();
        model.learn(&x, &Value::from(price))?;

        if (i + 1) % 500 == 0 {
            println!("after {:>5} samples: MAE = {:.3}", i + 1, abs_error / (i + 1) as f64);
        }
    }

    let trace = model.debug(&Observation::new().with("size", 80.0).with("rooms", 3.0))?;
    println!("\n{trace:.3}");

    let scaler = model.get("StandardScaler")?;
    println!("Scaler state: {}", scaler.params());

    Ok(())
}
