use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use mlswarm_core::{Table, TaskKind};

use crate::error::{EstimatorError, ServiceError};
use crate::registry::Service;
use crate::schema::{FieldSpec, PropertySchema};

use super::features::{self, Standardizer};
use super::{options, Estimator, EstimatorArgs, RunContext};

/// `simple-regressor`: linear regression fitted by batch gradient descent on
/// standardised features.
pub struct SimpleRegressorService {
    schema: PropertySchema,
    train_schema: PropertySchema,
}

impl SimpleRegressorService {
    pub fn new() -> Self {
        Self {
            schema: PropertySchema::new()
                .field(FieldSpec::string("target").required().help("Column to predict."))
                .field(
                    FieldSpec::string_list("features")
                        .help("Input columns. Defaults to every column except the target."),
                )
                .field(FieldSpec::boolean("fit_intercept").default(true)),
            train_schema: PropertySchema::new()
                .field(FieldSpec::float("learning_rate").default(0.01).min(1e-9))
                .field(
                    FieldSpec::integer("epochs")
                        .default(100)
                        .min(1.0)
                        .max(100_000.0),
                )
                .field(
                    FieldSpec::float("tolerance")
                        .default(1e-9)
                        .min(0.0)
                        .help("Stop once the loss improves by less than this."),
                ),
        }
    }
}

impl Default for SimpleRegressorService {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RegressorConfig {
    target: String,
    #[serde(default)]
    features: Vec<String>,
    #[serde(default = "default_true")]
    fit_intercept: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
struct TrainOptions {
    #[serde(default = "default_learning_rate")]
    learning_rate: f64,
    #[serde(default = "default_epochs")]
    epochs: u32,
    #[serde(default = "default_tolerance")]
    tolerance: f64,
}

fn default_learning_rate() -> f64 {
    0.01
}

fn default_epochs() -> u32 {
    100
}

fn default_tolerance() -> f64 {
    1e-9
}

impl Service for SimpleRegressorService {
    type Args = EstimatorArgs;
    type Instance = Box<dyn Estimator>;

    fn schema(&self) -> &PropertySchema {
        &self.schema
    }

    fn task_schema(&self, kind: TaskKind) -> Option<&PropertySchema> {
        match kind {
            TaskKind::Training => Some(&self.train_schema),
            TaskKind::Test | TaskKind::Predict => None,
        }
    }

    fn build(&self, args: EstimatorArgs) -> Result<Box<dyn Estimator>, ServiceError> {
        let config: RegressorConfig =
            serde_json::from_value(Value::Object(args.properties)).map_err(|e| {
                ServiceError::Construction {
                    service: "simple-regressor".to_string(),
                    reason: e.to_string(),
                }
            })?;
        Ok(Box::new(SimpleRegressor { config, model: None }))
    }
}

/// Fitted parameters, persisted as `model.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegressionModel {
    target: String,
    features: Vec<String>,
    scaler: Standardizer,
    weights: Vec<f64>,
    intercept: f64,
}

impl RegressionModel {
    fn predict_one(&self, x: &[f64]) -> f64 {
        let z = self.scaler.transform(x);
        self.intercept + z.iter().zip(&self.weights).map(|(a, w)| a * w).sum::<f64>()
    }
}

struct SimpleRegressor {
    config: RegressorConfig,
    model: Option<RegressionModel>,
}

impl SimpleRegressor {
    fn fitted(&self, operation: &'static str) -> Result<&RegressionModel, EstimatorError> {
        self.model
            .as_ref()
            .ok_or_else(|| EstimatorError::execution(operation, "no trained model loaded"))
    }

    fn predictions(
        &self,
        data: &Table,
        ctx: &RunContext<'_>,
        operation: &'static str,
    ) -> Result<Vec<f64>, EstimatorError> {
        let model = self.fitted(operation)?;
        let x = features::numeric_matrix(data, &model.features, operation)?;
        let mut out = Vec::with_capacity(x.len());
        for (i, row) in x.iter().enumerate() {
            if i % 1024 == 0 {
                ctx.cancel.check()?;
            }
            out.push(model.predict_one(row));
        }
        Ok(out)
    }
}

impl Estimator for SimpleRegressor {
    fn train(&mut self, data: &Table, ctx: &RunContext<'_>) -> Result<Value, EstimatorError> {
        const OP: &str = "train";
        let opts: TrainOptions = options(ctx.properties, OP)?;
        if opts.learning_rate <= 0.0 {
            return Err(EstimatorError::execution(OP, "learning_rate must be positive"));
        }
        if data.is_empty() {
            return Err(EstimatorError::execution(OP, "no rows to train on"));
        }

        let target = &self.config.target;
        let columns = features::feature_columns(data, Some(target), &self.config.features, OP)?;
        let raw = features::numeric_matrix(data, &columns, OP)?;
        let y = features::numeric_target(data, target, OP)?;

        let scaler = Standardizer::fit(&raw);
        let x: Vec<Vec<f64>> = raw.iter().map(|p| scaler.transform(p)).collect();
        let n = x.len() as f64;
        let dim = columns.len();

        let mut weights = vec![0.0; dim];
        let mut intercept = 0.0;
        let mut loss = f64::INFINITY;
        let mut epochs_run = 0;

        for _ in 0..opts.epochs {
            ctx.cancel.check()?;
            epochs_run += 1;

            let mut grad_w = vec![0.0; dim];
            let mut grad_b = 0.0;
            let mut sq = 0.0;
            for (xi, yi) in x.iter().zip(&y) {
                let pred = intercept + xi.iter().zip(&weights).map(|(a, w)| a * w).sum::<f64>();
                let err = pred - yi;
                sq += err * err;
                for (g, a) in grad_w.iter_mut().zip(xi) {
                    *g += err * a;
                }
                grad_b += err;
            }

            for (w, g) in weights.iter_mut().zip(&grad_w) {
                *w -= opts.learning_rate * 2.0 * g / n;
            }
            if self.config.fit_intercept {
                intercept -= opts.learning_rate * 2.0 * grad_b / n;
            }

            let current = sq / n;
            if !current.is_finite() {
                return Err(EstimatorError::execution(OP, "training diverged; lower learning_rate"));
            }
            let improved = loss - current;
            loss = current;
            if improved.abs() < opts.tolerance {
                debug!(epoch = epochs_run, loss, "converged");
                break;
            }
        }

        let model = RegressionModel {
            target: target.clone(),
            features: columns,
            scaler,
            weights,
            intercept,
        };
        let model_path = match ctx.report_dir {
            Some(dir) => Some(features::save_model(dir, &model)?),
            None => None,
        };
        info!(epochs = epochs_run, loss, rows = x.len(), "trained simple-regressor");

        let report = json!({
            "epochs": epochs_run,
            "loss": loss,
            "rows": x.len(),
            "features": model.features,
            "weights": model.weights,
            "intercept": model.intercept,
            "model_path": model_path,
        });
        self.model = Some(model);
        Ok(report)
    }

    fn load(&mut self, report_dir: &Path) -> Result<(), EstimatorError> {
        let model: RegressionModel = features::load_model(report_dir)?;
        if model.target != self.config.target {
            return Err(EstimatorError::execution(
                "load",
                format!(
                    "model was trained for target '{}', estimator targets '{}'",
                    model.target, self.config.target
                ),
            ));
        }
        self.model = Some(model);
        Ok(())
    }

    fn test(&mut self, data: &Table, ctx: &RunContext<'_>) -> Result<Value, EstimatorError> {
        const OP: &str = "test";
        let predicted = self.predictions(data, ctx, OP)?;
        let actual = features::numeric_target(data, &self.config.target, OP)?;
        if actual.is_empty() {
            return Err(EstimatorError::execution(OP, "no rows to test on"));
        }

        let n = actual.len() as f64;
        let mean = actual.iter().sum::<f64>() / n;
        let mut sq = 0.0;
        let mut abs = 0.0;
        let mut total = 0.0;
        for (p, a) in predicted.iter().zip(&actual) {
            sq += (p - a).powi(2);
            abs += (p - a).abs();
            total += (a - mean).powi(2);
        }
        let r2 = if total > 0.0 {
            1.0 - sq / total
        } else if sq == 0.0 {
            1.0
        } else {
            0.0
        };

        Ok(json!({
            "rows": actual.len(),
            "mse": sq / n,
            "mae": abs / n,
            "r2": r2,
        }))
    }

    fn predict(&mut self, data: &Table, ctx: &RunContext<'_>) -> Result<Value, EstimatorError> {
        let predicted = self.predictions(data, ctx, "predict")?;
        Ok(json!({
            "target": self.config.target,
            "predictions": predicted,
        }))
    }

    fn dispose(&mut self) {
        self.model = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelFlag;
    use mlswarm_core::{FieldValue, Properties};

    fn line(points: &[(i64, i64)]) -> Table {
        Table::from_rows(
            vec!["x".into(), "y".into()],
            points
                .iter()
                .map(|(x, y)| vec![FieldValue::Integer(*x), FieldValue::Integer(*y)])
                .collect(),
        )
        .unwrap()
    }

    fn build(properties: Value) -> Box<dyn Estimator> {
        let service = SimpleRegressorService::new();
        let properties = service.schema().validate(&properties).unwrap();
        service.build(EstimatorArgs { properties }).unwrap()
    }

    fn train_props(properties: Value) -> Properties {
        SimpleRegressorService::new()
            .train_schema
            .validate(&properties)
            .unwrap()
    }

    #[test]
    fn fits_a_line_and_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let data = line(&[(0, 1), (1, 3), (2, 5), (3, 7)]);
        let cancel = CancelFlag::new();
        let props = train_props(serde_json::json!({"learning_rate": 0.1, "epochs": 2000}));
        let ctx = RunContext {
            report_dir: Some(dir.path()),
            properties: &props,
            cancel: &cancel,
        };

        let mut est = build(serde_json::json!({"target": "y"}));
        let report = est.train(&data, &ctx).unwrap();
        assert!(report["loss"].as_f64().unwrap() < 1e-6);
        assert!(dir.path().join(features::MODEL_FILE).is_file());

        let empty = Properties::new();
        let eval = RunContext {
            report_dir: None,
            properties: &empty,
            cancel: &cancel,
        };
        let mut fresh = build(serde_json::json!({"target": "y"}));
        fresh.load(dir.path()).unwrap();
        let metrics = fresh.test(&line(&[(4, 9), (5, 11)]), &eval).unwrap();
        assert!(metrics["mse"].as_f64().unwrap() < 1e-4);

        let predicted = fresh.predict(&line(&[(10, 0)]), &eval).unwrap();
        let p = predicted["predictions"][0].as_f64().unwrap();
        assert!((p - 21.0).abs() < 1e-2, "{p}");
    }

    #[test]
    fn cancelled_training_stops() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let props = train_props(serde_json::json!({}));
        let ctx = RunContext {
            report_dir: None,
            properties: &props,
            cancel: &cancel,
        };
        let err = build(serde_json::json!({"target": "y"}))
            .train(&line(&[(0, 0), (1, 1)]), &ctx)
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_without_model_fails() {
        let cancel = CancelFlag::new();
        let props = Properties::new();
        let ctx = RunContext {
            report_dir: None,
            properties: &props,
            cancel: &cancel,
        };
        let err = build(serde_json::json!({"target": "y"}))
            .test(&line(&[(0, 0)]), &ctx)
            .unwrap_err();
        assert!(matches!(err, EstimatorError::Execution { operation: "test", .. }));
    }

    #[test]
    fn missing_target_column_fails() {
        let cancel = CancelFlag::new();
        let props = train_props(serde_json::json!({}));
        let ctx = RunContext {
            report_dir: None,
            properties: &props,
            cancel: &cancel,
        };
        let err = build(serde_json::json!({"target": "price"}))
            .train(&line(&[(0, 0)]), &ctx)
            .unwrap_err();
        assert!(err.to_string().contains("price"));
    }

    #[test]
    fn epochs_bounded() {
        let service = SimpleRegressorService::new();
        let errs = service
            .task_schema(TaskKind::Training)
            .unwrap()
            .validate(&serde_json::json!({"epochs": 0}))
            .unwrap_err();
        assert!(errs.get("epochs").is_some());
        assert!(service.task_schema(TaskKind::Predict).is_none());
    }
}
