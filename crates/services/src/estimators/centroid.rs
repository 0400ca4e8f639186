use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use mlswarm_core::{Table, TaskKind};

use crate::error::{EstimatorError, ServiceError};
use crate::registry::Service;
use crate::schema::{FieldSpec, PropertySchema};

use super::features::{self, squared_euclidean, Standardizer};
use super::{options, Estimator, EstimatorArgs, RunContext};

/// `nearest-centroid-classifier`: one mean vector per class, prediction is the
/// class of the closest centroid.
pub struct NearestCentroidService {
    schema: PropertySchema,
    train_schema: PropertySchema,
}

impl NearestCentroidService {
    pub fn new() -> Self {
        Self {
            schema: PropertySchema::new()
                .field(FieldSpec::string("target").required().help("Class label column."))
                .field(FieldSpec::string_list("features")),
            train_schema: PropertySchema::new().field(
                FieldSpec::boolean("normalize")
                    .default(true)
                    .help("Standardise features before computing centroids."),
            ),
        }
    }
}

impl Default for NearestCentroidService {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Deserialize)]
struct CentroidConfig {
    target: String,
    #[serde(default)]
    features: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct TrainOptions {
    #[serde(default = "default_normalize")]
    normalize: bool,
}

fn default_normalize() -> bool {
    true
}

impl Service for NearestCentroidService {
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
        let config: CentroidConfig =
            serde_json::from_value(Value::Object(args.properties)).map_err(|e| {
                ServiceError::Construction {
                    service: "nearest-centroid-classifier".to_string(),
                    reason: e.to_string(),
                }
            })?;
        Ok(Box::new(NearestCentroid { config, model: None }))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Centroid {
    label: String,
    count: usize,
    center: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CentroidModel {
    target: String,
    features: Vec<String>,
    scaler: Standardizer,
    centroids: Vec<Centroid>,
}

impl CentroidModel {
    /// Closest class and its Euclidean distance.
    fn classify(&self, x: &[f64]) -> (&str, f64) {
        let z = self.scaler.transform(x);
        let mut best = ("", f64::MAX);
        for c in &self.centroids {
            let d = squared_euclidean(&z, &c.center);
            if d < best.1 {
                best = (c.label.as_str(), d);
            }
        }
        (best.0, best.1.sqrt())
    }
}

struct NearestCentroid {
    config: CentroidConfig,
    model: Option<CentroidModel>,
}

impl NearestCentroid {
    fn classify_all(
        &self,
        data: &Table,
        ctx: &RunContext<'_>,
        operation: &'static str,
    ) -> Result<Vec<(String, f64)>, EstimatorError> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| EstimatorError::execution(operation, "no trained model loaded"))?;
        let x = features::numeric_matrix(data, &model.features, operation)?;
        let mut out = Vec::with_capacity(x.len());
        for (i, row) in x.iter().enumerate() {
            if i % 1024 == 0 {
                ctx.cancel.check()?;
            }
            let (label, distance) = model.classify(row);
            out.push((label.to_string(), distance));
        }
        Ok(out)
    }
}

impl Estimator for NearestCentroid {
    fn train(&mut self, data: &Table, ctx: &RunContext<'_>) -> Result<Value, EstimatorError> {
        const OP: &str = "train";
        let opts: TrainOptions = options(ctx.properties, OP)?;
        if data.is_empty() {
            return Err(EstimatorError::execution(OP, "no rows to train on"));
        }

        let target = &self.config.target;
        let columns = features::feature_columns(data, Some(target), &self.config.features, OP)?;
        let raw = features::numeric_matrix(data, &columns, OP)?;
        let labels = features::labels(data, target, OP)?;

        let scaler = if opts.normalize {
            Standardizer::fit(&raw)
        } else {
            Standardizer::identity(columns.len())
        };

        // Sums per class, in first-seen label order.
        let mut sums: IndexMap<String, (usize, Vec<f64>)> = IndexMap::new();
        for (row, label) in raw.iter().zip(labels) {
            ctx.cancel.check()?;
            let z = scaler.transform(row);
            let entry = sums
                .entry(label)
                .or_insert_with(|| (0, vec![0.0; columns.len()]));
            entry.0 += 1;
            for (s, v) in entry.1.iter_mut().zip(&z) {
                *s += v;
            }
        }

        let centroids: Vec<Centroid> = sums
            .into_iter()
            .map(|(label, (count, sum))| Centroid {
                label,
                count,
                center: sum.into_iter().map(|s| s / count as f64).collect(),
            })
            .collect();

        let model = CentroidModel {
            target: target.clone(),
            features: columns,
            scaler,
            centroids,
        };
        let model_path = match ctx.report_dir {
            Some(dir) => Some(features::save_model(dir, &model)?),
            None => None,
        };
        info!(
            classes = model.centroids.len(),
            rows = raw.len(),
            "trained nearest-centroid-classifier"
        );

        let counts: IndexMap<&str, usize> = model
            .centroids
            .iter()
            .map(|c| (c.label.as_str(), c.count))
            .collect();
        let report = json!({
            "rows": raw.len(),
            "features": model.features,
            "normalize": opts.normalize,
            "classes": counts,
            "model_path": model_path,
        });
        self.model = Some(model);
        Ok(report)
    }

    fn load(&mut self, report_dir: &Path) -> Result<(), EstimatorError> {
        let model: CentroidModel = features::load_model(report_dir)?;
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
        let predicted = self.classify_all(data, ctx, OP)?;
        let actual = features::labels(data, &self.config.target, OP)?;
        if actual.is_empty() {
            return Err(EstimatorError::execution(OP, "no rows to test on"));
        }

        // Known classes first, then labels only seen in the test data.
        let mut labels: Vec<String> = self
            .model
            .iter()
            .flat_map(|m| m.centroids.iter().map(|c| c.label.clone()))
            .collect();
        for a in &actual {
            if !labels.contains(a) {
                labels.push(a.clone());
            }
        }
        let index = |l: &str| labels.iter().position(|x| x == l);

        let mut matrix = vec![vec![0usize; labels.len()]; labels.len()];
        let mut correct = 0usize;
        for ((p, _), a) in predicted.iter().zip(&actual) {
            if p == a {
                correct += 1;
            }
            if let (Some(i), Some(j)) = (index(a), index(p)) {
                matrix[i][j] += 1;
            }
        }

        Ok(json!({
            "rows": actual.len(),
            "accuracy": correct as f64 / actual.len() as f64,
            "labels": labels,
            "confusion_matrix": matrix,
        }))
    }

    fn predict(&mut self, data: &Table, ctx: &RunContext<'_>) -> Result<Value, EstimatorError> {
        let predicted = self.classify_all(data, ctx, "predict")?;
        let rows: Vec<Value> = predicted
            .into_iter()
            .map(|(label, distance)| json!({"label": label, "distance": distance}))
            .collect();
        Ok(json!({
            "target": self.config.target,
            "predictions": rows,
        }))
    }

    fn dispose(&mut self) {
        self.model = None;
    }
}
