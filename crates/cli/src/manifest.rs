use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use mlswarm_core::TaskKind;
use mlswarm_services::RawProperties;
use mlswarm_tasks::IgnoreFeatures;

/// A job manifest: datasets with their chunks, estimators and tasks.
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub datasets: Vec<DatasetEntry>,
    #[serde(default)]
    pub estimators: Vec<EstimatorEntry>,
    #[serde(default)]
    pub tasks: Vec<TaskEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatasetEntry {
    pub name: String,
    #[serde(default)]
    pub chunks: Vec<ChunkEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChunkEntry {
    pub content: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    #[serde(default = "default_parser")]
    pub service: String,
    #[serde(default)]
    pub ignore_features: Option<IgnoreSpec>,
    #[serde(default)]
    pub to_lowercase: bool,
    #[serde(default)]
    pub properties: Option<toml::Value>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// `ignore_features = "a,b"` or `ignore_features = ["a", "b"]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IgnoreSpec {
    Joined(String),
    List(Vec<String>),
}

impl From<IgnoreSpec> for IgnoreFeatures {
    fn from(spec: IgnoreSpec) -> Self {
        match spec {
            IgnoreSpec::Joined(s) => IgnoreFeatures::Joined(s),
            IgnoreSpec::List(l) => IgnoreFeatures::List(l),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EstimatorEntry {
    /// Name other manifest entries use to refer to this estimator.
    pub key: String,
    #[serde(default)]
    pub name: Option<String>,
    pub service: String,
    #[serde(default)]
    pub properties: Option<toml::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskEntry {
    pub key: String,
    pub kind: String,
    /// Estimator key.
    pub estimator: String,
    /// Dataset names; every chunk of each dataset is used, in order.
    pub datasets: Vec<String>,
    /// Key of the training task a test or predict task runs against.
    #[serde(default)]
    pub training: Option<String>,
    #[serde(default = "default_owner")]
    pub owner: String,
    #[serde(default)]
    pub properties: Option<toml::Value>,
}

impl TaskEntry {
    pub fn task_kind(&self) -> Result<TaskKind> {
        self.kind
            .parse::<TaskKind>()
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("task '{}'", self.key))
    }
}

fn default_delimiter() -> char {
    ','
}

fn default_parser() -> String {
    "csv".to_string()
}

fn default_owner() -> String {
    "cli".to_string()
}

/// Properties as written in the manifest: a TOML table, or a string holding JSON.
pub fn raw_properties(value: Option<toml::Value>) -> Result<RawProperties> {
    match value {
        None => Ok(RawProperties::default()),
        Some(toml::Value::String(s)) => Ok(RawProperties::Encoded(s)),
        Some(other) => {
            let json = serde_json::to_value(other).context("properties are not representable as JSON")?;
            Ok(RawProperties::Decoded(json))
        }
    }
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid manifest {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}
