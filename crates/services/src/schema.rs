//! Declared property schemas with lenient coercion and field-keyed errors.
//!
//! A [`PropertySchema`] is a list of [`FieldSpec`]s. Validation takes an
//! arbitrary JSON value and returns either the normalised property object
//! (declared fields only, values coerced to the declared kind, defaults filled
//! in) or a [`FieldErrors`] map. Normalised output always validates to itself.

use serde::Serialize;
use serde_json::{Map, Value};

use mlswarm_core::Properties;

use crate::error::{FieldErrors, NON_FIELD_ERRORS};

/// Value kind of a declared field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Integer,
    Float,
    Boolean,
    String,
    StringList,
    /// Any JSON value, stored as-is.
    Json,
}

/// One declared property.
#[derive(Debug, Clone, Serialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub help: String,
}

impl FieldSpec {
    fn of(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            required: false,
            default: None,
            min: None,
            max: None,
            choices: None,
            help: String::new(),
        }
    }

    pub fn integer(name: &str) -> Self {
        Self::of(name, FieldKind::Integer)
    }

    pub fn float(name: &str) -> Self {
        Self::of(name, FieldKind::Float)
    }

    pub fn boolean(name: &str) -> Self {
        Self::of(name, FieldKind::Boolean)
    }

    pub fn string(name: &str) -> Self {
        Self::of(name, FieldKind::String)
    }

    pub fn string_list(name: &str) -> Self {
        Self::of(name, FieldKind::StringList)
    }

    pub fn json(name: &str) -> Self {
        Self::of(name, FieldKind::Json)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn choices(mut self, choices: &[&str]) -> Self {
        self.choices = Some(choices.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn help(mut self, help: &str) -> Self {
        self.help = help.to_string();
        self
    }

    /// Coerce and check one present, non-null value.
    fn clean(&self, value: &Value) -> Result<Value, Vec<String>> {
        let cleaned = match self.kind {
            FieldKind::Integer => coerce_integer(value).map(Value::from),
            FieldKind::Float => coerce_float(value).map(Value::from),
            FieldKind::Boolean => coerce_bool(value).map(Value::Bool),
            FieldKind::String => coerce_string(value).map(Value::String),
            FieldKind::StringList => coerce_string_list(value)
                .map(|items| Value::Array(items.into_iter().map(Value::String).collect())),
            FieldKind::Json => Ok(value.clone()),
        }
        .map_err(|m| vec![m])?;

        let mut messages = Vec::new();
        if let Some(n) = cleaned.as_f64() {
            if let Some(min) = self.min {
                if n < min {
                    messages.push(format!("Ensure this value is greater than or equal to {}.", min));
                }
            }
            if let Some(max) = self.max {
                if n > max {
                    messages.push(format!("Ensure this value is less than or equal to {}.", max));
                }
            }
        }
        if let Some(choices) = &self.choices {
            let candidates: Vec<&str> = match &cleaned {
                Value::String(s) => vec![s.as_str()],
                Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
                _ => Vec::new(),
            };
            for c in candidates {
                if !choices.iter().any(|choice| choice == c) {
                    messages.push(format!("\"{}\" is not a valid choice.", c));
                }
            }
        }

        if messages.is_empty() { Ok(cleaned) } else { Err(messages) }
    }
}

fn coerce_integer(value: &Value) -> Result<i64, String> {
    const MSG: &str = "A valid integer is required.";
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else {
                n.as_f64().and_then(integral).ok_or_else(|| MSG.to_string())
            }
        }
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral))
                .ok_or_else(|| MSG.to_string())
        }
        _ => Err(MSG.to_string()),
    }
}

fn integral(f: f64) -> Option<i64> {
    (f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64).then_some(f as i64)
}

fn coerce_float(value: &Value) -> Result<f64, String> {
    const MSG: &str = "A valid number is required.";
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|f| f.is_finite()).ok_or_else(|| MSG.to_string())
}

fn coerce_bool(value: &Value) -> Result<bool, String> {
    const MSG: &str = "Must be a valid boolean.";
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => match n.as_i64() {
            Some(1) => Ok(true),
            Some(0) => Ok(false),
            _ => Err(MSG.to_string()),
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "y" | "on" => Ok(true),
            "false" | "0" | "no" | "n" | "off" => Ok(false),
            _ => Err(MSG.to_string()),
        },
        _ => Err(MSG.to_string()),
    }
}

fn coerce_string(value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.trim().to_string()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err("Not a valid string.".to_string()),
    }
}

fn coerce_string_list(value: &Value) -> Result<Vec<String>, String> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(coerce_string)
            .collect::<Result<Vec<_>, _>>(),
        Value::String(s) => Ok(vec![s.trim().to_string()]),
        other => Err(format!(
            "Expected a list of items but got type \"{}\".",
            json_type_name(other)
        )),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

/// Ordered set of declared fields.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PropertySchema {
    fields: Vec<FieldSpec>,
}

impl PropertySchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Validate and normalise `raw`. Null is treated as an empty object.
    /// Keys that are not declared are dropped.
    pub fn validate(&self, raw: &Value) -> Result<Properties, FieldErrors> {
        let empty = Map::new();
        let input = match raw {
            Value::Object(map) => map,
            Value::Null => &empty,
            other => {
                let mut errors = FieldErrors::new();
                errors.add(
                    NON_FIELD_ERRORS,
                    format!(
                        "Invalid data. Expected a dictionary, but got {}.",
                        json_type_name(other)
                    ),
                );
                return Err(errors);
            }
        };

        let mut errors = FieldErrors::new();
        let mut normalized = Properties::new();

        for spec in &self.fields {
            match input.get(&spec.name) {
                Some(Value::Null) if spec.required => {
                    errors.add(&spec.name, "This field may not be null.");
                }
                Some(Value::String(s)) if spec.required && s.trim().is_empty() => {
                    errors.add(&spec.name, "This field may not be blank.");
                }
                Some(value) if !value.is_null() => match spec.clean(value) {
                    Ok(v) => {
                        normalized.insert(spec.name.clone(), v);
                    }
                    Err(messages) => {
                        for m in messages {
                            errors.add(&spec.name, m);
                        }
                    }
                },
                _ if spec.required => errors.add(&spec.name, "This field is required."),
                _ => {
                    if let Some(default) = &spec.default {
                        normalized.insert(spec.name.clone(), default.clone());
                    }
                }
            }
        }

        errors.into_result(normalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn training_schema() -> PropertySchema {
        PropertySchema::new()
            .field(FieldSpec::float("learning_rate").default(0.01).min(0.0))
            .field(FieldSpec::integer("epochs").default(100).min(1.0).max(1000.0))
            .field(FieldSpec::boolean("shuffle").default(true))
            .field(FieldSpec::string("target").required())
            .field(FieldSpec::string("activation").default("relu").choices(&["relu", "tanh"]))
            .field(FieldSpec::string_list("features"))
    }

    #[test]
    fn fills_defaults_and_drops_unknown_keys() {
        let out = training_schema()
            .validate(&json!({"target": "label", "color": "blue"}))
            .unwrap();
        assert_eq!(out["learning_rate"], json!(0.01));
        assert_eq!(out["epochs"], json!(100));
        assert_eq!(out["shuffle"], json!(true));
        assert_eq!(out["activation"], json!("relu"));
        assert!(!out.contains_key("color"));
        assert!(!out.contains_key("features"));
    }

    #[test]
    fn coerces_form_style_values() {
        let out = training_schema()
            .validate(&json!({
                "target": " label ",
                "learning_rate": "0.5",
                "epochs": 20.0,
                "shuffle": "no",
                "features": "x",
            }))
            .unwrap();
        assert_eq!(out["target"], json!("label"));
        assert_eq!(out["learning_rate"], json!(0.5));
        assert_eq!(out["epochs"], json!(20));
        assert_eq!(out["shuffle"], json!(false));
        assert_eq!(out["features"], json!(["x"]));
    }

    #[test]
    fn reports_every_failing_field() {
        let errors = training_schema()
            .validate(&json!({"epochs": 0, "learning_rate": "fast", "activation": "sigmoid"}))
            .unwrap_err();
        assert_eq!(errors.get("target").unwrap(), ["This field is required."]);
        assert_eq!(
            errors.get("epochs").unwrap(),
            ["Ensure this value is greater than or equal to 1."]
        );
        assert_eq!(errors.get("learning_rate").unwrap(), ["A valid number is required."]);
        assert_eq!(
            errors.get("activation").unwrap(),
            ["\"sigmoid\" is not a valid choice."]
        );
    }

    #[test]
    fn normalized_output_revalidates_to_itself() {
        let schema = training_schema();
        let inputs = [
            json!({"target": "y"}),
            json!({"target": 7, "epochs": "12", "learning_rate": 1, "features": ["a", 2]}),
            json!({"target": "z", "shuffle": 0, "activation": "tanh", "extra": {"k": 1}}),
        ];
        for input in inputs {
            let once = schema.validate(&input).unwrap();
            let twice = schema.validate(&Value::Object(once.clone())).unwrap();
            assert_eq!(once, twice, "input: {input}");
        }
    }

    #[test]
    fn non_object_goes_to_non_field_errors() {
        let errors = training_schema().validate(&json!([1, 2])).unwrap_err();
        assert_eq!(
            errors.get(NON_FIELD_ERRORS).unwrap(),
            ["Invalid data. Expected a dictionary, but got list."]
        );
    }

    #[test]
    fn null_is_empty_object() {
        let schema = PropertySchema::new().field(FieldSpec::boolean("trim").default(true));
        let out = schema.validate(&Value::Null).unwrap();
        assert_eq!(out["trim"], json!(true));
    }

    #[test]
    fn required_null_and_blank() {
        let schema = PropertySchema::new().field(FieldSpec::string("target").required());
        assert_eq!(
            schema.validate(&json!({"target": null})).unwrap_err().get("target").unwrap(),
            ["This field may not be null."]
        );
        assert_eq!(
            schema.validate(&json!({"target": "  "})).unwrap_err().get("target").unwrap(),
            ["This field may not be blank."]
        );
    }

    #[test]
    fn integer_rejects_fractions_and_bools() {
        assert!(coerce_integer(&json!(1.5)).is_err());
        assert!(coerce_integer(&json!(true)).is_err());
        assert_eq!(coerce_integer(&json!("42")).unwrap(), 42);
    }
}
