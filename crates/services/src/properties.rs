//! Entry point for validating caller-supplied properties against a service.

use serde_json::Value;
use tracing::debug;

use mlswarm_core::{Properties, TaskKind};

use crate::error::ServiceError;
use crate::registry::ServiceRegistry;
use crate::schema::PropertySchema;

/// Properties as received from a caller: either still JSON-encoded or decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum RawProperties {
    Encoded(String),
    Decoded(Value),
}

impl RawProperties {
    /// Decode to a JSON value. Blank strings decode to null.
    pub fn decode(self) -> Result<Value, ServiceError> {
        match self {
            RawProperties::Decoded(v) => Ok(v),
            RawProperties::Encoded(s) if s.trim().is_empty() => Ok(Value::Null),
            RawProperties::Encoded(s) => serde_json::from_str(&s)
                .map_err(|e| ServiceError::MalformedProperties(e.to_string())),
        }
    }
}

impl Default for RawProperties {
    fn default() -> Self {
        RawProperties::Decoded(Value::Null)
    }
}

impl From<&str> for RawProperties {
    fn from(s: &str) -> Self {
        RawProperties::Encoded(s.to_string())
    }
}

impl From<String> for RawProperties {
    fn from(s: String) -> Self {
        RawProperties::Encoded(s)
    }
}

impl From<Value> for RawProperties {
    fn from(v: Value) -> Self {
        RawProperties::Decoded(v)
    }
}

impl From<Properties> for RawProperties {
    fn from(p: Properties) -> Self {
        RawProperties::Decoded(Value::Object(p))
    }
}

impl<A: 'static, I: 'static> ServiceRegistry<A, I> {
    /// Validate properties against the schema declared by service `id`.
    pub fn validate_properties(
        &self,
        id: &str,
        raw: impl Into<RawProperties>,
    ) -> Result<Properties, ServiceError> {
        let value = raw.into().decode()?;
        let service = self.get(id)?;
        check(service.schema(), &value)
    }

    /// Validate a task's properties against the service's sub-schema for `kind`.
    ///
    /// Services without a sub-schema for the kind accept no task properties:
    /// every supplied key is dropped.
    pub fn validate_task_properties(
        &self,
        id: &str,
        kind: TaskKind,
        raw: impl Into<RawProperties>,
    ) -> Result<Properties, ServiceError> {
        let value = raw.into().decode()?;
        let service = self.get(id)?;
        match service.task_schema(kind) {
            Some(schema) => check(schema, &value),
            None => {
                debug!(service = id, kind = %kind, "no task schema, dropping task properties");
                check(&PropertySchema::new(), &value)
            }
        }
    }
}

fn check(schema: &PropertySchema, value: &Value) -> Result<Properties, ServiceError> {
    schema.validate(value).map_err(ServiceError::InvalidProperties)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::Registries;
    use serde_json::json;

    #[test]
    fn decodes_encoded_properties() {
        let r = Registries::builtin();
        let props = r
            .parsers
            .validate_properties("csv", r#"{"has_headers": "false"}"#)
            .unwrap();
        assert_eq!(props["has_headers"], json!(false));
    }

    #[test]
    fn malformed_json_is_reported_not_crashed() {
        let r = Registries::builtin();
        for raw in ["{", "{\"a\": }", "not json", "[1,"] {
            let err = r.parsers.validate_properties("csv", raw).unwrap_err();
            assert!(
                matches!(err, ServiceError::MalformedProperties(_)),
                "{raw}: {err}"
            );
        }
    }

    #[test]
    fn unknown_service_propagates() {
        let r = Registries::builtin();
        let err = r.estimators.validate_properties("keras-dense", json!({})).unwrap_err();
        assert!(matches!(err, ServiceError::UnknownService { .. }));
    }

    #[test]
    fn field_keyed_errors() {
        let r = Registries::builtin();
        let err = r
            .estimators
            .validate_properties("simple-regressor", json!({"fit_intercept": "maybe"}))
            .unwrap_err();
        let ServiceError::InvalidProperties(fields) = err else {
            panic!("expected field errors");
        };
        assert!(fields.get("target").is_some());
        assert!(fields.get("fit_intercept").is_some());
    }

    #[test]
    fn task_schema_selected_by_kind() {
        let r = Registries::builtin();
        let train = r
            .estimators
            .validate_task_properties("simple-regressor", TaskKind::Training, json!({"epochs": "5"}))
            .unwrap();
        assert_eq!(train["epochs"], json!(5));

        // The same payload under a different kind is validated by that kind's schema.
        let test = r
            .estimators
            .validate_task_properties("simple-regressor", TaskKind::Test, json!({"epochs": "5"}))
            .unwrap();
        assert!(!test.contains_key("epochs"));
    }

    #[test]
    fn blank_encoded_is_empty() {
        let r = Registries::builtin();
        let props = r.parsers.validate_properties("json", "  ").unwrap();
        assert_eq!(props["orient"], json!("records"));
    }
}
