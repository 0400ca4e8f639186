use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use mlswarm_core::{FieldValue, Table};

use crate::error::{ParseError, ServiceError};
use crate::registry::Service;
use crate::schema::{FieldSpec, PropertySchema};

use super::{load_content, DatasetParser, ParserArgs};

/// `json` service: an array of row objects or an object of column arrays.
pub struct JsonParserService {
    schema: PropertySchema,
}

impl JsonParserService {
    pub fn new() -> Self {
        Self {
            schema: PropertySchema::new().field(
                FieldSpec::string("orient")
                    .default("records")
                    .choices(&["records", "columns"])
                    .help("`records`: [{col: value}], `columns`: {col: [values]}."),
            ),
        }
    }
}

impl Default for JsonParserService {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Orient {
    #[default]
    Records,
    Columns,
}

#[derive(Debug, Deserialize)]
struct JsonOptions {
    #[serde(default)]
    orient: Orient,
}

impl Service for JsonParserService {
    type Args = ParserArgs;
    type Instance = Box<dyn DatasetParser>;

    fn schema(&self) -> &PropertySchema {
        &self.schema
    }

    fn build(&self, args: ParserArgs) -> Result<Box<dyn DatasetParser>, ServiceError> {
        let options: JsonOptions =
            serde_json::from_value(Value::Object(args.properties.clone())).map_err(|e| {
                ServiceError::Construction {
                    service: "json".to_string(),
                    reason: e.to_string(),
                }
            })?;
        Ok(Box::new(JsonParser {
            orient: options.orient,
            args,
        }))
    }
}

struct JsonParser {
    args: ParserArgs,
    orient: Orient,
}

impl DatasetParser for JsonParser {
    fn args(&self) -> &ParserArgs {
        &self.args
    }

    fn parse(&self) -> Result<Table, ParseError> {
        let content = load_content(&self.args.content)?;
        let value: Value =
            serde_json::from_str(&content).map_err(|e| ParseError::Json(e.to_string()))?;

        let table = match self.orient {
            Orient::Records => from_records(value)?,
            Orient::Columns => from_columns(value)?,
        };
        debug!(
            columns = table.num_columns(),
            rows = table.num_rows(),
            "parsed JSON content"
        );
        Ok(table)
    }
}

/// `[{"a": 1, "b": 2}, ...]`. Columns are the union of keys in first-seen order;
/// missing keys become null.
fn from_records(value: Value) -> Result<Table, ParseError> {
    let Value::Array(items) = value else {
        return Err(ParseError::Json("expected an array of objects".into()));
    };

    let mut objects: Vec<Map<String, Value>> = Vec::with_capacity(items.len());
    let mut columns: Vec<String> = Vec::new();
    for (i, item) in items.into_iter().enumerate() {
        let Value::Object(obj) = item else {
            return Err(ParseError::Json(format!("record {} is not an object", i)));
        };
        for key in obj.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
        objects.push(obj);
    }
    if columns.is_empty() {
        return Err(ParseError::NoColumns);
    }

    let rows = objects
        .iter()
        .map(|obj| {
            columns
                .iter()
                .map(|c| obj.get(c).map(FieldValue::from_json).unwrap_or(FieldValue::Null))
                .collect()
        })
        .collect();
    Ok(Table::from_rows(columns, rows)?)
}

/// `{"a": [1, 2], "b": [3, 4]}`. Every column must have the same length.
fn from_columns(value: Value) -> Result<Table, ParseError> {
    let Value::Object(obj) = value else {
        return Err(ParseError::Json("expected an object of column arrays".into()));
    };
    if obj.is_empty() {
        return Err(ParseError::NoColumns);
    }

    let mut columns = Vec::with_capacity(obj.len());
    let mut values: Vec<Vec<Value>> = Vec::with_capacity(obj.len());
    for (name, column) in obj {
        let Value::Array(cells) = column else {
            return Err(ParseError::Json(format!("column '{}' is not an array", name)));
        };
        columns.push(name);
        values.push(cells);
    }

    let len = values[0].len();
    if let Some(pos) = values.iter().position(|c| c.len() != len) {
        return Err(ParseError::Json(format!(
            "column '{}' has {} values, expected {}",
            columns[pos],
            values[pos].len(),
            len
        )));
    }

    let rows = (0..len)
        .map(|r| values.iter().map(|c| FieldValue::from_json(&c[r])).collect())
        .collect();
    Ok(Table::from_rows(columns, rows)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(content: &str, properties: Value) -> Result<Table, ParseError> {
        let service = JsonParserService::new();
        let properties = service.schema().validate(&properties).unwrap();
        service
            .build(ParserArgs {
                content: content.to_string(),
                delimiter: ',',
                ignore_features: Vec::new(),
                to_lowercase: false,
                properties,
            })
            .unwrap()
            .parse()
    }

    #[test]
    fn records_union_keys() {
        let t = parse(r#"[{"x": 1, "y": "a"}, {"x": 2.5, "z": true}]"#, json!({})).unwrap();
        assert_eq!(t.columns(), ["x", "y", "z"]);
        assert_eq!(t.rows()[0], vec![
            FieldValue::Integer(1),
            FieldValue::Text("a".into()),
            FieldValue::Null,
        ]);
        assert_eq!(t.rows()[1][2], FieldValue::Boolean(true));
    }

    #[test]
    fn columns_orient() {
        let t = parse(r#"{"x": [1, 3], "y": [2, 4]}"#, json!({"orient": "columns"})).unwrap();
        assert_eq!(t.num_rows(), 2);
        assert_eq!(t.rows()[1], vec![FieldValue::Integer(3), FieldValue::Integer(4)]);
    }

    #[test]
    fn keys_keep_document_order() {
        let t = parse(r#"[{"b": 1, "a": 2}, {"c": 3, "a": 4}]"#, json!({})).unwrap();
        assert_eq!(t.columns(), ["b", "a", "c"]);

        let t = parse(r#"{"y": [2], "x": [1]}"#, json!({"orient": "columns"})).unwrap();
        assert_eq!(t.columns(), ["y", "x"]);
        assert_eq!(t.rows()[0], vec![FieldValue::Integer(2), FieldValue::Integer(1)]);
    }

    #[test]
    fn uneven_columns_rejected() {
        let err = parse(r#"{"x": [1, 3], "y": [2]}"#, json!({"orient": "columns"})).unwrap_err();
        assert!(err.to_string().contains("'y'"));
    }

    #[test]
    fn wrong_shape_rejected() {
        assert!(matches!(parse(r#"{"x": 1}"#, json!({})), Err(ParseError::Json(_))));
        assert!(matches!(parse("[]", json!({})), Err(ParseError::NoColumns)));
        assert!(matches!(parse("[1, 2]", json!({})), Err(ParseError::Json(_))));
    }

    #[test]
    fn unknown_orient_fails_validation() {
        let service = JsonParserService::new();
        let errs = service.schema().validate(&json!({"orient": "index"})).unwrap_err();
        assert!(errs.get("orient").is_some());
    }
}
