use ::csv::{ReaderBuilder, Trim};
use serde::Deserialize;
use tracing::debug;

use mlswarm_core::{FieldValue, Table};

use crate::error::{ParseError, ServiceError};
use crate::registry::Service;
use crate::schema::{FieldSpec, PropertySchema};

use super::{load_content, DatasetParser, ParserArgs};

/// `csv` service: delimited text with a header row.
pub struct CsvParserService {
    schema: PropertySchema,
}

impl CsvParserService {
    pub fn new() -> Self {
        Self {
            schema: PropertySchema::new()
                .field(
                    FieldSpec::boolean("has_headers")
                        .default(true)
                        .help("Whether the first record holds column names."),
                )
                .field(
                    FieldSpec::string("comment")
                        .help("Lines starting with this character are skipped."),
                )
                .field(
                    FieldSpec::boolean("trim")
                        .default(true)
                        .help("Trim whitespace around headers and fields."),
                ),
        }
    }
}

impl Default for CsvParserService {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Deserialize)]
struct CsvOptions {
    #[serde(default = "yes")]
    has_headers: bool,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default = "yes")]
    trim: bool,
}

fn yes() -> bool {
    true
}

impl Service for CsvParserService {
    type Args = ParserArgs;
    type Instance = Box<dyn DatasetParser>;

    fn schema(&self) -> &PropertySchema {
        &self.schema
    }

    fn build(&self, args: ParserArgs) -> Result<Box<dyn DatasetParser>, ServiceError> {
        let construction = |reason: String| ServiceError::Construction {
            service: "csv".to_string(),
            reason,
        };

        let options: CsvOptions =
            serde_json::from_value(serde_json::Value::Object(args.properties.clone()))
                .map_err(|e| construction(e.to_string()))?;

        if !args.delimiter.is_ascii() {
            return Err(construction(format!(
                "delimiter '{}' must be a single ASCII character",
                args.delimiter
            )));
        }
        let comment = match options.comment.as_deref() {
            None | Some("") => None,
            Some(c) if c.len() == 1 && c.is_ascii() => Some(c.as_bytes()[0]),
            Some(c) => {
                return Err(construction(format!(
                    "comment '{}' must be a single ASCII character",
                    c
                )))
            }
        };

        Ok(Box::new(CsvParser {
            delimiter: args.delimiter as u8,
            comment,
            has_headers: options.has_headers,
            trim: options.trim,
            args,
        }))
    }
}

struct CsvParser {
    args: ParserArgs,
    delimiter: u8,
    comment: Option<u8>,
    has_headers: bool,
    trim: bool,
}

impl DatasetParser for CsvParser {
    fn args(&self) -> &ParserArgs {
        &self.args
    }

    fn parse(&self) -> Result<Table, ParseError> {
        let content = load_content(&self.args.content)?;

        let mut reader = ReaderBuilder::new()
            .delimiter(self.delimiter)
            .comment(self.comment)
            .has_headers(self.has_headers)
            .trim(if self.trim { Trim::All } else { Trim::None })
            .from_reader(content.as_bytes());

        let mut records: Vec<Vec<String>> = Vec::new();
        for result in reader.records() {
            let record = result?;
            records.push(record.iter().map(str::to_string).collect());
        }

        let columns: Vec<String> = if self.has_headers {
            reader.headers()?.iter().map(str::to_string).collect()
        } else {
            let width = records.first().map(Vec::len).unwrap_or(0);
            (0..width).map(|i| i.to_string()).collect()
        };
        if columns.is_empty() || columns.iter().all(String::is_empty) {
            return Err(ParseError::NoColumns);
        }

        let kinds: Vec<ColumnKind> = (0..columns.len())
            .map(|i| ColumnKind::infer(records.iter().filter_map(|r| r.get(i).map(String::as_str))))
            .collect();

        debug!(columns = columns.len(), rows = records.len(), "parsed CSV content");

        let rows = records
            .into_iter()
            .map(|record| {
                record
                    .into_iter()
                    .zip(&kinds)
                    .map(|(cell, kind)| kind.convert(cell))
                    .collect()
            })
            .collect();
        Ok(Table::from_rows(columns, rows)?)
    }
}

/// Column type inferred from every non-empty cell in the column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Integer,
    Float,
    Boolean,
    Text,
}

impl ColumnKind {
    fn infer<'a>(cells: impl Iterator<Item = &'a str>) -> Self {
        let mut integer = true;
        let mut float = true;
        let mut boolean = true;
        let mut seen = false;

        for cell in cells.filter(|c| !c.is_empty()) {
            seen = true;
            integer &= cell.parse::<i64>().is_ok();
            float &= cell.parse::<f64>().is_ok();
            boolean &= parse_bool(cell).is_some();
            if !integer && !float && !boolean {
                return ColumnKind::Text;
            }
        }

        match (seen, integer, float, boolean) {
            (false, ..) => ColumnKind::Text,
            (true, true, ..) => ColumnKind::Integer,
            (true, false, true, _) => ColumnKind::Float,
            (true, false, false, true) => ColumnKind::Boolean,
            _ => ColumnKind::Text,
        }
    }

    fn convert(self, cell: String) -> FieldValue {
        if cell.is_empty() {
            return FieldValue::Null;
        }
        match self {
            ColumnKind::Integer => cell.parse().map(FieldValue::Integer).unwrap_or(FieldValue::Text(cell)),
            ColumnKind::Float => cell.parse().map(FieldValue::Float).unwrap_or(FieldValue::Text(cell)),
            ColumnKind::Boolean => parse_bool(&cell).map(FieldValue::Boolean).unwrap_or(FieldValue::Text(cell)),
            ColumnKind::Text => FieldValue::Text(cell),
        }
    }
}

fn parse_bool(cell: &str) -> Option<bool> {
    if cell.eq_ignore_ascii_case("true") {
        Some(true)
    } else if cell.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}
