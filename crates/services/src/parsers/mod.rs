//! Parser services turning a chunk's raw content into a [`Table`].

mod csv;
mod json;
mod source;

pub use self::csv::CsvParserService;
pub use self::json::JsonParserService;
pub use source::load_content;

use mlswarm_core::{Chunk, Properties, Table};

use crate::error::ParseError;
use crate::registry::ServiceRegistry;

/// Everything a parser is constructed with.
#[derive(Debug, Clone)]
pub struct ParserArgs {
    /// Inline data, a filesystem path or a `file://` URL.
    pub content: String,
    pub delimiter: char,
    /// Columns to drop after parsing, compared case-sensitively.
    pub ignore_features: Vec<String>,
    pub to_lowercase: bool,
    /// Validated service properties.
    pub properties: Properties,
}

impl ParserArgs {
    pub fn from_chunk(chunk: &Chunk) -> Self {
        Self {
            content: chunk.content.clone(),
            delimiter: chunk.delimiter,
            ignore_features: chunk.ignore_features.clone(),
            to_lowercase: chunk.to_lowercase,
            properties: chunk.properties.clone(),
        }
    }
}

/// A constructed parser bound to one chunk.
pub trait DatasetParser: Send {
    fn args(&self) -> &ParserArgs;

    /// Parse the raw content into a table.
    fn parse(&self) -> Result<Table, ParseError>;

    /// Parse, then drop ignored columns and lowercase text cells if requested.
    fn process(&self) -> Result<Table, ParseError> {
        let mut table = self.parse()?;
        let args = self.args();
        table.drop_columns(&args.ignore_features);
        if args.to_lowercase {
            table.lowercase_text();
        }
        Ok(table)
    }
}

pub type ParserRegistry = ServiceRegistry<ParserArgs, Box<dyn DatasetParser>>;
