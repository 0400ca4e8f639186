use tracing::debug;

use mlswarm_core::{Chunk, Table};
use mlswarm_services::{ParserArgs, ParserRegistry};

use crate::error::TaskError;

/// Process every chunk with its parser and concatenate the results in order.
///
/// Later chunks must carry the same column set as the first; their columns are
/// realigned to the first chunk's order.
pub fn aggregate(parsers: &ParserRegistry, chunks: &[Chunk]) -> Result<Table, TaskError> {
    if chunks.is_empty() {
        return Err(TaskError::DataAggregation("no input data".to_string()));
    }

    let mut combined: Option<Table> = None;
    for chunk in chunks {
        let parser = parsers.build(&chunk.service, ParserArgs::from_chunk(chunk))?;
        let table = parser.process().map_err(|e| {
            TaskError::DataAggregation(format!("chunk {}: {}", chunk.id, e))
        })?;
        debug!(
            chunk_id = %chunk.id,
            rows = table.num_rows(),
            columns = table.num_columns(),
            "processed chunk"
        );

        match combined.as_mut() {
            None => combined = Some(table),
            Some(acc) => acc
                .append(table)
                .map_err(|e| TaskError::DataAggregation(format!("chunk {}: {}", chunk.id, e)))?,
        }
    }

    combined.ok_or_else(|| TaskError::DataAggregation("no input data".to_string()))
}
