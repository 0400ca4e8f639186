use thiserror::Error;

use crate::entity::TaskStatus;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("row {row} has {found} values, expected {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("column mismatch: expected [{expected}], found [{found}]")]
    ColumnMismatch { expected: String, found: String },

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },
}
