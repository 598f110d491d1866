//! Errors raised while *building* a concrete source, as opposed to errors
//! raised while the engine runs a pass against one (those are
//! `branch_core::EngineError`'s concern).

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ColumnError {
    #[error("column `{0}` has {1} rows, expected {2} to match the rest of the table")]
    RaggedColumn(String, usize, usize),

    #[error("duplicate column name `{0}` in source definition")]
    DuplicateColumn(String),
}
