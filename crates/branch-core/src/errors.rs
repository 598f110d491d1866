//! The engine's single error type.
//!
//! Every failure mode the dispatch engine can produce, at booking time or
//! during a pass, surfaces as a variant of [`EngineError`]. Keeping the
//! taxonomy flat (one enum, one crate boundary) means callers match on a
//! variant rather than threading a `Box<dyn Error>` through the booking API.

use crate::value::ColumnKind;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("derived column name `{0}` collides with an existing column")]
    DuplicateName(String),

    #[error("wrong number of inputs for `{node}`: expected {expected}, got {actual}")]
    ArityMismatch {
        node: String,
        expected: usize,
        actual: usize,
    },

    #[error("unknown column `{0}`")]
    UnknownColumn(String),

    #[error("type mismatch on column `{column}`: expected {expected}, found {actual}")]
    TypeMismatch {
        column: String,
        expected: ColumnKind,
        actual: ColumnKind,
    },

    #[error("action has no rows to act on")]
    EmptyInput,

    #[error("root is frozen after its pass; no further booking is possible")]
    RootFrozen,

    #[error("user-supplied callable failed: {0}")]
    UserCallableFailure(String),
}
