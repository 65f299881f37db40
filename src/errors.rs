use thiserror::Error;

/// Errors reported by the tree engine, the array wrapper and the logging
/// adapter. All of these are synchronous and non-retryable: every variant
/// reflects a usage mistake, never a transient condition.
#[derive(Debug, Error, PartialEq)]
pub enum Error {
    /// A mutation was attempted on a node, metadata record or buffer that
    /// is in read-only mode.
    #[error("cannot modify {0:?}: it is accessed in read-only mode")]
    ReadOnly(String),

    /// Creating a node would register a relative-path key that already
    /// exists at one of its ancestors.
    #[error("the name {0:?} is not unique")]
    DuplicateName(String),

    /// An index lookup missed.
    #[error("{key:?} is not in {owner:?}")]
    NotFound { key: String, owner: String },

    /// A malformed name, shape, pattern or attribute list.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A node or value of the wrong kind where a specific kind is required.
    #[error("expected {expected}, got {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// An arithmetic or bitwise operation applied to data that cannot
    /// support it.
    #[error("cannot apply {op} to {dtype} data")]
    UnsupportedOperand {
        op: &'static str,
        dtype: &'static str,
    },

    /// Operand shapes that neither match nor broadcast.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A numeric error from an element-wise kernel, surfaced unmodified.
    #[error("arithmetic error: {0}")]
    Arithmetic(String),
}

pub type Result<T> = std::result::Result<T, Error>;
