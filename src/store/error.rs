use thiserror::Error;

/// Errors raised while loading or serializing card records.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying file system failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A row does not carry enough fields for the configured schema
    #[error("Malformed record on line {line}: expected at least {expected} fields, found {found}")]
    MalformedRecord {
        line: usize,
        expected: usize,
        found: usize,
    },

    /// A loaded row has a field holding a bare carriage return, which the
    /// row format cannot write back
    #[error("Malformed record on line {line}: field {field} contains a carriage return")]
    StrayCarriageReturn { line: usize, field: usize },

    /// A field value would break the row format if written
    #[error("Record {source_index} has a tab or line break in field {field}")]
    InvalidFieldContent { source_index: usize, field: usize },
}
