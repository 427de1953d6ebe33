use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IesError {
    #[error("Unsupported IES version: {0}")]
    UnsupportedVersion(i16),
    #[error("Corrupt header: {0}")]
    CorruptHeader(String),
    /// Emitted when the same attribute infers to two different column types.
    /// `row` is the ClassID of the offending class, or `-1` when it has none.
    #[error("Column {column} type mismatch at ClassID={row}. Add a ClassSchema entry.")]
    ColumnTypeConflict { column: String, row: String },
    #[error("Invalid ClassSchema type {kind:?} for column {column}")]
    InvalidSchema { column: String, kind: String },
    #[error("All classes must either have a ClassID or not have one")]
    InconsistentClassId,
    #[error("Could not {field} with {encoding} or any fallback encoding")]
    Encoding { field: String, encoding: String },
    #[error("Invalid XML document: {0}")]
    InvalidDocument(String),
    #[error("Column {column} is NUMBER but value {value:?} is not a number")]
    InvalidNumber { column: String, value: String },
    #[error("{field} is too long for the IES format ({len})")]
    FieldTooLong { field: String, len: usize },
    #[error("Unknown file format combination for {0}. Must be ies+xml.")]
    UnsupportedConversion(PathBuf),
    #[error("Unknown text encoding: {0}")]
    UnknownEncoding(String),
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, IesError>;
