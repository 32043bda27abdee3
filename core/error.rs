use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = AppError> = std::result::Result<T, E>;

/// Structural failures. Any of these aborts the whole call.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AppError {
    #[error("Corrupt configuration at '{path}': {message}. Falling back to defaults.")]
    ConfigCorrupt { path: PathBuf, message: String },

    #[error("JSON Serialization Error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    #[error("YAML Parsing/Serialization Error: {0}")]
    YamlError(#[from] serde_yml::Error),

    #[error("Filesystem Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File Read Error: Path '{path}', Error: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File Write Error: Path '{path}', Error: {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Directory Creation Error: Path '{path}', Error: {source}")]
    DirCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Lock Error: could not lock '{path}': {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed pattern \"{pattern}\": {message}")]
    MalformedPattern { pattern: String, message: String },

    #[error("Pattern rejected: {0}")]
    PatternRejected(String),

    #[error("Invalid project root '{path}': {reason}")]
    InvalidRoot { path: PathBuf, reason: String },

    #[error("Path '{path}' resolves outside of '{root}'")]
    PathEscape { path: PathBuf, root: PathBuf },

    #[error("Document too large: {size} bytes exceeds the ceiling of {limit} bytes")]
    DocumentTooLarge { size: u64, limit: u64 },

    #[error("Invalid Argument: {0}")]
    InvalidArgument(String),

    #[error("Data Loading Error: {0}")]
    DataLoading(String),

    #[error("Duration Parsing Error: {0}")]
    DurationParse(String),
}

/// Failures scoped to one selection, dump or note. Collected next to the
/// successful results instead of aborting the batch.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemError {
    #[error("'{path}' resolves outside the project root")]
    PathEscape { path: String },

    #[error("'{path}' is unreadable: {reason}")]
    UnreadableFile { path: String, reason: String },

    #[error("'{path}' is {size} bytes, over the per-file limit of {limit} bytes")]
    OversizeFile { path: String, size: u64, limit: u64 },

    #[error("'{path}' does not have an allowed file type")]
    DisallowedType { path: String },

    #[error("Context dump '{path}' not found")]
    MissingDump { path: String },

    #[error("Note file '{path}' not found")]
    MissingNote { path: String },
}

impl ItemError {
    pub fn kind(&self) -> &'static str {
        match self {
            ItemError::PathEscape { .. } => "path_escape",
            ItemError::UnreadableFile { .. } => "unreadable_file",
            ItemError::OversizeFile { .. } => "oversize_file",
            ItemError::DisallowedType { .. } => "disallowed_type",
            ItemError::MissingDump { .. } => "missing_dump",
            ItemError::MissingNote { .. } => "missing_note",
        }
    }
}

impl From<globset::Error> for AppError {
    fn from(err: globset::Error) -> Self {
        AppError::MalformedPattern {
            pattern: err.glob().unwrap_or_default().to_string(),
            message: err.kind().to_string(),
        }
    }
}

impl From<parse_duration::parse::Error> for AppError {
    fn from(err: parse_duration::parse::Error) -> Self {
        AppError::DurationParse(err.to_string())
    }
}
