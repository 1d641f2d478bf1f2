use thiserror::Error;

#[derive(Error, Debug)]
pub enum FieldSchemaError {
    #[error("Malformed JSON after {stage} stage: {message}")]
    MalformedJson { stage: String, message: String },

    #[error("Duplicate field keys in import: {}", .0.join(", "))]
    DuplicateFieldKey(Vec<String>),

    #[error("Header row has no column for {0}")]
    MissingColumn(String),

    #[error("Invalid import: {0}")]
    InvalidImport(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FieldSchemaError>;
