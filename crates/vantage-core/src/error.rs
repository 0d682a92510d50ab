use thiserror::Error;

pub type Result<T> = std::result::Result<T, VantageError>;

#[derive(Debug, Error)]
pub enum VantageError {
    #[error("invalid status value: {0}")]
    InvalidStatus(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("corrupt document: {0}")]
    CorruptDocument(String),

    #[error("unknown result tag: {0}")]
    UnknownTag(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_norway::Error),

    #[error(transparent)]
    Binary(#[from] bincode::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl VantageError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidStatus(_) => "INVALID_STATUS",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidKey(_) => "INVALID_KEY",
            Self::CorruptDocument(_) => "CORRUPT_DOCUMENT",
            Self::UnknownTag(_) => "UNKNOWN_TAG",
            Self::Validation(_) => "VALIDATION_FAILED",
            Self::Io(_) => "IO_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::Yaml(_) => "YAML_ERROR",
            Self::Binary(_) => "BINARY_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
