use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdgenError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Timeout: {0}")]
    Timeout(String),
}

impl AdgenError {
    /// Machine-readable error code used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            AdgenError::NotFound(_) => "not_found",
            AdgenError::Conflict(_) => "conflict",
            AdgenError::Validation(_) => "validation_error",
            AdgenError::Storage(_) | AdgenError::Generation(_) | AdgenError::Timeout(_) => {
                "internal_error"
            }
        }
    }

    /// The message without the category prefix.
    pub fn detail(&self) -> &str {
        match self {
            AdgenError::NotFound(m)
            | AdgenError::Conflict(m)
            | AdgenError::Validation(m)
            | AdgenError::Storage(m)
            | AdgenError::Generation(m)
            | AdgenError::Timeout(m) => m,
        }
    }
}

impl From<std::io::Error> for AdgenError {
    fn from(err: std::io::Error) -> Self {
        AdgenError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for AdgenError {
    fn from(err: serde_json::Error) -> Self {
        AdgenError::Storage(err.to_string())
    }
}

impl From<reqwest::Error> for AdgenError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AdgenError::Timeout(err.to_string())
        } else {
            AdgenError::Generation(err.to_string())
        }
    }
}
