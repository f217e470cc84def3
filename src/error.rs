use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Backend transport error: {0}")]
    Transport(String),

    #[error("Backend response failed validation: {0}")]
    Validation(String),

    #[error("Backend rejected retain request for event '{event_id}': {message}")]
    RetainFailed { event_id: String, message: String },

    #[error("Camera '{id}' not found")]
    CameraNotFound { id: String },
}

pub type Result<T> = std::result::Result<T, QueryError>;
