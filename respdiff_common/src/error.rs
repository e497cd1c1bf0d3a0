use crate::{ContentFormat, Side};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RespDiffError {
    #[error("Transport error for {url}: {message}")]
    Transport { url: String, message: String },

    #[error("{side} endpoint returned an empty response: {reason}")]
    EmptyResponse { side: Side, reason: String },

    #[error("Failed to parse {format} body: {message}")]
    Parse {
        format: ContentFormat,
        message: String,
    },

    #[error("{side} response is not valid {format}: {message}")]
    UnsupportedFormat {
        side: Side,
        format: ContentFormat,
        message: String,
    },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Comparison cancelled")]
    Cancelled,
}

impl RespDiffError {
    /// Stable discriminator used in CLI output and HTTP error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            RespDiffError::Transport { .. } => "transport",
            RespDiffError::EmptyResponse { .. } => "empty_response",
            RespDiffError::Parse { .. } => "parse",
            RespDiffError::UnsupportedFormat { .. } => "unsupported_format",
            RespDiffError::Persistence(_) => "persistence",
            RespDiffError::Io(_) => "io",
            RespDiffError::Config(_) => "config",
            RespDiffError::Serialization(_) => "serialization",
            RespDiffError::InvalidRequest(_) => "invalid_request",
            RespDiffError::Cancelled => "cancelled",
        }
    }

    /// Whether the failure happened while obtaining the responses rather than
    /// while interpreting them.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            RespDiffError::Transport { .. } | RespDiffError::EmptyResponse { .. }
        )
    }

    /// Re-attribute a parse failure to the side whose body caused it
    pub fn into_unsupported(self, side: Side) -> Self {
        match self {
            RespDiffError::Parse { format, message } => RespDiffError::UnsupportedFormat {
                side,
                format,
                message,
            },
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, RespDiffError>;
