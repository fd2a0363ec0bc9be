use anyhow::Error as AnyhowError;
use thiserror::Error;

/// Errors returned by Engine API methods. Each maps to a JSON-RPC error code.
///
/// The `String` payloads end up in the `data` field of the JSON-RPC error object.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),
    #[error("Unknown payload")]
    UnknownPayload,
    #[error("Invalid forkchoice state: {0}")]
    InvalidForkChoiceState(String),
    #[error("Invalid payload attributes: {0}")]
    InvalidPayloadAttributes(String),
    #[error("Too large request: {0}")]
    TooLargeRequest(String),
    #[error("Unsupported fork: {0}")]
    UnsupportedFork(String),
    #[error(transparent)]
    Internal(#[from] AnyhowError),
}

impl Error {
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            Self::InvalidParams(_) => -32602,
            Self::Internal(_) => -32603,
            Self::UnknownPayload => -38001,
            Self::InvalidForkChoiceState(_) => -38002,
            Self::InvalidPayloadAttributes(_) => -38003,
            Self::TooLargeRequest(_) => -38004,
            Self::UnsupportedFork(_) => -38005,
        }
    }

    /// The fixed part of the error message.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::InvalidParams(_) => "Invalid parameters".to_owned(),
            Self::UnknownPayload => "Unknown payload".to_owned(),
            Self::InvalidForkChoiceState(_) => "Invalid forkchoice state".to_owned(),
            Self::InvalidPayloadAttributes(_) => "Invalid payload attributes".to_owned(),
            Self::TooLargeRequest(_) => "Too large request".to_owned(),
            Self::UnsupportedFork(_) => "Unsupported fork".to_owned(),
            Self::Internal(error) => format!("{error:#}"),
        }
    }

    #[must_use]
    pub fn data(&self) -> Option<&str> {
        match self {
            Self::InvalidParams(data)
            | Self::InvalidForkChoiceState(data)
            | Self::InvalidPayloadAttributes(data)
            | Self::TooLargeRequest(data)
            | Self::UnsupportedFork(data) => Some(data),
            Self::UnknownPayload | Self::Internal(_) => None,
        }
    }

    pub(crate) fn invalid_params(error: impl ToString) -> Self {
        Self::InvalidParams(error.to_string())
    }

    pub(crate) fn invalid_payload_attributes(error: impl ToString) -> Self {
        Self::InvalidPayloadAttributes(error.to_string())
    }

    pub(crate) fn unsupported_fork(error: impl ToString) -> Self {
        Self::UnsupportedFork(error.to_string())
    }
}
