use core::fmt::Display;
use std::error::Error as StdError;

use anyhow::Error as AnyhowError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use itertools::Itertools as _;
use log::debug;
use thiserror::Error;

/// Errors rejected at the HTTP layer, before a request reaches JSON-RPC dispatch.
#[derive(Debug, Error)]
pub enum Error {
    #[error("internal error")]
    Internal(#[from] AnyhowError),
    #[error("missing token")]
    MissingToken,
    #[error("invalid token")]
    InvalidToken(#[source] AnyhowError),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        debug!("HTTP request rejected: {}", self.format_sources());

        let status_code = match self {
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::MissingToken | Self::InvalidToken(_) => StatusCode::UNAUTHORIZED,
        };

        (status_code, self.to_string()).into_response()
    }
}

impl Error {
    // Impls generated by `thiserror::Error` ignore the alternate flag.
    pub fn format_sources(&self) -> impl Display + '_ {
        self.sources().format(": ")
    }

    fn sources(&self) -> impl Iterator<Item = &dyn StdError> {
        let mut error: Option<&dyn StdError> = Some(self);

        core::iter::from_fn(move || {
            let source = error?.source();
            core::mem::replace(&mut error, source)
        })
    }
}
