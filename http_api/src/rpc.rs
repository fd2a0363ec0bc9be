//! JSON-RPC 2.0 envelopes built from `jsonrpsee` types.

use engine_api::Error as EngineError;
use jsonrpsee::types::{
    error::{ErrorCode, INVALID_PARAMS_CODE},
    ErrorObject, ErrorObjectOwned, ErrorResponse, Id, Response,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{value::RawValue, Value};
use types::primitives::Bytes;

/// Reply to a single call.
#[derive(Serialize)]
#[serde(untagged)]
pub enum Output {
    Success(Response<'static, Value>),
    Failure(ErrorResponse<'static>),
}

impl Output {
    #[must_use]
    pub fn new(id: Id<'static>, outcome: Result<Value, ErrorObjectOwned>) -> Self {
        match outcome {
            Ok(result) => Self::Success(Response::new(result, id)),
            Err(error) => Self::Failure(ErrorResponse::borrowed(error, id)),
        }
    }

    /// Reply to a request whose id could not be determined.
    #[must_use]
    pub fn anonymous(code: ErrorCode) -> Self {
        Self::new(Id::Null, Err(code.into()))
    }
}

#[must_use]
pub fn engine_error(error: EngineError) -> ErrorObjectOwned {
    ErrorObject::owned(error.code(), error.message(), error.data())
}

pub fn invalid_params(message: impl Into<String>) -> ErrorObjectOwned {
    ErrorObject::owned(INVALID_PARAMS_CODE, message, None::<()>)
}

pub fn internal_error(error: impl ToString) -> ErrorObjectOwned {
    ErrorObject::owned(ErrorCode::InternalError.code(), error.to_string(), None::<()>)
}

/// Positional parameters. Missing trailing parameters read as `null`.
#[derive(Default, Debug)]
pub struct Params(Vec<Value>);

impl Params {
    pub fn parse(raw: Option<&RawValue>) -> Result<Self, ErrorObjectOwned> {
        let Some(raw) = raw else {
            return Ok(Self::default());
        };

        serde_json::from_str::<Option<Vec<Value>>>(raw.get())
            .map(|values| Self(values.unwrap_or_default()))
            .map_err(|error| invalid_params(format!("non-array args: {error}")))
    }

    pub fn check_count(&self, max: usize) -> Result<(), ErrorObjectOwned> {
        if self.0.len() > max {
            return Err(invalid_params(format!(
                "too many arguments, want at most {max}",
            )));
        }

        Ok(())
    }

    pub fn required<T: DeserializeOwned>(&self, index: usize) -> Result<T, ErrorObjectOwned> {
        self.optional(index)?.ok_or_else(|| {
            invalid_params(format!("missing value for required argument {index}"))
        })
    }

    pub fn optional<T: DeserializeOwned>(
        &self,
        index: usize,
    ) -> Result<Option<T>, ErrorObjectOwned> {
        match self.0.get(index) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => T::deserialize(value)
                .map(Some)
                .map_err(|error| invalid_params(format!("invalid argument {index}: {error}"))),
        }
    }
}

/// Hex-encoded quantity parameter such as a block number.
#[derive(Clone, Copy, Deserialize)]
#[serde(transparent)]
pub struct Quantity(#[serde(with = "serde_utils::prefixed_hex_quantity")] pub u64);

/// Hex-encoded opaque bytes parameter.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct HexBytes(#[serde(with = "serde_utils::prefixed_hex_or_bytes_vec")] pub Bytes);
