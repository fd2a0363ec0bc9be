use core::{
    fmt::{Binary, Display, LowerExp, LowerHex, Octal, Pointer, UpperExp, UpperHex},
    ops::Deref,
};
use std::path::Path;

use anyhow::{ensure, Context as _, Result};
use jwt_simple::prelude::{Duration, HS256Key, MACLike as _, NoCustomClaims, VerificationOptions};
use log::warn;
use serde::Serialize;
use static_assertions::assert_not_impl_any;
use thiserror::Error;
use zeroize::Zeroizing;

pub const JWT_SECRET_SIZE_BYTES: usize = 32;

// Tokens must be issued within this many seconds of the current time in either direction.
const MAX_CLOCK_SKEW_SECONDS: u64 = 60;

/// HS256 key shared with the consensus client.
pub struct JwtSecret {
    key: HS256Key,
}

// Prevent `JwtSecret` from implementing some traits to avoid leaking the key.
assert_not_impl_any! {
    JwtSecret:

    Clone,
    Copy,
    Deref,
    ToOwned,

    Binary,
    Display,
    LowerExp,
    LowerHex,
    Octal,
    Pointer,
    UpperExp,
    UpperHex,

    Serialize,
}

impl JwtSecret {
    /// Reads a hex-encoded secret from `path`, creating one if the file does not exist.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            let bytes = fs_err::read(path).map(Zeroizing::new)?;
            return Self::from_hex(bytes.as_slice());
        }

        let secret = Self::generate();
        let digits = Zeroizing::new(hex::encode(secret.key.to_bytes()));

        fs_err::write(path, digits.as_bytes())?;

        warn!("Generated new JWT secret (path: {})", path.display());

        Ok(secret)
    }

    #[must_use]
    pub fn generate() -> Self {
        let bytes = Zeroizing::new(HS256Key::generate().to_bytes());
        let key = HS256Key::from_bytes(&bytes[..JWT_SECRET_SIZE_BYTES.min(bytes.len())]);

        Self { key }
    }

    pub fn from_hex(mut digits: &[u8]) -> Result<Self> {
        digits = digits.trim_ascii();
        digits = digits.strip_prefix(b"0x").unwrap_or(digits);

        let bytes = hex::decode(digits)
            .map(Zeroizing::new)
            .context(JwtSecretError::InvalidSecret)?;

        ensure!(
            bytes.len() == JWT_SECRET_SIZE_BYTES,
            JwtSecretError::IncorrectSize {
                actual: bytes.len()
            },
        );

        let key = HS256Key::from_bytes(bytes.as_slice());

        Ok(Self { key })
    }

    /// Checks the signature of `token` and that it was issued close to the current time.
    pub fn verify(&self, token: &str) -> Result<()> {
        let max_clock_skew = Duration::from_secs(MAX_CLOCK_SKEW_SECONDS);

        let options = VerificationOptions {
            time_tolerance: Some(max_clock_skew),
            max_validity: Some(max_clock_skew),
            ..VerificationOptions::default()
        };

        let claims = self
            .key
            .verify_token::<NoCustomClaims>(token, Some(options))?;

        ensure!(claims.issued_at.is_some(), JwtSecretError::MissingIssuedAt);

        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn token_issued_at(&self, issued_at: Duration) -> Result<String> {
        let mut claims = jwt_simple::prelude::Claims::create(Duration::from_secs(3600));
        claims.issued_at = Some(issued_at);

        self.key.authenticate(claims).map_err(Into::into)
    }
}

#[derive(Debug, Error)]
#[cfg_attr(test, derive(PartialEq, Eq))]
enum JwtSecretError {
    #[error("JWT secret must be {JWT_SECRET_SIZE_BYTES} bytes, got {actual}")]
    IncorrectSize { actual: usize },
    #[error("failed to parse JWT secret")]
    InvalidSecret,
    #[error("token has no issued-at claim")]
    MissingIssuedAt,
}
