use sha2::{Digest as _, Sha256};
use thiserror::Error;
use types::primitives::{Bytes, H256};

#[derive(Debug, Error)]
pub enum RequestsError {
    #[error("empty request: 0x{}", const_hex::encode(.0))]
    Empty(Bytes),
    #[error("invalid request order: 0x{}", const_hex::encode(.0))]
    InvalidOrder(Bytes),
}

/// Checks that every request carries data and that request types are strictly increasing.
pub fn validate_requests(requests: &[Bytes]) -> Result<(), RequestsError> {
    for (index, request) in requests.iter().enumerate() {
        if request.len() < 2 {
            return Err(RequestsError::Empty(request.clone()));
        }

        if let Some(previous) = index.checked_sub(1).map(|previous| &requests[previous]) {
            if request[0] <= previous[0] {
                return Err(RequestsError::InvalidOrder(request.clone()));
            }
        }
    }

    Ok(())
}

/// [EIP-7685] commitment: `sha256(sha256(request_0) ++ sha256(request_1) ++ ...)`.
///
/// Requests without data are skipped.
///
/// [EIP-7685]: https://eips.ethereum.org/EIPS/eip-7685
#[must_use]
pub fn requests_hash(requests: &[Bytes]) -> H256 {
    let mut outer = Sha256::new();

    for request in requests.iter().filter(|request| request.len() > 1) {
        outer.update(Sha256::digest(request));
    }

    H256(outer.finalize().into())
}
