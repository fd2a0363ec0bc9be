use alloy_rlp::{Decodable as _, Error as RlpError, Header};
use bytes::Bytes;
use thiserror::Error;

use crate::{
    primitives::{ExecutionBlockHash, VersionedHash, H256},
    rlp,
};

pub const LEGACY_TX_TYPE: u8 = 0x00;
pub const ACCESS_LIST_TX_TYPE: u8 = 0x01;
pub const DYNAMIC_FEE_TX_TYPE: u8 = 0x02;
pub const BLOB_TX_TYPE: u8 = 0x03;
pub const SET_CODE_TX_TYPE: u8 = 0x04;
pub const DEPOSIT_TX_TYPE: u8 = 0x7e;

// Position of `blob_versioned_hashes` in the payload of an EIP-4844 transaction.
const BLOB_HASHES_FIELD_INDEX: usize = 10;

#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("typed transaction too short")]
    TooShort,
    #[error("transaction type not supported: {tx_type:#04x}")]
    UnsupportedType { tx_type: u8 },
    #[error("rlp: {0}")]
    Rlp(#[from] RlpError),
    #[error("rlp: input contains more than one value")]
    TrailingBytes,
}

/// A transaction in its consensus encoding (EIP-2718 envelope or legacy RLP list).
///
/// Only the envelope is validated. Execution is left to the block executor.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Transaction {
    bytes: Bytes,
    tx_type: u8,
}

impl Transaction {
    pub fn decode(bytes: impl Into<Bytes>) -> Result<Self, TransactionError> {
        let bytes = bytes.into();

        let Some(first) = bytes.first().copied() else {
            return Err(TransactionError::TooShort);
        };

        if first >= alloy_rlp::EMPTY_LIST_CODE {
            Self::check_single_list(&bytes)?;

            return Ok(Self {
                bytes,
                tx_type: LEGACY_TX_TYPE,
            });
        }

        match first {
            ACCESS_LIST_TX_TYPE | DYNAMIC_FEE_TX_TYPE | BLOB_TX_TYPE | SET_CODE_TX_TYPE
            | DEPOSIT_TX_TYPE => {
                if bytes.len() < 2 {
                    return Err(TransactionError::TooShort);
                }

                Self::check_single_list(&bytes[1..])?;

                Ok(Self {
                    bytes,
                    tx_type: first,
                })
            }
            tx_type => Err(TransactionError::UnsupportedType { tx_type }),
        }
    }

    #[must_use]
    pub fn hash(&self) -> ExecutionBlockHash {
        hashing::keccak256(&self.bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        self.bytes.clone()
    }

    #[must_use]
    pub const fn tx_type(&self) -> u8 {
        self.tx_type
    }

    #[must_use]
    pub const fn is_deposit(&self) -> bool {
        self.tx_type == DEPOSIT_TX_TYPE
    }

    /// Size counted against data availability limits when building blocks.
    #[must_use]
    pub fn data_availability_size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn blob_versioned_hashes(&self) -> Result<Vec<VersionedHash>, TransactionError> {
        if self.tx_type != BLOB_TX_TYPE {
            return Ok(vec![]);
        }

        let mut buffer = &self.bytes[1..];
        let mut payload = rlp::decode_list_payload(&mut buffer)?;

        // Blob transactions wrapped for the network carry blobs next to the transaction.
        if payload.first().is_some_and(|byte| *byte >= alloy_rlp::EMPTY_LIST_CODE) {
            payload = rlp::decode_list_payload(&mut payload)?;
        }

        for _ in 0..BLOB_HASHES_FIELD_INDEX {
            let header = Header::decode(&mut payload)?;

            if payload.len() < header.payload_length {
                return Err(RlpError::InputTooShort.into());
            }

            payload = &payload[header.payload_length..];
        }

        let hashes = Vec::<[u8; 32]>::decode(&mut payload)?;

        Ok(hashes.into_iter().map(H256).collect())
    }

    fn check_single_list(mut bytes: &[u8]) -> Result<(), TransactionError> {
        rlp::decode_list_payload(&mut bytes)?;

        if !bytes.is_empty() {
            return Err(TransactionError::TrailingBytes);
        }

        Ok(())
    }
}
