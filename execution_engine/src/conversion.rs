use thiserror::Error;
use types::{
    config::Config,
    execution::{self, Block, Body, Header, MAXIMUM_EXTRA_DATA_SIZE},
    primitives::{Bloom, Bytes, Difficulty, VersionedHash, Wei, H256},
    transaction::{Transaction, TransactionError},
};

use crate::{
    requests,
    types::{
        BlobsBundle, ExecutionPayload, ExecutionPayloadBody, ExecutionPayloadEnvelope,
        ExecutionRequests,
    },
};

const LOGS_BLOOM_SIZE: usize = 256;

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("invalid transaction {index}: {source}")]
    Transaction {
        index: usize,
        source: TransactionError,
    },
    #[error("invalid extradata length: {0}")]
    ExtraDataLength(usize),
    #[error("invalid logsBloom length: {0}")]
    LogsBloomLength(usize),
    #[error("invalid baseFeePerGas: nil")]
    MissingBaseFee,
    #[error("invalid number of versionedHashes: {given} blobHashes: {in_transactions}")]
    VersionedHashCount {
        given: usize,
        in_transactions: usize,
    },
    #[error("invalid versionedHash at {index}: {given:?} blobHashes: {in_transaction:?}")]
    VersionedHashMismatch {
        index: usize,
        given: VersionedHash,
        in_transaction: VersionedHash,
    },
    #[error("attribute WithdrawalsRoot is required for Isthmus blocks")]
    MissingIsthmusWithdrawalsRoot,
    #[error("expected non-nil empty withdrawals operation list in Isthmus")]
    NonEmptyIsthmusWithdrawals,
    #[error("blockhash mismatch, want {want:x}, got {got:x}")]
    BlockHashMismatch { want: H256, got: H256 },
}

/// Fields of a block that travel next to the payload rather than inside it.
#[derive(Clone, Copy, Default, Debug)]
pub struct SidecarParams<'params> {
    pub versioned_hashes: &'params [VersionedHash],
    pub parent_beacon_block_root: Option<H256>,
    pub execution_requests: Option<&'params [Bytes]>,
}

/// Builds a block from `payload` and checks that it hashes to `payload.block_hash`.
pub fn payload_to_block(
    config: &Config,
    payload: &ExecutionPayload,
    sidecar: SidecarParams,
) -> Result<Block, ConversionError> {
    let block = payload_to_block_unchecked(config, payload, sidecar)?;

    if block.hash() != payload.block_hash {
        return Err(ConversionError::BlockHashMismatch {
            want: payload.block_hash,
            got: block.hash(),
        });
    }

    Ok(block)
}

/// Builds a block from `payload` without comparing hashes.
///
/// Used for stateless execution, where the caller only wants the computed roots.
pub fn payload_to_block_unchecked(
    config: &Config,
    payload: &ExecutionPayload,
    sidecar: SidecarParams,
) -> Result<Block, ConversionError> {
    let transactions = payload
        .transactions
        .iter()
        .enumerate()
        .map(|(index, bytes)| {
            Transaction::decode(bytes.clone())
                .map_err(|source| ConversionError::Transaction { index, source })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if payload.extra_data.len() > MAXIMUM_EXTRA_DATA_SIZE {
        return Err(ConversionError::ExtraDataLength(payload.extra_data.len()));
    }

    if payload.logs_bloom.len() != LOGS_BLOOM_SIZE {
        return Err(ConversionError::LogsBloomLength(payload.logs_bloom.len()));
    }

    let base_fee_per_gas = payload
        .base_fee_per_gas
        .ok_or(ConversionError::MissingBaseFee)?;

    let mut blob_hashes = vec![];

    for (index, transaction) in transactions.iter().enumerate() {
        let hashes = transaction
            .blob_versioned_hashes()
            .map_err(|source| ConversionError::Transaction { index, source })?;

        blob_hashes.extend(hashes);
    }

    if blob_hashes.len() != sidecar.versioned_hashes.len() {
        return Err(ConversionError::VersionedHashCount {
            given: sidecar.versioned_hashes.len(),
            in_transactions: blob_hashes.len(),
        });
    }

    for (index, (in_transaction, given)) in blob_hashes
        .iter()
        .zip(sidecar.versioned_hashes)
        .enumerate()
    {
        if in_transaction != given {
            return Err(ConversionError::VersionedHashMismatch {
                index,
                given: *given,
                in_transaction: *in_transaction,
            });
        }
    }

    if config.is_isthmus(payload.timestamp) {
        if payload.withdrawals_root.is_none() {
            return Err(ConversionError::MissingIsthmusWithdrawalsRoot);
        }

        if !payload.withdrawals.as_ref().is_some_and(Vec::is_empty) {
            return Err(ConversionError::NonEmptyIsthmusWithdrawals);
        }
    }

    // Isthmus commits to the L2 withdrawals storage root instead of the withdrawals list.
    let withdrawals_root = payload.withdrawals_root.or_else(|| {
        payload
            .withdrawals
            .as_deref()
            .map(execution::withdrawals_root)
    });

    let header = Header {
        parent_hash: payload.parent_hash,
        ommers_hash: hashing::EMPTY_OMMERS_HASH,
        fee_recipient: payload.fee_recipient,
        state_root: payload.state_root,
        transactions_root: execution::transactions_root(&transactions),
        receipts_root: payload.receipts_root,
        logs_bloom: Bloom::from_slice(&payload.logs_bloom),
        difficulty: Difficulty::zero(),
        number: payload.block_number,
        gas_limit: payload.gas_limit,
        gas_used: payload.gas_used,
        timestamp: payload.timestamp,
        extra_data: payload.extra_data.clone(),
        mix_hash: payload.prev_randao,
        nonce: Default::default(),
        base_fee_per_gas: Some(base_fee_per_gas),
        withdrawals_root,
        blob_gas_used: payload.blob_gas_used,
        excess_blob_gas: payload.excess_blob_gas,
        parent_beacon_block_root: sidecar.parent_beacon_block_root,
        requests_hash: sidecar.execution_requests.map(requests::requests_hash),
    };

    let body = Body {
        transactions,
        withdrawals: payload.withdrawals.clone(),
    };

    Ok(Block::new(header, body))
}

#[must_use]
pub fn block_to_payload(config: &Config, block: &Block) -> ExecutionPayload {
    let header = block.header();

    let withdrawals_root = header
        .withdrawals_root
        .filter(|_| config.is_isthmus(header.timestamp));

    ExecutionPayload {
        parent_hash: header.parent_hash,
        fee_recipient: header.fee_recipient,
        state_root: header.state_root,
        receipts_root: header.receipts_root,
        logs_bloom: Bytes::copy_from_slice(header.logs_bloom.as_bytes()),
        prev_randao: header.mix_hash,
        block_number: header.number,
        gas_limit: header.gas_limit,
        gas_used: header.gas_used,
        timestamp: header.timestamp,
        extra_data: header.extra_data.clone(),
        base_fee_per_gas: header.base_fee_per_gas,
        block_hash: block.hash(),
        transactions: block
            .transactions()
            .iter()
            .map(Transaction::to_bytes)
            .collect(),
        withdrawals: block.body().withdrawals.clone(),
        blob_gas_used: header.blob_gas_used,
        excess_blob_gas: header.excess_blob_gas,
        withdrawals_root,
    }
}

/// Wraps a built block in the `engine_getPayload` response.
#[must_use]
pub fn block_to_envelope(
    config: &Config,
    block: &Block,
    block_value: Wei,
    blobs_bundle: Option<BlobsBundle>,
    execution_requests: Option<Vec<Bytes>>,
    witness: Option<Bytes>,
) -> ExecutionPayloadEnvelope {
    ExecutionPayloadEnvelope {
        execution_payload: block_to_payload(config, block),
        block_value,
        blobs_bundle,
        execution_requests: execution_requests.map(ExecutionRequests),
        should_override_builder: false,
        witness,
        parent_beacon_block_root: block.header().parent_beacon_block_root,
    }
}

/// Body returned by `engine_getPayloadBodiesBy*`.
///
/// Blocks with a withdrawals root always report a withdrawals list, possibly empty.
#[must_use]
pub fn payload_body(block: &Block) -> ExecutionPayloadBody {
    let withdrawals = match block.withdrawals() {
        Some(withdrawals) => Some(withdrawals.to_vec()),
        None if block.header().withdrawals_root.is_some() => Some(vec![]),
        None => None,
    };

    ExecutionPayloadBody {
        transactions: block
            .transactions()
            .iter()
            .map(Transaction::to_bytes)
            .collect(),
        withdrawals,
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use hex_literal::hex;
    use types::execution::Withdrawal;

    use super::*;

    fn shanghai_payload(config: &Config) -> Result<ExecutionPayload> {
        let withdrawal = Withdrawal {
            index: 1,
            validator_index: 2,
            address: types::primitives::H160::repeat_byte(3),
            amount: 4,
        };

        let block = Block::new(
            Header {
                number: 1,
                gas_limit: 30_000_000,
                timestamp: 12,
                base_fee_per_gas: Some(Wei::from(7_u64)),
                withdrawals_root: Some(execution::withdrawals_root(&[withdrawal])),
                transactions_root: execution::transactions_root(&[Transaction::decode(
                    hex!("c20102").to_vec(),
                )?]),
                ..Header::post_merge_defaults()
            },
            Body {
                transactions: vec![Transaction::decode(hex!("c20102").to_vec())?],
                withdrawals: Some(vec![withdrawal]),
            },
        );

        Ok(block_to_payload(config, &block))
    }

    #[test]
    fn payload_survives_conversion_to_block_and_back() -> Result<()> {
        let config = Config::ethereum_devnet();
        let payload = shanghai_payload(&config)?;
        let block = payload_to_block(&config, &payload, SidecarParams::default())?;

        assert_eq!(block.hash(), payload.block_hash);
        assert_eq!(block_to_payload(&config, &block), payload);

        Ok(())
    }

    #[test]
    fn tampered_payload_is_detected_by_its_hash() -> Result<()> {
        let config = Config::ethereum_devnet();

        let payload = ExecutionPayload {
            gas_used: 1,
            ..shanghai_payload(&config)?
        };

        let error = payload_to_block(&config, &payload, SidecarParams::default())
            .expect_err("a payload with a modified field should not match its hash");

        assert!(matches!(error, ConversionError::BlockHashMismatch { .. }));
        assert!(error.to_string().starts_with("blockhash mismatch, want "));

        payload_to_block_unchecked(&config, &payload, SidecarParams::default())?;

        Ok(())
    }

    #[test]
    fn malformed_payloads_are_rejected() -> Result<()> {
        let config = Config::ethereum_devnet();
        let payload = shanghai_payload(&config)?;

        let long_extra_data = ExecutionPayload {
            extra_data: Bytes::from(vec![0; 33]),
            ..payload.clone()
        };

        let short_bloom = ExecutionPayload {
            logs_bloom: Bytes::from(vec![0; 255]),
            ..payload.clone()
        };

        let no_base_fee = ExecutionPayload {
            base_fee_per_gas: None,
            ..payload.clone()
        };

        let bad_transaction = ExecutionPayload {
            transactions: vec![Bytes::from_static(&[0x02])],
            ..payload.clone()
        };

        let unexpected_hashes = SidecarParams {
            versioned_hashes: &[H256::repeat_byte(1)],
            ..SidecarParams::default()
        };

        let convert = |payload: &ExecutionPayload, sidecar| {
            payload_to_block(&config, payload, sidecar).map(|_| ())
        };

        assert!(matches!(
            convert(&long_extra_data, SidecarParams::default()),
            Err(ConversionError::ExtraDataLength(33)),
        ));
        assert!(matches!(
            convert(&short_bloom, SidecarParams::default()),
            Err(ConversionError::LogsBloomLength(255)),
        ));
        assert!(matches!(
            convert(&no_base_fee, SidecarParams::default()),
            Err(ConversionError::MissingBaseFee),
        ));
        assert!(matches!(
            convert(&bad_transaction, SidecarParams::default()),
            Err(ConversionError::Transaction { index: 0, .. }),
        ));
        assert!(matches!(
            convert(&payload, unexpected_hashes),
            Err(ConversionError::VersionedHashCount {
                given: 1,
                in_transactions: 0,
            }),
        ));

        Ok(())
    }

    #[test]
    fn isthmus_payloads_require_withdrawals_root() -> Result<()> {
        let config = Config::optimism_devnet();

        let payload = ExecutionPayload {
            withdrawals: Some(vec![]),
            withdrawals_root: None,
            ..shanghai_payload(&config)?
        };

        assert!(matches!(
            payload_to_block_unchecked(&config, &payload, SidecarParams::default()),
            Err(ConversionError::MissingIsthmusWithdrawalsRoot),
        ));

        let payload = ExecutionPayload {
            withdrawals_root: Some(H256::repeat_byte(9)),
            ..payload
        };

        let block = payload_to_block_unchecked(&config, &payload, SidecarParams::default())?;

        assert_eq!(block.header().withdrawals_root, Some(H256::repeat_byte(9)));
        assert_eq!(block_to_payload(&config, &block).withdrawals_root, Some(H256::repeat_byte(9)));

        Ok(())
    }

    #[test]
    fn requests_are_committed_to_in_the_header() -> Result<()> {
        let config = Config::ethereum_devnet();
        let payload = shanghai_payload(&config)?;
        let requests = [Bytes::from_static(&hex!("00aa"))];

        let sidecar = SidecarParams {
            execution_requests: Some(requests.as_slice()),
            parent_beacon_block_root: Some(H256::repeat_byte(5)),
            ..SidecarParams::default()
        };

        let block = payload_to_block_unchecked(&config, &payload, sidecar)?;

        assert_eq!(
            block.header().requests_hash,
            Some(requests::requests_hash(&requests)),
        );
        assert_eq!(block.header().parent_beacon_block_root, Some(H256::repeat_byte(5)));

        Ok(())
    }

    #[test]
    fn bodies_report_empty_withdrawals_when_committed_to() {
        let block = Block::new(
            Header {
                withdrawals_root: Some(hashing::EMPTY_ROOT_HASH),
                ..Header::post_merge_defaults()
            },
            Body::default(),
        );

        assert_eq!(payload_body(&block).withdrawals, Some(vec![]));
        assert_eq!(
            payload_body(&Block::new(Header::post_merge_defaults(), Body::default())).withdrawals,
            None,
        );
    }
}
