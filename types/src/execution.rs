use alloy_rlp::{BufMut, Decodable, Encodable, Error as RlpError};
use bytes::Bytes;
use hashing::EMPTY_OMMERS_HASH;
use serde::{Deserialize, Serialize};

use crate::{
    primitives::{
        Bloom, Difficulty, ExecutionAddress, ExecutionBlockHash, ExecutionBlockNumber, Gas, Gwei,
        UnixSeconds, ValidatorIndex, Wei, WithdrawalIndex, H256, H64,
    },
    rlp,
    transaction::Transaction,
};

/// Maximum size of `Header.extra_data` on mainnet and OP Stack chains.
pub const MAXIMUM_EXTRA_DATA_SIZE: usize = 32;

/// Execution layer block header.
///
/// The optional fields were added by later forks and are encoded only when present.
#[derive(Clone, PartialEq, Eq, Default, Debug)]
pub struct Header {
    pub parent_hash: ExecutionBlockHash,
    pub ommers_hash: H256,
    pub fee_recipient: ExecutionAddress,
    pub state_root: H256,
    pub transactions_root: H256,
    pub receipts_root: H256,
    pub logs_bloom: Bloom,
    pub difficulty: Difficulty,
    pub number: ExecutionBlockNumber,
    pub gas_limit: Gas,
    pub gas_used: Gas,
    pub timestamp: UnixSeconds,
    pub extra_data: Bytes,
    pub mix_hash: H256,
    pub nonce: H64,
    pub base_fee_per_gas: Option<Wei>,
    pub withdrawals_root: Option<H256>,
    pub blob_gas_used: Option<Gas>,
    pub excess_blob_gas: Option<Gas>,
    pub parent_beacon_block_root: Option<H256>,
    pub requests_hash: Option<H256>,
}

impl Header {
    #[must_use]
    pub fn hash(&self) -> ExecutionBlockHash {
        hashing::hash_rlp(self)
    }

    /// Whether the header belongs to the proof-of-work part of the chain.
    #[must_use]
    pub fn is_pre_merge(&self) -> bool {
        !self.difficulty.is_zero()
    }

    #[must_use]
    pub fn post_merge_defaults() -> Self {
        Self {
            ommers_hash: EMPTY_OMMERS_HASH,
            ..Self::default()
        }
    }

    // Later optional fields force earlier ones to be encoded, even if absent.
    fn optional_field_count(&self) -> usize {
        [
            self.base_fee_per_gas.is_some(),
            self.withdrawals_root.is_some(),
            self.blob_gas_used.is_some(),
            self.excess_blob_gas.is_some(),
            self.parent_beacon_block_root.is_some(),
            self.requests_hash.is_some(),
        ]
        .iter()
        .rposition(|present| *present)
        .map_or(0, |position| position + 1)
    }

    fn encode_fields(&self, out: &mut Vec<u8>) {
        self.parent_hash.0.encode(out);
        self.ommers_hash.0.encode(out);
        self.fee_recipient.0.encode(out);
        self.state_root.0.encode(out);
        self.transactions_root.0.encode(out);
        self.receipts_root.0.encode(out);
        self.logs_bloom.0.encode(out);
        rlp::encode_u256(self.difficulty, out);
        self.number.encode(out);
        self.gas_limit.encode(out);
        self.gas_used.encode(out);
        self.timestamp.encode(out);
        self.extra_data.encode(out);
        self.mix_hash.0.encode(out);
        self.nonce.0.encode(out);

        let optional_field_count = self.optional_field_count();

        if optional_field_count > 0 {
            rlp::encode_u256(self.base_fee_per_gas.unwrap_or_default(), out);
        }

        if optional_field_count > 1 {
            self.withdrawals_root.unwrap_or_default().0.encode(out);
        }

        if optional_field_count > 2 {
            self.blob_gas_used.unwrap_or_default().encode(out);
        }

        if optional_field_count > 3 {
            self.excess_blob_gas.unwrap_or_default().encode(out);
        }

        if optional_field_count > 4 {
            self.parent_beacon_block_root.unwrap_or_default().0.encode(out);
        }

        if optional_field_count > 5 {
            self.requests_hash.unwrap_or_default().0.encode(out);
        }
    }
}

impl Encodable for Header {
    fn encode(&self, out: &mut dyn BufMut) {
        rlp::encode_list(out, |payload| self.encode_fields(payload));
    }
}

impl Decodable for Header {
    fn decode(buf: &mut &[u8]) -> Result<Self, RlpError> {
        let mut payload = rlp::decode_list_payload(buf)?;
        let payload = &mut payload;

        let mut header = Self {
            parent_hash: H256(Decodable::decode(payload)?),
            ommers_hash: H256(Decodable::decode(payload)?),
            fee_recipient: ExecutionAddress::from(<[u8; 20]>::decode(payload)?),
            state_root: H256(Decodable::decode(payload)?),
            transactions_root: H256(Decodable::decode(payload)?),
            receipts_root: H256(Decodable::decode(payload)?),
            logs_bloom: Bloom(Decodable::decode(payload)?),
            difficulty: rlp::decode_u256(payload)?,
            number: Decodable::decode(payload)?,
            gas_limit: Decodable::decode(payload)?,
            gas_used: Decodable::decode(payload)?,
            timestamp: Decodable::decode(payload)?,
            extra_data: Decodable::decode(payload)?,
            mix_hash: H256(Decodable::decode(payload)?),
            nonce: H64(Decodable::decode(payload)?),
            ..Self::default()
        };

        if !payload.is_empty() {
            header.base_fee_per_gas = Some(rlp::decode_u256(payload)?);
        }

        if !payload.is_empty() {
            header.withdrawals_root = Some(H256(Decodable::decode(payload)?));
        }

        if !payload.is_empty() {
            header.blob_gas_used = Some(Decodable::decode(payload)?);
        }

        if !payload.is_empty() {
            header.excess_blob_gas = Some(Decodable::decode(payload)?);
        }

        if !payload.is_empty() {
            header.parent_beacon_block_root = Some(H256(Decodable::decode(payload)?));
        }

        if !payload.is_empty() {
            header.requests_hash = Some(H256(Decodable::decode(payload)?));
        }

        if !payload.is_empty() {
            return Err(RlpError::Custom("header contains unexpected trailing fields"));
        }

        Ok(header)
    }
}

/// [`WithdrawalV1`](https://github.com/ethereum/execution-apis/blob/b7c5d3420e00648f456744d121ffbd929862924d/src/engine/shanghai.md#withdrawalv1)
#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Withdrawal {
    #[serde(with = "serde_utils::prefixed_hex_quantity")]
    pub index: WithdrawalIndex,
    #[serde(with = "serde_utils::prefixed_hex_quantity")]
    pub validator_index: ValidatorIndex,
    pub address: ExecutionAddress,
    #[serde(with = "serde_utils::prefixed_hex_quantity")]
    pub amount: Gwei,
}

impl Encodable for Withdrawal {
    fn encode(&self, out: &mut dyn BufMut) {
        rlp::encode_list(out, |payload| {
            self.index.encode(payload);
            self.validator_index.encode(payload);
            self.address.0.encode(payload);
            self.amount.encode(payload);
        });
    }
}

impl Decodable for Withdrawal {
    fn decode(buf: &mut &[u8]) -> Result<Self, RlpError> {
        let mut payload = rlp::decode_list_payload(buf)?;
        let payload = &mut payload;

        let withdrawal = Self {
            index: Decodable::decode(payload)?,
            validator_index: Decodable::decode(payload)?,
            address: ExecutionAddress::from(<[u8; 20]>::decode(payload)?),
            amount: Decodable::decode(payload)?,
        };

        if !payload.is_empty() {
            return Err(RlpError::UnexpectedLength);
        }

        Ok(withdrawal)
    }
}

#[must_use]
pub fn withdrawals_root(withdrawals: &[Withdrawal]) -> H256 {
    hashing::ordered_trie_root(withdrawals.iter().map(alloy_rlp::encode))
}

#[must_use]
pub fn transactions_root(transactions: &[Transaction]) -> H256 {
    hashing::ordered_trie_root(transactions.iter().map(Transaction::as_bytes))
}

/// Transactions and withdrawals of a block. Ommers are always empty after the merge.
#[derive(Clone, PartialEq, Eq, Default, Debug)]
pub struct Body {
    pub transactions: Vec<Transaction>,
    pub withdrawals: Option<Vec<Withdrawal>>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Block {
    header: Header,
    body: Body,
    hash: ExecutionBlockHash,
}

impl Block {
    #[must_use]
    pub fn new(header: Header, body: Body) -> Self {
        let hash = header.hash();
        Self { header, body, hash }
    }

    #[must_use]
    pub const fn hash(&self) -> ExecutionBlockHash {
        self.hash
    }

    #[must_use]
    pub const fn header(&self) -> &Header {
        &self.header
    }

    #[must_use]
    pub const fn body(&self) -> &Body {
        &self.body
    }

    #[must_use]
    pub const fn number(&self) -> ExecutionBlockNumber {
        self.header.number
    }

    #[must_use]
    pub const fn parent_hash(&self) -> ExecutionBlockHash {
        self.header.parent_hash
    }

    #[must_use]
    pub const fn timestamp(&self) -> UnixSeconds {
        self.header.timestamp
    }

    #[must_use]
    pub fn transactions(&self) -> &[Transaction] {
        &self.body.transactions
    }

    #[must_use]
    pub fn withdrawals(&self) -> Option<&[Withdrawal]> {
        self.body.withdrawals.as_deref()
    }
}
