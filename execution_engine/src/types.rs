use core::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};
use types::{
    execution::Withdrawal,
    primitives::{
        Bytes, ExecutionAddress, ExecutionBlockHash, ExecutionBlockNumber, Gas, UnixSeconds,
        Wei, H256, H64,
    },
    protocol_version::ProtocolVersion,
};

/// [`ExecutionPayloadV1`], [`ExecutionPayloadV2`] and [`ExecutionPayloadV3`] in one struct.
///
/// Fields introduced by later forks are optional so that field presence can be checked against
/// the method version and the fork active at `timestamp`. `withdrawals_root` is OP Stack specific
/// and only present from Isthmus onwards.
///
/// [`ExecutionPayloadV1`]: https://github.com/ethereum/execution-apis/blob/b7c5d3420e00648f456744d121ffbd929862924d/src/engine/paris.md#executionpayloadv1
/// [`ExecutionPayloadV2`]: https://github.com/ethereum/execution-apis/blob/b7c5d3420e00648f456744d121ffbd929862924d/src/engine/shanghai.md#executionpayloadv2
/// [`ExecutionPayloadV3`]: https://github.com/ethereum/execution-apis/blob/fe8e13c288c592ec154ce25c534e26cb7ce0530d/src/engine/cancun.md#executionpayloadv3
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPayload {
    pub parent_hash: ExecutionBlockHash,
    pub fee_recipient: ExecutionAddress,
    pub state_root: H256,
    pub receipts_root: H256,
    #[serde(with = "serde_utils::prefixed_hex_or_bytes_vec")]
    pub logs_bloom: Bytes,
    pub prev_randao: H256,
    #[serde(with = "serde_utils::prefixed_hex_quantity")]
    pub block_number: ExecutionBlockNumber,
    #[serde(with = "serde_utils::prefixed_hex_quantity")]
    pub gas_limit: Gas,
    #[serde(with = "serde_utils::prefixed_hex_quantity")]
    pub gas_used: Gas,
    #[serde(with = "serde_utils::prefixed_hex_quantity")]
    pub timestamp: UnixSeconds,
    #[serde(with = "serde_utils::prefixed_hex_or_bytes_vec")]
    pub extra_data: Bytes,
    pub base_fee_per_gas: Option<Wei>,
    pub block_hash: ExecutionBlockHash,
    #[serde(with = "serde_utils::prefixed_hex_or_bytes_sequence")]
    pub transactions: Vec<Bytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdrawals: Option<Vec<Withdrawal>>,
    #[serde(
        default,
        with = "serde_utils::prefixed_hex_quantity_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub blob_gas_used: Option<Gas>,
    #[serde(
        default,
        with = "serde_utils::prefixed_hex_quantity_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub excess_blob_gas: Option<Gas>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdrawals_root: Option<H256>,
}

/// [`BlobsBundleV1`](https://github.com/ethereum/execution-apis/blob/fe8e13c288c592ec154ce25c534e26cb7ce0530d/src/engine/cancun.md#blobsbundlev1)
///
/// Commitments, proofs and blobs are opaque to this crate.
#[derive(Clone, PartialEq, Eq, Default, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobsBundle {
    #[serde(with = "serde_utils::prefixed_hex_or_bytes_sequence")]
    pub commitments: Vec<Bytes>,
    #[serde(with = "serde_utils::prefixed_hex_or_bytes_sequence")]
    pub proofs: Vec<Bytes>,
    #[serde(with = "serde_utils::prefixed_hex_or_bytes_sequence")]
    pub blobs: Vec<Bytes>,
}

/// [EIP-7685] requests as opaque `request_type ++ request_data` byte strings.
///
/// [EIP-7685]: https://eips.ethereum.org/EIPS/eip-7685
#[derive(Clone, PartialEq, Eq, Default, Debug, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ExecutionRequests(
    #[serde(with = "serde_utils::prefixed_hex_or_bytes_sequence")] pub Vec<Bytes>,
);

/// Response of `engine_getPayloadV2` and later versions.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPayloadEnvelope {
    pub execution_payload: ExecutionPayload,
    pub block_value: Wei,
    pub blobs_bundle: Option<BlobsBundle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_requests: Option<ExecutionRequests>,
    pub should_override_builder: bool,
    #[serde(
        default,
        with = "serde_utils::prefixed_hex_or_bytes_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub witness: Option<Bytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_beacon_block_root: Option<H256>,
}

/// [`ForkchoiceStateV1`](https://github.com/ethereum/execution-apis/blob/b7c5d3420e00648f456744d121ffbd929862924d/src/engine/paris.md#forkchoicestatev1)
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForkChoiceStateV1 {
    pub head_block_hash: ExecutionBlockHash,
    pub safe_block_hash: ExecutionBlockHash,
    pub finalized_block_hash: ExecutionBlockHash,
}

/// `PayloadAttributesV1` through `PayloadAttributesV3` with the OP Stack extensions.
///
/// `transactions`, `no_tx_pool`, `gas_limit` and `eip1559_params` are only sent by rollup nodes.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadAttributes {
    #[serde(with = "serde_utils::prefixed_hex_quantity")]
    pub timestamp: UnixSeconds,
    pub prev_randao: H256,
    pub suggested_fee_recipient: ExecutionAddress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdrawals: Option<Vec<Withdrawal>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_beacon_block_root: Option<H256>,
    #[serde(
        default,
        with = "serde_utils::prefixed_hex_or_bytes_sequence",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub transactions: Vec<Bytes>,
    #[serde(default)]
    pub no_tx_pool: bool,
    #[serde(
        default,
        with = "serde_utils::prefixed_hex_quantity_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub gas_limit: Option<Gas>,
    #[serde(
        default,
        with = "serde_utils::prefixed_hex_or_bytes_vec",
        skip_serializing_if = "Bytes::is_empty"
    )]
    pub eip1559_params: Bytes,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayloadValidationStatus {
    Valid,
    Invalid,
    Syncing,
    Accepted,
    InvalidBlockHash,
    InvalidTerminalBlock,
}

impl PayloadValidationStatus {
    #[must_use]
    pub const fn is_valid(self) -> bool {
        matches!(self, Self::Valid)
    }

    #[must_use]
    pub const fn is_invalid(self) -> bool {
        matches!(
            self,
            Self::Invalid | Self::InvalidBlockHash | Self::InvalidTerminalBlock,
        )
    }

    #[must_use]
    pub const fn is_syncing(self) -> bool {
        matches!(self, Self::Syncing)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "VALID",
            Self::Invalid => "INVALID",
            Self::Syncing => "SYNCING",
            Self::Accepted => "ACCEPTED",
            Self::InvalidBlockHash => "INVALID_BLOCK_HASH",
            Self::InvalidTerminalBlock => "INVALID_TERMINAL_BLOCK",
        }
    }
}

/// [`PayloadStatusV1`](https://github.com/ethereum/execution-apis/blob/b7c5d3420e00648f456744d121ffbd929862924d/src/engine/paris.md#payloadstatusv1)
///
/// `witness` is only filled in by the `*WithWitness*` methods.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadStatusV1 {
    pub status: PayloadValidationStatus,
    pub latest_valid_hash: Option<ExecutionBlockHash>,
    pub validation_error: Option<String>,
    #[serde(
        default,
        with = "serde_utils::prefixed_hex_or_bytes_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub witness: Option<Bytes>,
}

impl PayloadStatusV1 {
    #[must_use]
    pub const fn new(status: PayloadValidationStatus) -> Self {
        Self {
            status,
            latest_valid_hash: None,
            validation_error: None,
            witness: None,
        }
    }

    #[must_use]
    pub const fn valid(latest_valid_hash: ExecutionBlockHash) -> Self {
        Self {
            status: PayloadValidationStatus::Valid,
            latest_valid_hash: Some(latest_valid_hash),
            validation_error: None,
            witness: None,
        }
    }

    #[must_use]
    pub const fn invalid() -> Self {
        Self::new(PayloadValidationStatus::Invalid)
    }

    #[must_use]
    pub const fn syncing() -> Self {
        Self::new(PayloadValidationStatus::Syncing)
    }

    #[must_use]
    pub const fn accepted() -> Self {
        Self::new(PayloadValidationStatus::Accepted)
    }
}

/// [`engine_forkchoiceUpdated` response](https://github.com/ethereum/execution-apis/blob/b7c5d3420e00648f456744d121ffbd929862924d/src/engine/paris.md#response-1)
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForkChoiceUpdatedResponse {
    pub payload_status: PayloadStatusV1,
    pub payload_id: Option<PayloadId>,
}

impl ForkChoiceUpdatedResponse {
    #[must_use]
    pub const fn new(payload_status: PayloadStatusV1) -> Self {
        Self {
            payload_status,
            payload_id: None,
        }
    }

    #[must_use]
    pub const fn valid(head: ExecutionBlockHash, payload_id: Option<PayloadId>) -> Self {
        Self {
            payload_status: PayloadStatusV1::valid(head),
            payload_id,
        }
    }
}

/// Version of the payload a build was started for. Stored in the first byte of [`PayloadId`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum PayloadVersion {
    V1 = 1,
    V2 = 2,
    V3 = 3,
}

impl PayloadVersion {
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::V1),
            2 => Some(Self::V2),
            3 => Some(Self::V3),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// 8-byte identifier of a payload build.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Debug, Deserialize, Serialize)]
#[serde(transparent)]
pub struct PayloadId(pub H64);

impl PayloadId {
    #[must_use]
    pub fn version(self) -> Option<PayloadVersion> {
        PayloadVersion::from_byte(self.0[0])
    }

    #[must_use]
    pub fn is(self, versions: &[PayloadVersion]) -> bool {
        self.version()
            .is_some_and(|version| versions.contains(&version))
    }
}

impl Display for PayloadId {
    fn fmt(&self, formatter: &mut Formatter) -> FmtResult {
        write!(formatter, "{:?}", self.0)
    }
}

/// Result of `engine_executeStatelessPayload*`.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatelessPayloadStatusV1 {
    pub status: PayloadValidationStatus,
    pub state_root: H256,
    pub receipts_root: H256,
    pub validation_error: Option<String>,
}

impl StatelessPayloadStatusV1 {
    #[must_use]
    pub fn invalid(validation_error: impl Display) -> Self {
        Self {
            status: PayloadValidationStatus::Invalid,
            state_root: H256::zero(),
            receipts_root: H256::zero(),
            validation_error: Some(validation_error.to_string()),
        }
    }
}

/// [`TransitionConfigurationV1`](https://github.com/ethereum/execution-apis/blob/b7c5d3420e00648f456744d121ffbd929862924d/src/engine/paris.md#transitionconfigurationv1)
#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionConfigurationV1 {
    #[serde(default)]
    pub terminal_total_difficulty: Option<Wei>,
    pub terminal_block_hash: ExecutionBlockHash,
    #[serde(with = "serde_utils::prefixed_hex_quantity")]
    pub terminal_block_number: ExecutionBlockNumber,
}

/// [`ClientVersionV1`](https://github.com/ethereum/execution-apis/blob/9707339bc8222f6d43b3bf0a7a91623f7ce52213/src/engine/identification.md#clientversionv1)
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct ClientVersionV1 {
    pub code: String,
    pub name: String,
    pub version: String,
    pub commit: String,
}

impl Display for ClientVersionV1 {
    fn fmt(&self, formatter: &mut Formatter) -> FmtResult {
        write!(
            formatter,
            "{}-{}-{}-{}",
            self.code, self.name, self.version, self.commit,
        )
    }
}

/// [`ExecutionPayloadBodyV1`](https://github.com/ethereum/execution-apis/blob/b7c5d3420e00648f456744d121ffbd929862924d/src/engine/shanghai.md#executionpayloadbodyv1)
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct ExecutionPayloadBody {
    #[serde(with = "serde_utils::prefixed_hex_or_bytes_sequence")]
    pub transactions: Vec<Bytes>,
    pub withdrawals: Option<Vec<Withdrawal>>,
}

/// [`BlobAndProofV1`](https://github.com/ethereum/execution-apis/blob/9707339bc8222f6d43b3bf0a7a91623f7ce52213/src/engine/cancun.md#blobandproofv1)
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct BlobAndProofV1 {
    #[serde(with = "serde_utils::prefixed_hex_or_bytes_vec")]
    pub blob: Bytes,
    #[serde(with = "serde_utils::prefixed_hex_or_bytes_vec")]
    pub proof: Bytes,
}

/// Parameters of `engine_signalSuperchainV1`.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug, Deserialize, Serialize)]
pub struct SuperchainSignal {
    pub recommended: ProtocolVersion,
    pub required: ProtocolVersion,
}
