pub use crate::{
    conversion::{
        block_to_envelope, block_to_payload, payload_body, payload_to_block,
        payload_to_block_unchecked, ConversionError, SidecarParams,
    },
    requests::{requests_hash, validate_requests, RequestsError},
    types::{
        BlobAndProofV1, BlobsBundle, ClientVersionV1, ExecutionPayload, ExecutionPayloadBody,
        ExecutionPayloadEnvelope, ExecutionRequests, ForkChoiceStateV1, ForkChoiceUpdatedResponse,
        PayloadAttributes, PayloadId, PayloadStatusV1, PayloadValidationStatus, PayloadVersion,
        StatelessPayloadStatusV1, SuperchainSignal, TransitionConfigurationV1,
    },
};

pub mod eip1559;

mod conversion;
mod requests;
mod types;
