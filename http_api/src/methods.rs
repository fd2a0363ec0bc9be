//! Maps `engine_*` method names to [`ConsensusApi`] calls.

use engine_api::{
    ConsensusApi, ForkchoiceVersion, GetPayloadVersion, NewPayloadVersion, PayloadRequest,
    CAPABILITIES,
};
use execution_engine::{
    ClientVersionV1, ExecutionPayload, ExecutionRequests, ForkChoiceStateV1, PayloadAttributes,
    PayloadId, SuperchainSignal, TransitionConfigurationV1,
};
use jsonrpsee::types::{error::METHOD_NOT_FOUND_CODE, ErrorObject, ErrorObjectOwned};
use serde::Serialize;
use serde_json::Value;
use types::primitives::{ExecutionBlockHash, VersionedHash, H256};

use crate::rpc::{self, HexBytes, Params, Quantity};

// Served but not advertised through `engine_exchangeCapabilities`.
const UNADVERTISED_METHODS: &[&str] = &["engine_exchangeCapabilities", "engine_signalSuperchainV1"];

#[must_use]
pub fn is_known(method: &str) -> bool {
    CAPABILITIES.contains(&method) || UNADVERTISED_METHODS.contains(&method)
}

pub async fn dispatch(api: &ConsensusApi, method: &str, params: &Params) -> Result<Value, ErrorObjectOwned> {
    use ForkchoiceVersion as Fcu;
    use NewPayloadVersion as New;

    match method {
        "engine_forkchoiceUpdatedV1" => forkchoice_updated(api, params, Fcu::V1, false).await,
        "engine_forkchoiceUpdatedV2" => forkchoice_updated(api, params, Fcu::V2, false).await,
        "engine_forkchoiceUpdatedV3" => forkchoice_updated(api, params, Fcu::V3, false).await,
        "engine_forkchoiceUpdatedWithWitnessV1" => {
            forkchoice_updated(api, params, Fcu::V1, true).await
        }
        "engine_forkchoiceUpdatedWithWitnessV2" => {
            forkchoice_updated(api, params, Fcu::V2, true).await
        }
        "engine_forkchoiceUpdatedWithWitnessV3" => {
            forkchoice_updated(api, params, Fcu::V3, true).await
        }
        "engine_newPayloadV1" => new_payload(api, params, New::V1, false).await,
        "engine_newPayloadV2" => new_payload(api, params, New::V2, false).await,
        "engine_newPayloadV3" => new_payload(api, params, New::V3, false).await,
        "engine_newPayloadV4" => new_payload(api, params, New::V4, false).await,
        "engine_newPayloadWithWitnessV1" => new_payload(api, params, New::V1, true).await,
        "engine_newPayloadWithWitnessV2" => new_payload(api, params, New::V2, true).await,
        "engine_newPayloadWithWitnessV3" => new_payload(api, params, New::V3, true).await,
        "engine_newPayloadWithWitnessV4" => new_payload(api, params, New::V4, true).await,
        "engine_executeStatelessPayloadV1" => execute_stateless_payload(api, params, New::V1),
        "engine_executeStatelessPayloadV2" => execute_stateless_payload(api, params, New::V2),
        "engine_executeStatelessPayloadV3" => execute_stateless_payload(api, params, New::V3),
        "engine_executeStatelessPayloadV4" => execute_stateless_payload(api, params, New::V4),
        "engine_getPayloadV1" => {
            let id = single::<PayloadId>(params)?;
            let envelope = api
                .get_payload(GetPayloadVersion::V1, id)
                .await
                .map_err(rpc::engine_error)?;
            to_value(envelope.execution_payload)
        }
        "engine_getPayloadV2" => get_payload(api, params, GetPayloadVersion::V2).await,
        "engine_getPayloadV3" => get_payload(api, params, GetPayloadVersion::V3).await,
        "engine_getPayloadV4" => get_payload(api, params, GetPayloadVersion::V4).await,
        "engine_getBlobsV1" => {
            let hashes = single::<Vec<VersionedHash>>(params)?;
            to_value(api.get_blobs_v1(&hashes).map_err(rpc::engine_error)?)
        }
        "engine_getPayloadBodiesByHashV1" | "engine_getPayloadBodiesByHashV2" => {
            let hashes = single::<Vec<ExecutionBlockHash>>(params)?;
            to_value(
                api.get_payload_bodies_by_hash(&hashes)
                    .map_err(rpc::engine_error)?,
            )
        }
        "engine_getPayloadBodiesByRangeV1" | "engine_getPayloadBodiesByRangeV2" => {
            params.check_count(2)?;
            let Quantity(start) = params.required(0)?;
            let Quantity(count) = params.required(1)?;
            to_value(
                api.get_payload_bodies_by_range(start, count)
                    .map_err(rpc::engine_error)?,
            )
        }
        "engine_exchangeTransitionConfigurationV1" => {
            let remote = single::<TransitionConfigurationV1>(params)?;
            to_value(
                api.exchange_transition_configuration_v1(remote)
                    .map_err(rpc::engine_error)?,
            )
        }
        "engine_exchangeCapabilities" => {
            let remote = single::<Vec<String>>(params)?;
            to_value(api.exchange_capabilities(&remote))
        }
        "engine_getClientVersionV1" => {
            let remote = single::<ClientVersionV1>(params)?;
            to_value(api.get_client_version_v1(&remote))
        }
        "engine_signalSuperchainV1" => {
            params.check_count(1)?;
            let signal = params.optional::<SuperchainSignal>(0)?;
            to_value(api.signal_superchain_v1(signal))
        }
        _ => Err(ErrorObject::owned(
            METHOD_NOT_FOUND_CODE,
            format!("the method {method} does not exist/is not available"),
            None::<()>,
        )),
    }
}

async fn forkchoice_updated(
    api: &ConsensusApi,
    params: &Params,
    version: ForkchoiceVersion,
    want_witness: bool,
) -> Result<Value, ErrorObjectOwned> {
    params.check_count(2)?;

    let state = params.required::<ForkChoiceStateV1>(0)?;
    let attributes = params.optional::<PayloadAttributes>(1)?;

    to_value(
        api.forkchoice_updated(version, state, attributes, want_witness)
            .await
            .map_err(rpc::engine_error)?,
    )
}

async fn new_payload(
    api: &ConsensusApi,
    params: &Params,
    version: NewPayloadVersion,
    want_witness: bool,
) -> Result<Value, ErrorObjectOwned> {
    let (request, param_count) = payload_request(params, version)?;

    params.check_count(param_count)?;

    to_value(
        api.new_payload(version, request, want_witness)
            .await
            .map_err(rpc::engine_error)?,
    )
}

fn execute_stateless_payload(
    api: &ConsensusApi,
    params: &Params,
    version: NewPayloadVersion,
) -> Result<Value, ErrorObjectOwned> {
    let (request, witness_index) = payload_request(params, version)?;

    params.check_count(witness_index + 1)?;

    let HexBytes(witness) = params.required(witness_index)?;

    to_value(
        api.execute_stateless_payload(version, &request, &witness)
            .map_err(rpc::engine_error)?,
    )
}

async fn get_payload(
    api: &ConsensusApi,
    params: &Params,
    version: GetPayloadVersion,
) -> Result<Value, ErrorObjectOwned> {
    let id = single::<PayloadId>(params)?;

    to_value(
        api.get_payload(version, id)
            .await
            .map_err(rpc::engine_error)?,
    )
}

// Returns the request and the number of parameters it was read from.
fn payload_request(
    params: &Params,
    version: NewPayloadVersion,
) -> Result<(PayloadRequest, usize), ErrorObjectOwned> {
    let payload = params.required::<ExecutionPayload>(0)?;

    let request = match version {
        NewPayloadVersion::V1 | NewPayloadVersion::V2 => (PayloadRequest::v1(payload), 1),
        NewPayloadVersion::V3 => {
            let request = PayloadRequest {
                payload,
                versioned_hashes: params.optional::<Vec<VersionedHash>>(1)?,
                beacon_root: params.optional::<H256>(2)?,
                execution_requests: None,
            };

            (request, 3)
        }
        NewPayloadVersion::V4 => {
            let request = PayloadRequest {
                payload,
                versioned_hashes: params.optional::<Vec<VersionedHash>>(1)?,
                beacon_root: params.optional::<H256>(2)?,
                execution_requests: params
                    .optional::<ExecutionRequests>(3)?
                    .map(|requests| requests.0),
            };

            (request, 4)
        }
    };

    Ok(request)
}

fn single<T: serde::de::DeserializeOwned>(params: &Params) -> Result<T, ErrorObjectOwned> {
    params.check_count(1)?;
    params.required(0)
}

fn to_value(value: impl Serialize) -> Result<Value, ErrorObjectOwned> {
    serde_json::to_value(value).map_err(rpc::internal_error)
}
