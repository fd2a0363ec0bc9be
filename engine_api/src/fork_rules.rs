//! Which Engine API method versions may be used with which forks.
//!
//! Every versioned method is a thin wrapper that checks its parameters here
//! before delegating to a single implementation. Checks never mutate state.

use execution_engine::{ExecutionPayload, PayloadAttributes, PayloadId, PayloadVersion};
use types::{
    config::Config,
    fork::Fork,
    primitives::{Bytes, VersionedHash, H256},
};

use crate::error::Error;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ForkchoiceVersion {
    V1,
    V2,
    V3,
}

impl ForkchoiceVersion {
    #[must_use]
    pub const fn payload_version(self) -> PayloadVersion {
        match self {
            Self::V1 => PayloadVersion::V1,
            Self::V2 => PayloadVersion::V2,
            Self::V3 => PayloadVersion::V3,
        }
    }

    pub fn check_attributes(self, config: &Config, attributes: &PayloadAttributes) -> Result<(), Error> {
        let has_withdrawals = attributes.withdrawals.is_some();
        let has_beacon_root = attributes.parent_beacon_block_root.is_some();

        match self {
            Self::V1 => {
                if has_withdrawals || has_beacon_root {
                    return Err(Error::invalid_params(
                        "withdrawals and beacon root not supported in V1",
                    ));
                }

                if config.is_shanghai(attributes.timestamp) {
                    return Err(Error::invalid_params("forkChoiceUpdateV1 called post-shanghai"));
                }
            }
            Self::V2 => {
                if has_beacon_root {
                    return Err(Error::invalid_payload_attributes("unexpected beacon root"));
                }

                match config.latest_fork(attributes.timestamp) {
                    Fork::Paris if has_withdrawals => {
                        return Err(Error::invalid_payload_attributes(
                            "withdrawals before shanghai",
                        ));
                    }
                    Fork::Shanghai if !has_withdrawals => {
                        return Err(Error::invalid_payload_attributes("missing withdrawals"));
                    }
                    Fork::Paris | Fork::Shanghai => {}
                    Fork::Cancun | Fork::Prague | Fork::Osaka => {
                        return Err(Error::unsupported_fork(
                            "forkchoiceUpdatedV2 must only be called with paris and shanghai \
                             payloads",
                        ));
                    }
                }
            }
            Self::V3 => {
                if !has_withdrawals {
                    return Err(Error::invalid_payload_attributes("missing withdrawals"));
                }

                if !has_beacon_root {
                    return Err(Error::invalid_payload_attributes("missing beacon root"));
                }

                if !matches!(
                    config.latest_fork(attributes.timestamp),
                    Fork::Cancun | Fork::Prague | Fork::Osaka,
                ) {
                    return Err(Error::unsupported_fork(
                        "forkchoiceUpdatedV3 must only be called for cancun payloads",
                    ));
                }
            }
        }

        Ok(())
    }
}

/// Methods that take an execution payload. They share gating and differ in what they do with it.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PayloadMethod {
    NewPayload,
    NewPayloadWithWitness,
    ExecuteStatelessPayload,
}

impl PayloadMethod {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::NewPayload => "newPayload",
            Self::NewPayloadWithWitness => "newPayloadWithWitness",
            Self::ExecuteStatelessPayload => "executeStatelessPayload",
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum NewPayloadVersion {
    V1,
    V2,
    V3,
    V4,
}

/// An execution payload with the parameters sent next to it.
#[derive(Clone, Copy, Debug)]
pub struct PayloadParams<'params> {
    pub payload: &'params ExecutionPayload,
    pub versioned_hashes: Option<&'params [VersionedHash]>,
    pub beacon_root: Option<H256>,
    pub execution_requests: Option<&'params [Bytes]>,
}

impl<'params> PayloadParams<'params> {
    #[must_use]
    pub const fn v1(payload: &'params ExecutionPayload) -> Self {
        Self {
            payload,
            versioned_hashes: None,
            beacon_root: None,
            execution_requests: None,
        }
    }
}

impl NewPayloadVersion {
    pub fn check(
        self,
        method: PayloadMethod,
        config: &Config,
        params: PayloadParams,
    ) -> Result<(), Error> {
        let PayloadParams {
            payload,
            versioned_hashes,
            beacon_root,
            execution_requests,
        } = params;

        let method = method_name(method, self);

        match self {
            Self::V1 => {
                if payload.withdrawals.is_some() {
                    return Err(Error::invalid_params("withdrawals not supported in V1"));
                }
            }
            Self::V2 => {
                if config.is_cancun(payload.timestamp) {
                    return Err(Error::invalid_params(format!(
                        "can't use {method} post-cancun",
                    )));
                }

                if config.latest_fork(payload.timestamp) == Fork::Shanghai {
                    if payload.withdrawals.is_none() {
                        return Err(Error::invalid_params("nil withdrawals post-shanghai"));
                    }
                } else if payload.withdrawals.is_some() {
                    return Err(Error::invalid_params("non-nil withdrawals pre-shanghai"));
                }

                if payload.excess_blob_gas.is_some() {
                    return Err(Error::invalid_params("non-nil excessBlobGas pre-cancun"));
                }

                if payload.blob_gas_used.is_some() {
                    return Err(Error::invalid_params("non-nil blobGasUsed pre-cancun"));
                }
            }
            Self::V3 | Self::V4 => {
                check_cancun_fields(payload, versioned_hashes, beacon_root)?;

                if self == Self::V3 {
                    if config.latest_fork(payload.timestamp) != Fork::Cancun {
                        return Err(Error::unsupported_fork(format!(
                            "{method} must only be called for cancun payloads",
                        )));
                    }

                    return Ok(());
                }

                if execution_requests.is_none() {
                    return Err(Error::invalid_params("nil executionRequests post-prague"));
                }

                if !matches!(
                    config.latest_fork(payload.timestamp),
                    Fork::Prague | Fork::Osaka,
                ) {
                    return Err(Error::unsupported_fork(format!(
                        "{method} must only be called for prague payloads",
                    )));
                }

                if config.is_isthmus(payload.timestamp) && payload.withdrawals_root.is_none() {
                    return Err(Error::invalid_params("nil withdrawalsRoot post-isthmus"));
                }
            }
        }

        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum GetPayloadVersion {
    V1,
    V2,
    V3,
    V4,
}

impl GetPayloadVersion {
    const fn accepted_payloads(self) -> &'static [PayloadVersion] {
        match self {
            Self::V1 => &[PayloadVersion::V1],
            Self::V2 => &[PayloadVersion::V1, PayloadVersion::V2],
            Self::V3 | Self::V4 => &[PayloadVersion::V3],
        }
    }

    pub fn check(self, id: PayloadId) -> Result<(), Error> {
        if id.is(self.accepted_payloads()) {
            return Ok(());
        }

        Err(Error::unsupported_fork(format!(
            "getPayload{self:?} does not serve payload {id}",
        )))
    }
}

fn check_cancun_fields(
    payload: &ExecutionPayload,
    versioned_hashes: Option<&[VersionedHash]>,
    beacon_root: Option<H256>,
) -> Result<(), Error> {
    if payload.withdrawals.is_none() {
        return Err(Error::invalid_params("nil withdrawals post-shanghai"));
    }

    if payload.excess_blob_gas.is_none() {
        return Err(Error::invalid_params("nil excessBlobGas post-cancun"));
    }

    if payload.blob_gas_used.is_none() {
        return Err(Error::invalid_params("nil blobGasUsed post-cancun"));
    }

    if versioned_hashes.is_none() {
        return Err(Error::invalid_params("nil versionedHashes post-cancun"));
    }

    if beacon_root.is_none() {
        return Err(Error::invalid_params("nil beaconRoot post-cancun"));
    }

    Ok(())
}

fn method_name(method: PayloadMethod, version: NewPayloadVersion) -> String {
    let version = match version {
        NewPayloadVersion::V1 => 1,
        NewPayloadVersion::V2 => 2,
        NewPayloadVersion::V3 => 3,
        NewPayloadVersion::V4 => 4,
    };

    format!("{}V{version}", method.name())
}
