//! EIP-1559 base fee calculation with the OP Stack Holocene extensions.
//!
//! From Holocene onwards the base fee parameters are chosen by the rollup node per block.
//! They are passed in payload attributes as `eip1559Params` (`denominator ++ elasticity`,
//! both big-endian `u32`) and committed to in the block's extra data with a leading version byte.

use thiserror::Error;
use types::{config::Config, execution::Header, primitives::Wei};

pub const HOLOCENE_PARAMS_LENGTH: usize = 8;
pub const HOLOCENE_EXTRA_DATA_LENGTH: usize = 9;
pub const HOLOCENE_EXTRA_DATA_VERSION: u8 = 0;
pub const INITIAL_BASE_FEE: u64 = 1_000_000_000;

#[derive(Debug, Error)]
pub enum Error {
    #[error("holocene eip-1559 params should be 8 bytes, got {length}")]
    ParamsLength { length: usize },
    #[error("holocene params cannot have a 0 denominator unless elasticity is also 0")]
    ZeroDenominator,
    #[error("holocene extraData should be 9 bytes, got {length}")]
    ExtraDataLength { length: usize },
    #[error("holocene extraData should have 0 version byte, got {version}")]
    ExtraDataVersion { version: u8 },
}

#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct HoloceneParams {
    pub denominator: u32,
    pub elasticity: u32,
}

impl HoloceneParams {
    /// Parses `eip1559Params`. Malformed input decodes to zeros; use [`validate_params`] first.
    #[must_use]
    pub fn decode(params: &[u8]) -> Self {
        let Ok(bytes) = <[u8; HOLOCENE_PARAMS_LENGTH]>::try_from(params) else {
            return Self::default();
        };

        let [d0, d1, d2, d3, e0, e1, e2, e3] = bytes;

        Self {
            denominator: u32::from_be_bytes([d0, d1, d2, d3]),
            elasticity: u32::from_be_bytes([e0, e1, e2, e3]),
        }
    }

    #[must_use]
    pub fn decode_extra_data(extra_data: &[u8]) -> Self {
        match extra_data {
            [HOLOCENE_EXTRA_DATA_VERSION, params @ ..]
                if extra_data.len() == HOLOCENE_EXTRA_DATA_LENGTH =>
            {
                Self::decode(params)
            }
            _ => Self::default(),
        }
    }

    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.denominator == 0 && self.elasticity == 0
    }

    #[must_use]
    pub fn encode(self) -> [u8; HOLOCENE_PARAMS_LENGTH] {
        let mut bytes = [0; HOLOCENE_PARAMS_LENGTH];
        bytes[..4].copy_from_slice(&self.denominator.to_be_bytes());
        bytes[4..].copy_from_slice(&self.elasticity.to_be_bytes());
        bytes
    }

    #[must_use]
    pub fn encode_extra_data(self) -> [u8; HOLOCENE_EXTRA_DATA_LENGTH] {
        let mut bytes = [HOLOCENE_EXTRA_DATA_VERSION; HOLOCENE_EXTRA_DATA_LENGTH];
        bytes[1..].copy_from_slice(&self.encode());
        bytes
    }

    /// Replaces zero parameters with the chain's pre-Holocene values.
    #[must_use]
    pub fn or_chain_defaults(self, config: &Config, timestamp: u64) -> Self {
        if !self.is_zero() {
            return self;
        }

        Self {
            denominator: saturate(config.base_fee_change_denominator(timestamp)),
            elasticity: saturate(config.elasticity_multiplier()),
        }
    }
}

pub fn validate_params(params: &[u8]) -> Result<(), Error> {
    if params.len() != HOLOCENE_PARAMS_LENGTH {
        return Err(Error::ParamsLength {
            length: params.len(),
        });
    }

    let HoloceneParams {
        denominator,
        elasticity,
    } = HoloceneParams::decode(params);

    if denominator == 0 && elasticity != 0 {
        return Err(Error::ZeroDenominator);
    }

    Ok(())
}

pub fn validate_extra_data(extra_data: &[u8]) -> Result<(), Error> {
    if extra_data.len() != HOLOCENE_EXTRA_DATA_LENGTH {
        return Err(Error::ExtraDataLength {
            length: extra_data.len(),
        });
    }

    if extra_data[0] != HOLOCENE_EXTRA_DATA_VERSION {
        return Err(Error::ExtraDataVersion {
            version: extra_data[0],
        });
    }

    validate_params(&extra_data[1..])
}

/// Base fee of the block following `parent`.
#[must_use]
pub fn calculate_next_base_fee(config: &Config, parent: &Header, timestamp: u64) -> Wei {
    let Some(parent_base_fee) = parent.base_fee_per_gas else {
        return Wei::from(INITIAL_BASE_FEE);
    };

    let (denominator, elasticity) = if config.is_holocene(parent.timestamp) {
        let params = HoloceneParams::decode_extra_data(&parent.extra_data)
            .or_chain_defaults(config, timestamp);

        (u64::from(params.denominator), u64::from(params.elasticity))
    } else {
        (
            config.base_fee_change_denominator(timestamp),
            config.elasticity_multiplier(),
        )
    };

    let gas_target = parent.gas_limit / elasticity.max(1);

    if gas_target == 0 || parent.gas_used == gas_target {
        return parent_base_fee;
    }

    let gas_target_wei = Wei::from(gas_target);
    let denominator_wei = Wei::from(denominator.max(1));

    if parent.gas_used > gas_target {
        let gas_used_delta = Wei::from(parent.gas_used - gas_target);
        let delta = parent_base_fee * gas_used_delta / gas_target_wei / denominator_wei;
        parent_base_fee.saturating_add(delta.max(Wei::one()))
    } else {
        let gas_used_delta = Wei::from(gas_target - parent.gas_used);
        let delta = parent_base_fee * gas_used_delta / gas_target_wei / denominator_wei;
        parent_base_fee.saturating_sub(delta)
    }
}

fn saturate(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}
