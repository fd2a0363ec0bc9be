//! Assembles execution payloads on top of a parent block and keeps improving them
//! with pool transactions until they are delivered.

pub use crate::{
    args::BuildPayloadArgs,
    builder::{calculate_excess_blob_gas, calculate_gas_limit, PayloadBuilder},
    miner_config::{MinerConfig, DEFAULT_GAS_CEIL, DEFAULT_RECOMMIT},
    payload::{BuiltBlock, Payload},
};

mod args;
mod builder;
mod miner_config;
mod payload;
