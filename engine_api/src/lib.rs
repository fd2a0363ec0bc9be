//! The Engine API state machine of an execution client.
//!
//! [`ConsensusApi`] answers `engine_*` calls from a consensus client or rollup node.
//! It validates requests against the active fork, imports or defers payloads, moves the
//! canonical head, and starts payload builds. Transport is handled by `http_api`.

pub use crate::{
    consensus_api::{Collaborators, ConsensusApi, PayloadRequest, CAPABILITIES},
    error::Error,
    fork_rules::{ForkchoiceVersion, GetPayloadVersion, NewPayloadVersion, PayloadMethod},
    header_queue::HeaderQueue,
    heartbeat::{Activity, ActivitySnapshot, Heartbeat, HeartbeatMessage, HeartbeatTimings},
    invalid_ancestors::InvalidAncestors,
    payload_queue::PayloadQueue,
    superchain::HaltLevel,
};

mod consensus_api;
mod error;
mod fork_rules;
mod header_queue;
mod heartbeat;
mod invalid_ancestors;
mod payload_queue;
mod superchain;
