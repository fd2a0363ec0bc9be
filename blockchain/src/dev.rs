//! In-memory collaborators for development chains and tests.
//!
//! State is modeled as a hash chain over applied transactions and withdrawals.
//! Gas is charged per byte of transaction data. Nothing is persisted.

pub use crate::dev::{
    chain::{genesis_block, DevChain, DEFAULT_GAS_LIMIT},
    downloader::{DevDownloader, SyncRequest},
    executor::{DevExecutor, BLOB_GAS_PER_BLOB, MAX_BLOB_GAS_PER_BLOCK},
    tx_pool::DevTxPool,
};

mod chain;
mod downloader;
mod executor;
mod tx_pool;
