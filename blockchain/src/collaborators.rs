use std::sync::Arc;

use anyhow::Result;
use execution_engine::BlobAndProofV1;
use thiserror::Error;
use types::{
    execution::{Block, Header, Withdrawal},
    primitives::{
        Bloom, ExecutionAddress, ExecutionBlockHash, ExecutionBlockNumber, Gas, UnixSeconds,
        VersionedHash, Wei, H256,
    },
    transaction::Transaction,
    witness::ExecutionWitness,
};

use crate::SyncMode;

/// Chain storage and canonical chain bookkeeping.
pub trait Blockchain: Send + Sync {
    fn block_by_hash(&self, hash: ExecutionBlockHash) -> Option<Arc<Block>>;

    fn header_by_hash(&self, hash: ExecutionBlockHash) -> Option<Header> {
        self.block_by_hash(hash).map(|block| block.header().clone())
    }

    /// Looks up a block on the canonical chain.
    fn block_by_number(&self, number: ExecutionBlockNumber) -> Option<Arc<Block>>;

    fn canonical_hash(&self, number: ExecutionBlockNumber) -> Option<ExecutionBlockHash>;

    fn current_header(&self) -> Header;

    /// Whether the block is stored and its post-state is available for execution.
    fn has_block_and_state(&self, hash: ExecutionBlockHash) -> bool;

    /// Makes `block` the head of the canonical chain, reorganizing if needed.
    fn set_canonical(&self, block: &Block) -> Result<(), SetCanonicalError>;

    fn set_safe(&self, header: &Header);

    fn set_finalized(&self, header: &Header);

    /// Executes and stores a block without changing the canonical head.
    ///
    /// Returns the witness of the execution if `want_witness` is set.
    fn insert_block_without_set_head(
        &self,
        block: &Block,
        want_witness: bool,
    ) -> Result<Option<ExecutionWitness>>;

    fn sync_mode(&self) -> SyncMode;

    /// Marks the initial sync as finished. Called on every successful forkchoice update.
    fn set_synced(&self);
}

#[derive(Debug, Error)]
#[error("{error}")]
pub struct SetCanonicalError {
    pub latest_valid_hash: ExecutionBlockHash,
    pub error: anyhow::Error,
}

/// Peer-to-peer sync driven by the consensus layer.
pub trait Downloader: Send + Sync {
    /// Starts or retargets a sync towards `head`.
    fn beacon_sync(&self, mode: SyncMode, head: &Header, finalized: Option<&Header>) -> Result<()>;

    /// Extends a sync already in progress by one block. Fails if there is nothing to extend.
    fn beacon_extend(&self, mode: SyncMode, head: &Header) -> Result<()>;
}

/// Sent by the downloader when it finds an invalid block while syncing towards `origin`.
#[derive(Clone, Debug)]
pub struct BadBlockMessage {
    pub invalid: Header,
    pub origin: Header,
}

pub trait TxPool: Send + Sync {
    /// Executable transactions ordered by priority.
    ///
    /// Transactions paying less than `base_fee` are left out.
    fn pending(&self, base_fee: Option<Wei>) -> Vec<Transaction>;

    /// Looks up blobs of pooled blob transactions. The result is aligned with `versioned_hashes`.
    fn blobs(&self, versioned_hashes: &[VersionedHash]) -> Vec<Option<BlobAndProofV1>>;
}

/// Environment of a block being executed, known before its transactions are applied.
#[derive(Clone, Debug)]
pub struct BlockEnv {
    pub number: ExecutionBlockNumber,
    pub timestamp: UnixSeconds,
    pub fee_recipient: ExecutionAddress,
    pub gas_limit: Gas,
    pub base_fee_per_gas: Option<Wei>,
    pub prev_randao: H256,
    pub parent_beacon_block_root: Option<H256>,
}

impl BlockEnv {
    #[must_use]
    pub fn from_header(header: &Header) -> Self {
        Self {
            number: header.number,
            timestamp: header.timestamp,
            fee_recipient: header.fee_recipient,
            gas_limit: header.gas_limit,
            base_fee_per_gas: header.base_fee_per_gas,
            prev_randao: header.mix_hash,
            parent_beacon_block_root: header.parent_beacon_block_root,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ExecutionOutcome {
    pub state_root: H256,
    pub receipts_root: H256,
    pub logs_bloom: Bloom,
    pub gas_used: Gas,
    pub blob_gas_used: Gas,
    /// Priority fees collected by the fee recipient.
    pub fees: Wei,
    pub witness: Option<ExecutionWitness>,
}

#[derive(Clone, Copy, Debug)]
pub struct StatelessOutcome {
    pub state_root: H256,
    pub receipts_root: H256,
}

/// The EVM state transition.
pub trait BlockExecutor: Send + Sync {
    /// Opens a session that applies transactions on top of the post-state of `parent`.
    fn begin(&self, parent: &Header, env: BlockEnv) -> Result<Box<dyn ExecutionSession>>;

    /// Executes `block` using only the state contained in `witness`.
    fn execute_stateless(&self, block: &Block, witness: &ExecutionWitness)
        -> Result<StatelessOutcome>;
}

pub trait ExecutionSession: Send {
    /// Applies a transaction and returns the gas it used.
    ///
    /// A failed transaction leaves the session unchanged.
    fn apply(&mut self, transaction: &Transaction) -> Result<Gas>;

    fn gas_used(&self) -> Gas;

    fn blob_gas_used(&self) -> Gas;

    fn finish(
        self: Box<Self>,
        withdrawals: &[Withdrawal],
        want_witness: bool,
    ) -> Result<ExecutionOutcome>;
}
