use core::sync::atomic::{AtomicBool, Ordering};
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

use anyhow::{anyhow, ensure, Context as _, Result};
use execution_engine::eip1559;
use log::debug;
use parking_lot::RwLock;
use types::{
    config::Config,
    execution::{Block, Body, Header},
    primitives::{Difficulty, ExecutionBlockHash, ExecutionBlockNumber, Gas, Wei, H256},
    witness::ExecutionWitness,
};

use crate::{BlockEnv, BlockExecutor, Blockchain, SetCanonicalError, SyncMode};

pub const DEFAULT_GAS_LIMIT: Gas = 30_000_000;

/// Genesis block of a development chain.
///
/// Fork-dependent header fields are present if the corresponding fork is active at time 0.
#[must_use]
pub fn genesis_block(config: &Config) -> Block {
    let shanghai = config.is_shanghai(0);
    let cancun = config.is_cancun(0);

    // A chain with a nonzero TTD starts out with proof of work.
    let difficulty = match config.terminal_total_difficulty {
        Some(ttd) if !ttd.is_zero() => Difficulty::one(),
        _ => Difficulty::zero(),
    };

    let header = Header {
        state_root: hashing::keccak256(config.chain_id.to_be_bytes()),
        transactions_root: hashing::EMPTY_ROOT_HASH,
        receipts_root: hashing::EMPTY_ROOT_HASH,
        difficulty,
        gas_limit: DEFAULT_GAS_LIMIT,
        base_fee_per_gas: Some(Wei::from(eip1559::INITIAL_BASE_FEE)),
        withdrawals_root: shanghai.then_some(hashing::EMPTY_ROOT_HASH),
        blob_gas_used: cancun.then_some(0),
        excess_blob_gas: cancun.then_some(0),
        parent_beacon_block_root: cancun.then_some(H256::zero()),
        requests_hash: config
            .is_prague(0)
            .then(|| execution_engine::requests_hash(&[])),
        ..Header::post_merge_defaults()
    };

    let body = Body {
        transactions: vec![],
        withdrawals: shanghai.then(Vec::new),
    };

    Block::new(header, body)
}

struct ChainState {
    blocks: HashMap<ExecutionBlockHash, Arc<Block>>,
    with_state: HashSet<ExecutionBlockHash>,
    canonical: BTreeMap<ExecutionBlockNumber, ExecutionBlockHash>,
    head: Arc<Block>,
    safe: Option<Header>,
    finalized: Option<Header>,
    sync_mode: SyncMode,
}

/// Chain storage backed by hash maps. Every stored block except those added with
/// [`DevChain::insert_block_without_state`] has its state available.
pub struct DevChain {
    config: Arc<Config>,
    genesis: Arc<Block>,
    executor: Arc<dyn BlockExecutor>,
    state: RwLock<ChainState>,
    synced: AtomicBool,
}

impl DevChain {
    #[must_use]
    pub fn new(config: Arc<Config>, executor: Arc<dyn BlockExecutor>) -> Self {
        let genesis = Arc::new(genesis_block(&config));
        let hash = genesis.hash();

        let state = ChainState {
            blocks: HashMap::from([(hash, Arc::clone(&genesis))]),
            with_state: HashSet::from([hash]),
            canonical: BTreeMap::from([(0, hash)]),
            head: Arc::clone(&genesis),
            safe: None,
            finalized: None,
            sync_mode: SyncMode::Full,
        };

        Self {
            config,
            genesis,
            executor,
            state: RwLock::new(state),
            synced: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    #[must_use]
    pub fn genesis(&self) -> Arc<Block> {
        Arc::clone(&self.genesis)
    }

    /// Stores a block whose state has not been downloaded, as snap sync would.
    pub fn insert_block_without_state(&self, block: Block) {
        self.state
            .write()
            .blocks
            .insert(block.hash(), Arc::new(block));
    }

    pub fn set_sync_mode(&self, sync_mode: SyncMode) {
        self.state.write().sync_mode = sync_mode;
    }

    #[must_use]
    pub fn safe_header(&self) -> Option<Header> {
        self.state.read().safe.clone()
    }

    #[must_use]
    pub fn finalized_header(&self) -> Option<Header> {
        self.state.read().finalized.clone()
    }

    #[must_use]
    pub fn is_synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }

    fn validate_header(&self, parent: &Header, header: &Header) -> Result<()> {
        ensure!(
            header.number == parent.number + 1,
            "invalid block number (parent: {}, block: {})",
            parent.number,
            header.number,
        );

        ensure!(
            header.timestamp > parent.timestamp,
            "invalid timestamp (parent: {}, block: {})",
            parent.timestamp,
            header.timestamp,
        );

        let expected_base_fee =
            eip1559::calculate_next_base_fee(&self.config, parent, header.timestamp);

        ensure!(
            header.base_fee_per_gas == Some(expected_base_fee),
            "invalid baseFee: have {:?}, want {expected_base_fee}, parentBaseFee {:?}, \
             parentGasUsed {}",
            header.base_fee_per_gas,
            parent.base_fee_per_gas,
            parent.gas_used,
        );

        Ok(())
    }
}

impl Blockchain for DevChain {
    fn block_by_hash(&self, hash: ExecutionBlockHash) -> Option<Arc<Block>> {
        self.state.read().blocks.get(&hash).cloned()
    }

    fn block_by_number(&self, number: ExecutionBlockNumber) -> Option<Arc<Block>> {
        let state = self.state.read();
        let hash = state.canonical.get(&number)?;
        state.blocks.get(hash).cloned()
    }

    fn canonical_hash(&self, number: ExecutionBlockNumber) -> Option<ExecutionBlockHash> {
        self.state.read().canonical.get(&number).copied()
    }

    fn current_header(&self) -> Header {
        self.state.read().head.header().clone()
    }

    fn has_block_and_state(&self, hash: ExecutionBlockHash) -> bool {
        self.state.read().with_state.contains(&hash)
    }

    fn set_canonical(&self, block: &Block) -> Result<(), SetCanonicalError> {
        let mut state = self.state.write();
        let latest_valid_hash = state.head.hash();

        let fail = |error| SetCanonicalError {
            latest_valid_hash,
            error,
        };

        let head = state
            .blocks
            .get(&block.hash())
            .cloned()
            .ok_or_else(|| fail(anyhow!("unknown block {:?}", block.hash())))?;

        if !state.with_state.contains(&head.hash()) {
            return Err(fail(anyhow!("block {:?} has no state", head.hash())));
        }

        let mut new_branch = vec![];
        let mut cursor = Arc::clone(&head);

        while state.canonical.get(&cursor.number()) != Some(&cursor.hash()) {
            new_branch.push((cursor.number(), cursor.hash()));

            cursor = state
                .blocks
                .get(&cursor.parent_hash())
                .cloned()
                .ok_or_else(|| fail(anyhow!("missing ancestor {:?}", cursor.parent_hash())))?;
        }

        let dropped = state
            .canonical
            .range(cursor.number() + 1..)
            .count();

        if dropped > 0 {
            debug!(
                "chain reorganized (common ancestor: {}, dropped blocks: {dropped}, \
                 added blocks: {})",
                cursor.number(),
                new_branch.len(),
            );
        }

        state.canonical.retain(|number, _| *number <= cursor.number());
        state.canonical.extend(new_branch);
        state.head = head;

        Ok(())
    }

    fn set_safe(&self, header: &Header) {
        self.state.write().safe = Some(header.clone());
    }

    fn set_finalized(&self, header: &Header) {
        self.state.write().finalized = Some(header.clone());
    }

    fn insert_block_without_set_head(
        &self,
        block: &Block,
        want_witness: bool,
    ) -> Result<Option<ExecutionWitness>> {
        let parent = {
            let state = self.state.read();

            ensure!(
                state.with_state.contains(&block.parent_hash()),
                "parent state {:?} not available",
                block.parent_hash(),
            );

            state
                .blocks
                .get(&block.parent_hash())
                .cloned()
                .ok_or_else(|| anyhow!("unknown ancestor {:?}", block.parent_hash()))?
        };

        let header = block.header();

        self.validate_header(parent.header(), header)?;

        let mut session = self
            .executor
            .begin(parent.header(), BlockEnv::from_header(header))?;

        for (index, transaction) in block.transactions().iter().enumerate() {
            session
                .apply(transaction)
                .with_context(|| format!("could not apply tx {index} [{:?}]", transaction.hash()))?;
        }

        let outcome = session.finish(block.withdrawals().unwrap_or_default(), want_witness)?;

        ensure!(
            outcome.gas_used == header.gas_used,
            "invalid gas used (remote: {} local: {})",
            header.gas_used,
            outcome.gas_used,
        );

        if let Some(blob_gas_used) = header.blob_gas_used {
            ensure!(
                outcome.blob_gas_used == blob_gas_used,
                "blob gas used mismatch (header {blob_gas_used}, calculated {})",
                outcome.blob_gas_used,
            );
        }

        ensure!(
            outcome.receipts_root == header.receipts_root,
            "invalid receipt root hash (remote: {:x} local: {:x})",
            header.receipts_root,
            outcome.receipts_root,
        );

        ensure!(
            outcome.state_root == header.state_root,
            "invalid merkle root (remote: {:x} local: {:x})",
            header.state_root,
            outcome.state_root,
        );

        let mut state = self.state.write();
        state.blocks.insert(block.hash(), Arc::new(block.clone()));
        state.with_state.insert(block.hash());

        Ok(outcome.witness)
    }

    fn sync_mode(&self) -> SyncMode {
        self.state.read().sync_mode
    }

    fn set_synced(&self) {
        self.synced.store(true, Ordering::SeqCst);
    }
}
