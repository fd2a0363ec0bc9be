//! In-memory record of chains that build on blocks which failed to import.
//!
//! Nothing here is ever persisted. A bug that marks a valid block as bad must be fixable
//! by restarting the client. Bad blocks are also forgotten after being referenced
//! [`INVALID_BLOCK_HIT_EVICTION`] times in case the failure was caused by a race.
//! Only the head of each bad chain is tracked.

use std::collections::HashMap;

use blockchain::Blockchain;
use execution_engine::PayloadStatusV1;
use hashlink::LinkedHashMap;
use log::warn;
use parking_lot::Mutex;
use types::{
    execution::Header,
    primitives::{ExecutionBlockHash, H256},
};

pub const INVALID_BLOCK_HIT_EVICTION: usize = 128;
pub const INVALID_TIPSETS_CAPACITY: usize = 512;

const LINKS_TO_REJECTED_BLOCK: &str = "links to previously rejected block";

#[derive(Default)]
struct State {
    // Bad block hash -> number of times it was referenced.
    hits: HashMap<ExecutionBlockHash, usize>,
    // Chain tip -> bad ancestor.
    tipsets: LinkedHashMap<ExecutionBlockHash, Header>,
}

#[derive(Default)]
pub struct InvalidAncestors {
    state: Mutex<State>,
}

impl InvalidAncestors {
    /// Records that `origin` descends from `invalid`. Called for bad blocks found during sync.
    pub fn mark_invalid(&self, invalid: Header, origin: &Header) {
        let mut state = self.state.lock();

        *state.hits.entry(invalid.hash()).or_default() += 1;
        state.tipsets.insert(origin.hash(), invalid);
    }

    /// Records a block that failed to import as its own bad tip.
    pub fn record_failed_import(&self, header: Header) {
        let hash = header.hash();
        let mut state = self.state.lock();

        state.hits.insert(hash, 1);
        state.tipsets.insert(hash, header);
    }

    /// Checks whether `check` is known to descend from a bad block.
    ///
    /// If it does and `head` differs from `check`, `head` is recorded as a new bad tip.
    /// Returns the status to reply with, or `None` if the chain should be processed.
    pub fn check(
        &self,
        check: ExecutionBlockHash,
        head: ExecutionBlockHash,
        blockchain: &dyn Blockchain,
    ) -> Option<PayloadStatusV1> {
        let mut state = self.state.lock();

        let invalid = state.tipsets.get(&check)?.clone();
        let invalid_hash = invalid.hash();
        let hits = state.hits.entry(invalid_hash).or_default();

        *hits += 1;

        if *hits >= INVALID_BLOCK_HIT_EVICTION {
            warn!(
                "Too many bad block import attempt, trying \
                 (number: {}, hash: {invalid_hash:?})",
                invalid.number,
            );

            state.hits.remove(&invalid_hash);
            state
                .tipsets
                .retain(|_, bad_ancestor| bad_ancestor.hash() != invalid_hash);

            return None;
        }

        if check != head {
            warn!(
                "Marked new chain head as invalid \
                 (hash: {head:?}, bad number: {}, bad hash: {invalid_hash:?})",
                invalid.number,
            );

            while state.tipsets.len() >= INVALID_TIPSETS_CAPACITY {
                state.tipsets.pop_front();
            }

            state.tipsets.insert(head, invalid.clone());
        }

        drop(state);

        // A proof-of-work parent cannot be reported as valid.
        let latest_valid_hash = if blockchain
            .header_by_hash(invalid.parent_hash)
            .is_some_and(|parent| !parent.difficulty.is_zero())
        {
            H256::zero()
        } else {
            invalid.parent_hash
        };

        Some(PayloadStatusV1 {
            latest_valid_hash: Some(latest_valid_hash),
            validation_error: Some(LINKS_TO_REJECTED_BLOCK.to_owned()),
            ..PayloadStatusV1::invalid()
        })
    }

    #[must_use]
    pub fn tipset_count(&self) -> usize {
        self.state.lock().tipsets.len()
    }

    #[cfg(test)]
    fn hits(&self, hash: ExecutionBlockHash) -> Option<usize> {
        self.state.lock().hits.get(&hash).copied()
    }
}
