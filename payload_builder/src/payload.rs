use core::time::Duration;
use std::sync::Arc;

use execution_engine::{BlobsBundle, ExecutionPayloadEnvelope, PayloadId};
use log::info;
use parking_lot::Mutex;
use prometheus_metrics::METRICS;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use types::{
    config::Config,
    execution::Block,
    primitives::{Bytes, Wei},
    witness::ExecutionWitness,
};

/// A block produced by one round of payload building.
#[derive(Clone, Debug)]
pub struct BuiltBlock {
    pub block: Arc<Block>,
    pub fees: Wei,
    pub blobs_bundle: Option<BlobsBundle>,
    pub execution_requests: Option<Vec<Bytes>>,
    pub witness: Option<ExecutionWitness>,
}

pub(crate) struct PayloadState {
    empty: BuiltBlock,
    full: Option<BuiltBlock>,
    improving: bool,
}

pub(crate) struct Updates {
    state: Mutex<PayloadState>,
    notify: Notify,
}

impl Updates {
    /// Replaces the full block if `candidate` collects more fees.
    pub(crate) fn improve(&self, id: PayloadId, candidate: BuiltBlock, elapsed: Duration) {
        let mut state = self.state.lock();

        if state
            .full
            .as_ref()
            .is_some_and(|full| full.fees >= candidate.fees)
        {
            return;
        }

        info!(
            "Updated payload (id: {id}, number: {}, hash: {:?}, txs: {}, gas: {}, fees: {}, \
             elapsed: {elapsed:?})",
            candidate.block.number(),
            candidate.block.hash(),
            candidate.block.transactions().len(),
            candidate.block.header().gas_used,
            candidate.fees,
        );

        state.full = Some(candidate);

        drop(state);

        if let Some(metrics) = METRICS.get() {
            metrics.payload_improvements.inc();
        }

        self.notify.notify_waiters();
    }

    pub(crate) fn finish_improving(&self) {
        self.state.lock().improving = false;

        self.notify.notify_waiters();
    }
}

/// A payload being built. Holds the empty block from the start and the best full block so far.
pub struct Payload {
    id: PayloadId,
    config: Arc<Config>,
    updates: Arc<Updates>,
    stop: CancellationToken,
}

impl Drop for Payload {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

impl Payload {
    pub(crate) fn new(
        id: PayloadId,
        config: Arc<Config>,
        empty: BuiltBlock,
        improving: bool,
        stop: CancellationToken,
    ) -> (Self, Arc<Updates>) {
        let updates = Arc::new(Updates {
            state: Mutex::new(PayloadState {
                empty,
                full: None,
                improving,
            }),
            notify: Notify::new(),
        });

        let payload = Self {
            id,
            config,
            updates: Arc::clone(&updates),
            stop,
        };

        (payload, updates)
    }

    #[must_use]
    pub const fn id(&self) -> PayloadId {
        self.id
    }

    /// Returns the best block so far without waiting and stops further improvement.
    #[must_use]
    pub fn resolve(&self) -> ExecutionPayloadEnvelope {
        self.stop_improving("delivery");

        let state = self.updates.state.lock();

        self.envelope(state.full.as_ref().unwrap_or(&state.empty))
    }

    /// Waits for the first improved block, or for improvement to end.
    pub async fn resolve_full(&self) -> ExecutionPayloadEnvelope {
        loop {
            let notified = self.updates.notify.notified();

            {
                let state = self.updates.state.lock();

                if state.full.is_some() || !state.improving {
                    drop(state);
                    return self.resolve();
                }
            }

            notified.await;
        }
    }

    fn stop_improving(&self, reason: &str) {
        if !self.stop.is_cancelled() {
            info!("Stopping work on payload (id: {}, reason: {reason})", self.id);
            self.stop.cancel();
        }
    }

    fn envelope(&self, built: &BuiltBlock) -> ExecutionPayloadEnvelope {
        execution_engine::block_to_envelope(
            &self.config,
            &built.block,
            built.fees,
            built.blobs_bundle.clone(),
            built.execution_requests.clone(),
            built.witness.as_ref().map(ExecutionWitness::to_rlp),
        )
    }
}
