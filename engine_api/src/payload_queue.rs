use std::sync::Arc;

use execution_engine::{ExecutionPayloadEnvelope, PayloadId};
use hashlink::LinkedHashMap;
use parking_lot::Mutex;
use payload_builder::Payload;

// Same as the number of payload builds a consensus client may have in flight.
const PAYLOAD_QUEUE_CAPACITY: usize = 10;

/// Payloads built locally in response to forkchoice updates with attributes.
///
/// Dropping an evicted [`Payload`] stops its background improvement.
pub struct PayloadQueue {
    payloads: Mutex<LinkedHashMap<PayloadId, Arc<Payload>>>,
    capacity: usize,
}

impl Default for PayloadQueue {
    fn default() -> Self {
        Self::with_capacity(PAYLOAD_QUEUE_CAPACITY)
    }
}

impl PayloadQueue {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            payloads: Mutex::new(LinkedHashMap::new()),
            capacity,
        }
    }

    pub fn put(&self, id: PayloadId, payload: Payload) {
        let evicted = {
            let mut payloads = self.payloads.lock();

            payloads.insert(id, Arc::new(payload));

            let excess = payloads.len().saturating_sub(self.capacity);

            (0..excess)
                .filter_map(|_| payloads.pop_front())
                .collect::<Vec<_>>()
        };

        // Payloads are dropped outside the lock.
        drop(evicted);
    }

    #[must_use]
    pub fn has(&self, id: PayloadId) -> bool {
        self.payloads.lock().contains_key(&id)
    }

    /// Resolves the payload with the given ID.
    ///
    /// With `full` set, waits until the payload has been improved at least once
    /// or improvement has ended. Otherwise returns the best block built so far.
    pub async fn get(&self, id: PayloadId, full: bool) -> Option<ExecutionPayloadEnvelope> {
        let payload = self.payloads.lock().get(&id).map(Arc::clone)?;

        let envelope = if full {
            payload.resolve_full().await
        } else {
            payload.resolve()
        };

        Some(envelope)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.payloads.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payloads.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use blockchain::dev::{DevChain, DevExecutor, DevTxPool};
    use execution_engine::PayloadVersion;
    use payload_builder::{BuildPayloadArgs, MinerConfig, PayloadBuilder};
    use types::{
        config::Config,
        primitives::{ExecutionAddress, H256},
    };

    use super::*;

    fn builder() -> PayloadBuilder {
        let config = Arc::new(Config::ethereum_devnet());
        let chain = Arc::new(DevChain::new(Arc::clone(&config), Arc::new(DevExecutor)));

        PayloadBuilder::new(
            config,
            chain,
            Arc::new(DevExecutor),
            Arc::new(DevTxPool::default()),
            MinerConfig::default(),
        )
    }

    fn args(parent: H256, timestamp: u64) -> BuildPayloadArgs {
        BuildPayloadArgs {
            parent,
            timestamp,
            fee_recipient: ExecutionAddress::zero(),
            random: H256::zero(),
            withdrawals: Some(vec![]),
            beacon_root: Some(H256::zero()),
            version: PayloadVersion::V3,
            no_tx_pool: true,
            transactions: vec![],
            gas_limit: None,
            eip1559_params: None,
        }
    }

    #[tokio::test]
    async fn oldest_payload_is_evicted_first() -> Result<()> {
        let config = Arc::new(Config::ethereum_devnet());
        let genesis = blockchain::dev::genesis_block(&config).hash();
        let builder = builder();
        let queue = PayloadQueue::with_capacity(2);

        let ids = (1..=3)
            .map(|timestamp| {
                let args = args(genesis, timestamp);
                let id = args.id();
                queue.put(id, builder.build(&args, false)?);
                Ok(id)
            })
            .collect::<Result<Vec<_>>>()?;

        assert_eq!(queue.len(), 2);
        assert!(!queue.has(ids[0]));
        assert!(queue.has(ids[1]));
        assert!(queue.get(ids[0], false).await.is_none());

        let envelope = queue.get(ids[2], true).await;

        assert_eq!(
            envelope.map(|envelope| envelope.execution_payload.timestamp),
            Some(3),
        );

        Ok(())
    }
}
