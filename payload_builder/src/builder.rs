use core::time::Duration;
use std::{
    sync::Arc,
    time::{Instant, SystemTime, UNIX_EPOCH},
};

use anyhow::{bail, ensure, Context as _, Result};
use blockchain::{BlockEnv, BlockExecutor, Blockchain, TxPool};
use execution_engine::{
    eip1559::{self, HoloceneParams},
    BlobsBundle, PayloadId,
};
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use types::{
    config::Config,
    execution::{self, Block, Body, Header, Withdrawal, MAXIMUM_EXTRA_DATA_SIZE},
    primitives::{Bytes, ExecutionAddress, Gas, UnixSeconds, H256},
    transaction::Transaction,
};

use crate::{
    args::BuildPayloadArgs,
    miner_config::MinerConfig,
    payload::{BuiltBlock, Payload, Updates},
};

// Payloads are abandoned after one slot.
const PAYLOAD_BUILD_DEADLINE: Duration = Duration::from_secs(12);

const GAS_LIMIT_BOUND_DIVISOR: Gas = 1024;
const MIN_GAS_LIMIT: Gas = 5000;
const TRANSACTION_GAS: Gas = 21_000;
const BLOB_GAS_TARGET: Gas = 3 * blockchain::dev::BLOB_GAS_PER_BLOB;

/// Gas limit of a child block moving from `parent_gas_limit` towards `desired`.
///
/// The limit may change by less than 1/1024 of the parent limit per block.
#[must_use]
pub fn calculate_gas_limit(parent_gas_limit: Gas, desired: Gas) -> Gas {
    let delta = (parent_gas_limit / GAS_LIMIT_BOUND_DIVISOR).saturating_sub(1);
    let desired = desired.max(MIN_GAS_LIMIT);

    if parent_gas_limit < desired {
        return (parent_gas_limit + delta).min(desired);
    }

    if parent_gas_limit > desired {
        return parent_gas_limit.saturating_sub(delta).max(desired);
    }

    parent_gas_limit
}

#[must_use]
pub fn calculate_excess_blob_gas(parent: &Header) -> Gas {
    let parent_excess = parent.excess_blob_gas.unwrap_or_default();
    let parent_used = parent.blob_gas_used.unwrap_or_default();

    (parent_excess + parent_used).saturating_sub(BLOB_GAS_TARGET)
}

struct GenerateParams<'args> {
    parent: &'args Header,
    timestamp: UnixSeconds,
    fee_recipient: ExecutionAddress,
    random: H256,
    withdrawals: Option<&'args [Withdrawal]>,
    beacon_root: Option<H256>,
    transactions: &'args [Transaction],
    no_txs: bool,
    gas_limit: Option<Gas>,
    eip1559_params: Option<&'args [u8]>,
    want_witness: bool,
}

struct Context {
    config: Arc<Config>,
    blockchain: Arc<dyn Blockchain>,
    executor: Arc<dyn BlockExecutor>,
    tx_pool: Arc<dyn TxPool>,
    miner_config: RwLock<MinerConfig>,
}

impl Context {
    fn generate(&self, params: &GenerateParams) -> Result<BuiltBlock> {
        let config = &self.config;
        let parent = params.parent;
        let timestamp = params.timestamp;
        let miner_config = self.miner_config.read().clone();

        ensure!(
            parent.timestamp < timestamp,
            "invalid timestamp, parent {} given {timestamp}",
            parent.timestamp,
        );

        let gas_limit = match params.gas_limit {
            Some(gas_limit) => gas_limit,
            None if config.is_optimism() => bail!("missing gas limit in payload attributes"),
            None => calculate_gas_limit(parent.gas_limit, miner_config.gas_ceil),
        };

        let extra_data = if config.is_holocene(timestamp) {
            let Some(eip1559_params) = params.eip1559_params else {
                bail!("expected eip1559 params, got none");
            };

            eip1559::validate_params(eip1559_params)?;

            let extra_data = HoloceneParams::decode(eip1559_params)
                .or_chain_defaults(config, timestamp)
                .encode_extra_data();

            Bytes::copy_from_slice(&extra_data)
        } else {
            ensure!(
                params.eip1559_params.is_none(),
                "got eip1559 params, expected none",
            );

            miner_config.extra_data.clone()
        };

        let shanghai = config.is_shanghai(timestamp);
        let cancun = config.is_cancun(timestamp);
        let prague = config.is_prague(timestamp);

        ensure!(
            !shanghai || params.withdrawals.is_some(),
            "missing withdrawals post-shanghai",
        );

        let mut header = Header {
            parent_hash: parent.hash(),
            fee_recipient: params.fee_recipient,
            number: parent.number + 1,
            gas_limit,
            timestamp,
            extra_data,
            mix_hash: params.random,
            base_fee_per_gas: Some(eip1559::calculate_next_base_fee(config, parent, timestamp)),
            excess_blob_gas: cancun.then(|| calculate_excess_blob_gas(parent)),
            parent_beacon_block_root: cancun.then(|| params.beacon_root.unwrap_or_default()),
            ..Header::post_merge_defaults()
        };

        let mut session = self
            .executor
            .begin(parent, BlockEnv::from_header(&header))?;

        let mut transactions = vec![];

        for transaction in params.transactions {
            session.apply(transaction).with_context(|| {
                format!(
                    "failed to force-include tx: {:?} type: {}",
                    transaction.hash(),
                    transaction.tx_type(),
                )
            })?;

            transactions.push(transaction.clone());
        }

        if !params.no_txs {
            self.fill_transactions(&mut *session, &header, &miner_config, &mut transactions);
        }

        let withdrawals = params.withdrawals.filter(|_| shanghai).unwrap_or_default();
        let outcome = session.finish(withdrawals, params.want_witness)?;

        header.state_root = outcome.state_root;
        header.receipts_root = outcome.receipts_root;
        header.logs_bloom = outcome.logs_bloom;
        header.gas_used = outcome.gas_used;
        header.transactions_root = execution::transactions_root(&transactions);
        header.withdrawals_root = shanghai.then(|| execution::withdrawals_root(withdrawals));
        header.blob_gas_used = cancun.then_some(outcome.blob_gas_used);

        let execution_requests = prague.then(Vec::new);

        header.requests_hash = execution_requests
            .as_deref()
            .map(execution_engine::requests_hash);

        let body = Body {
            transactions,
            withdrawals: shanghai.then(|| withdrawals.to_vec()),
        };

        Ok(BuiltBlock {
            block: Arc::new(Block::new(header, body)),
            fees: outcome.fees,
            blobs_bundle: cancun.then(BlobsBundle::default),
            execution_requests,
            witness: outcome.witness,
        })
    }

    fn fill_transactions(
        &self,
        session: &mut dyn blockchain::ExecutionSession,
        header: &Header,
        miner_config: &MinerConfig,
        transactions: &mut Vec<Transaction>,
    ) {
        let mut block_da_size = transactions
            .iter()
            .map(Transaction::data_availability_size)
            .sum::<u64>();

        for transaction in self.tx_pool.pending(header.base_fee_per_gas) {
            if session.gas_used() + TRANSACTION_GAS > header.gas_limit {
                debug!("not enough gas for further transactions (gas limit: {})", header.gas_limit);
                break;
            }

            if transaction.is_deposit() || transactions.contains(&transaction) {
                continue;
            }

            let da_size = transaction.data_availability_size();

            if miner_config
                .max_da_tx_size
                .is_some_and(|max_da_tx_size| da_size > max_da_tx_size)
            {
                continue;
            }

            if miner_config
                .max_da_block_size
                .is_some_and(|max_da_block_size| block_da_size + da_size > max_da_block_size)
            {
                continue;
            }

            match session.apply(&transaction) {
                Ok(_) => {
                    block_da_size += da_size;
                    transactions.push(transaction);
                }
                Err(error) => {
                    features::log!(
                        DebugPayloadBuilder,
                        "skipping transaction {:?}: {error:#}",
                        transaction.hash(),
                    );
                }
            }
        }
    }
}

/// Builds payloads on request of the consensus layer and keeps improving them in the background.
pub struct PayloadBuilder {
    context: Arc<Context>,
    lifecycle: CancellationToken,
    pending: Mutex<Option<Arc<Block>>>,
}

impl PayloadBuilder {
    #[must_use]
    pub fn new(
        config: Arc<Config>,
        blockchain: Arc<dyn Blockchain>,
        executor: Arc<dyn BlockExecutor>,
        tx_pool: Arc<dyn TxPool>,
        miner_config: MinerConfig,
    ) -> Self {
        let context = Context {
            config,
            blockchain,
            executor,
            tx_pool,
            miner_config: RwLock::new(miner_config),
        };

        Self {
            context: Arc::new(context),
            lifecycle: CancellationToken::new(),
            pending: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn miner_config(&self) -> MinerConfig {
        self.context.miner_config.read().clone()
    }

    pub fn set_extra_data(&self, extra_data: Bytes) -> Result<()> {
        ensure!(
            extra_data.len() <= MAXIMUM_EXTRA_DATA_SIZE,
            "extra exceeds max length. {} > {MAXIMUM_EXTRA_DATA_SIZE}",
            extra_data.len(),
        );

        self.context.miner_config.write().extra_data = extra_data;

        Ok(())
    }

    pub fn set_gas_ceil(&self, gas_ceil: Gas) {
        self.context.miner_config.write().gas_ceil = gas_ceil;
    }

    /// Sets data availability limits. Zero means no limit.
    pub fn set_max_da_size(&self, max_tx_size: u64, max_block_size: u64) {
        let mut miner_config = self.context.miner_config.write();
        miner_config.max_da_tx_size = Some(max_tx_size).filter(|size| *size > 0);
        miner_config.max_da_block_size = Some(max_block_size).filter(|size| *size > 0);
    }

    /// Builds the block of forced transactions immediately and starts improving it with pool
    /// transactions unless `no_tx_pool` is set.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build(&self, args: &BuildPayloadArgs, want_witness: bool) -> Result<Payload> {
        let context = &self.context;
        let id = args.id();

        let Some(parent) = context.blockchain.header_by_hash(args.parent) else {
            bail!("missing parent {:?}", args.parent);
        };

        ensure!(
            context.blockchain.has_block_and_state(args.parent),
            "missing state of parent {:?}",
            args.parent,
        );

        let params = GenerateParams {
            parent: &parent,
            timestamp: args.timestamp,
            fee_recipient: args.fee_recipient,
            random: args.random,
            withdrawals: args.withdrawals.as_deref(),
            beacon_root: args.beacon_root,
            transactions: &args.transactions,
            no_txs: true,
            gas_limit: args.gas_limit,
            eip1559_params: args.eip1559_params.as_deref(),
            want_witness,
        };

        let empty = context.generate(&params)?;

        // Forced transactions come first, pool transactions are appended on improvement.
        let improving = !args.no_tx_pool;
        let stop = self.lifecycle.child_token();

        let (payload, updates) =
            Payload::new(id, Arc::clone(&context.config), empty, improving, stop.clone());

        info!(
            "Starting work on payload (id: {id}, parent: {:?}, version: {:?})",
            args.parent, args.version,
        );

        if improving {
            self.spawn_improvement(id, parent, args.clone(), want_witness, updates, stop);
        } else {
            updates.finish_improving();
        }

        Ok(payload)
    }

    fn spawn_improvement(
        &self,
        id: PayloadId,
        parent: Header,
        args: BuildPayloadArgs,
        want_witness: bool,
        updates: Arc<Updates>,
        stop: CancellationToken,
    ) {
        let context = Arc::clone(&self.context);
        let recommit = context.miner_config.read().recommit;

        tokio::spawn(async move {
            let deadline = tokio::time::sleep(PAYLOAD_BUILD_DEADLINE);
            let mut interval = tokio::time::interval(recommit);

            tokio::pin!(deadline);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let start = Instant::now();

                        let params = GenerateParams {
                            parent: &parent,
                            timestamp: args.timestamp,
                            fee_recipient: args.fee_recipient,
                            random: args.random,
                            withdrawals: args.withdrawals.as_deref(),
                            beacon_root: args.beacon_root,
                            transactions: &args.transactions,
                            no_txs: false,
                            gas_limit: args.gas_limit,
                            eip1559_params: args.eip1559_params.as_deref(),
                            want_witness,
                        };

                        match context.generate(&params) {
                            Ok(built) => updates.improve(id, built, start.elapsed()),
                            Err(error) => warn!("Error while generating work (id: {id}): {error:#}"),
                        }
                    }
                    () = stop.cancelled() => break,
                    () = &mut deadline => {
                        info!("Stopping work on payload (id: {id}, reason: timeout)");
                        break;
                    }
                }
            }

            updates.finish_improving();
        });
    }

    /// Block served as `pending` by the node.
    ///
    /// Rollups serve the head block unless configured to compute a pending block.
    pub fn pending(&self) -> Result<Option<Arc<Block>>> {
        let context = &self.context;
        let config = &context.config;
        let head = context.blockchain.current_header();
        let miner_config = self.miner_config();

        if config.is_optimism() && !miner_config.rollup_compute_pending_block {
            return Ok(context.blockchain.block_by_hash(head.hash()));
        }

        let mut pending = self.pending.lock();

        if let Some(block) = pending.as_ref() {
            if block.parent_hash() == head.hash() {
                return Ok(Some(Arc::clone(block)));
            }
        }

        let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
        let timestamp = now.max(head.timestamp + 1);

        let withdrawals = config.is_shanghai(timestamp).then(Vec::new);
        let holocene_params = HoloceneParams::default().encode();

        let params = GenerateParams {
            parent: &head,
            timestamp,
            fee_recipient: miner_config.pending_fee_recipient,
            random: H256::zero(),
            withdrawals: withdrawals.as_deref(),
            beacon_root: None,
            transactions: &[],
            no_txs: false,
            gas_limit: config.is_optimism().then_some(head.gas_limit),
            eip1559_params: config
                .is_holocene(timestamp)
                .then_some(holocene_params.as_slice()),
            want_witness: false,
        };

        let built = context.generate(&params)?;

        *pending = Some(Arc::clone(&built.block));

        Ok(Some(built.block))
    }

    /// Stops improving all payloads.
    pub fn close(&self) {
        self.lifecycle.cancel();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lifecycle.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use blockchain::dev::{DevChain, DevExecutor, DevTxPool};
    use execution_engine::PayloadVersion;
    use hex_literal::hex;
    use test_case::test_case;

    use super::*;

    struct Setup {
        chain: Arc<DevChain>,
        tx_pool: Arc<DevTxPool>,
        builder: PayloadBuilder,
    }

    fn setup(config: Config) -> Setup {
        let config = Arc::new(config);
        let chain = Arc::new(DevChain::new(Arc::clone(&config), Arc::new(DevExecutor)));
        let tx_pool = Arc::new(DevTxPool::default());

        let builder = PayloadBuilder::new(
            config,
            Arc::clone(&chain) as Arc<dyn Blockchain>,
            Arc::new(DevExecutor),
            Arc::clone(&tx_pool) as Arc<dyn TxPool>,
            MinerConfig::default(),
        );

        Setup {
            chain,
            tx_pool,
            builder,
        }
    }

    fn args(chain: &DevChain) -> BuildPayloadArgs {
        BuildPayloadArgs {
            parent: chain.genesis().hash(),
            timestamp: 12,
            fee_recipient: ExecutionAddress::repeat_byte(0xfe),
            random: H256::repeat_byte(1),
            withdrawals: Some(vec![]),
            beacon_root: Some(H256::zero()),
            version: PayloadVersion::V3,
            no_tx_pool: false,
            transactions: vec![],
            gas_limit: None,
            eip1559_params: None,
        }
    }

    fn transaction(data: u8) -> Result<Transaction> {
        Ok(Transaction::decode(vec![0xc2, 0x01, data])?)
    }

    #[test_case(30_000_000, 30_000_000 => 30_000_000)]
    #[test_case(30_000_000, 60_000_000 => 30_029_295)]
    #[test_case(30_000_000, 30_010_000 => 30_010_000)]
    #[test_case(30_000_000, 0 => 29_970_705)]
    #[test_case(5000, 0 => 5000)]
    fn gas_limit_moves_towards_desired(parent_gas_limit: Gas, desired: Gas) -> Gas {
        calculate_gas_limit(parent_gas_limit, desired)
    }

    #[test]
    fn excess_blob_gas_subtracts_target() {
        let parent = Header {
            excess_blob_gas: Some(BLOB_GAS_TARGET),
            blob_gas_used: Some(2 * blockchain::dev::BLOB_GAS_PER_BLOB),
            ..Header::default()
        };

        assert_eq!(
            calculate_excess_blob_gas(&parent),
            2 * blockchain::dev::BLOB_GAS_PER_BLOB,
        );
        assert_eq!(calculate_excess_blob_gas(&Header::default()), 0);
    }

    #[tokio::test]
    async fn payload_is_improved_with_pool_transactions() -> Result<()> {
        let Setup {
            chain,
            tx_pool,
            builder,
        } = setup(Config::ethereum_devnet());

        tx_pool.add(transaction(2)?);

        let args = args(&chain);
        let payload = builder.build(&args, false)?;

        assert_eq!(payload.id(), args.id());

        let envelope = payload.resolve_full().await;

        assert_eq!(envelope.execution_payload.transactions.len(), 1);
        assert_eq!(envelope.block_value, 21_048_u64.into());
        assert!(envelope.blobs_bundle.is_some());
        assert_eq!(envelope.execution_requests.map(|requests| requests.0.len()), Some(0));

        let block = execution_engine::payload_to_block(
            chain.config(),
            &envelope.execution_payload,
            execution_engine::SidecarParams {
                parent_beacon_block_root: envelope.parent_beacon_block_root,
                execution_requests: Some(&[]),
                ..Default::default()
            },
        )?;

        chain.insert_block_without_set_head(&block, false)?;

        Ok(())
    }

    #[tokio::test]
    async fn pool_transactions_follow_explicit_transactions() -> Result<()> {
        let Setup {
            chain,
            tx_pool,
            builder,
        } = setup(Config::ethereum_devnet());

        tx_pool.add(transaction(2)?);

        let args = BuildPayloadArgs {
            transactions: vec![transaction(3)?],
            ..args(&chain)
        };

        let payload = builder.build(&args, false)?;

        assert_eq!(
            payload.resolve_full().await.execution_payload.transactions,
            [
                Bytes::from_static(&hex!("c20103")),
                Bytes::from_static(&hex!("c20102")),
            ],
        );

        Ok(())
    }

    #[tokio::test]
    async fn no_tx_pool_keeps_explicit_transactions_only() -> Result<()> {
        let Setup {
            chain,
            tx_pool,
            builder,
        } = setup(Config::ethereum_devnet());

        tx_pool.add(transaction(2)?);

        let args = BuildPayloadArgs {
            transactions: vec![transaction(3)?],
            no_tx_pool: true,
            ..args(&chain)
        };

        let envelope = builder.build(&args, false)?.resolve_full().await;

        assert_eq!(
            envelope.execution_payload.transactions,
            [Bytes::from_static(&hex!("c20103"))],
        );

        Ok(())
    }

    #[tokio::test]
    async fn failing_explicit_transaction_fails_build() -> Result<()> {
        let Setup { chain, builder, .. } = setup(Config::ethereum_devnet());

        let args = BuildPayloadArgs {
            transactions: vec![transaction(3)?],
            gas_limit: Some(21_000),
            ..args(&chain)
        };

        let error = builder
            .build(&args, false)
            .err()
            .ok_or_else(|| anyhow::anyhow!("build should fail"))?;

        assert!(error.to_string().starts_with("failed to force-include tx"));

        Ok(())
    }

    #[tokio::test]
    async fn data_availability_limits_skip_transactions() -> Result<()> {
        let Setup {
            chain,
            tx_pool,
            builder,
        } = setup(Config::ethereum_devnet());

        builder.set_max_da_size(2, 0);
        tx_pool.add(transaction(2)?);

        let envelope = builder.build(&args(&chain), false)?.resolve_full().await;

        assert!(envelope.execution_payload.transactions.is_empty());
        assert_eq!(builder.miner_config().max_da_block_size, None);

        Ok(())
    }

    #[tokio::test]
    async fn rollup_requires_gas_limit() -> Result<()> {
        let Setup { chain, builder, .. } = setup(Config::optimism_devnet());

        let args = BuildPayloadArgs {
            eip1559_params: Some(Bytes::from_static(&[0; 8])),
            ..args(&chain)
        };

        builder
            .build(&args, false)
            .err()
            .ok_or_else(|| anyhow::anyhow!("build without gas limit should fail"))?;

        Ok(())
    }

    #[test_case([0, 0, 0, 8, 0, 0, 0, 2] => hex!("000000000800000002"); "explicit")]
    #[test_case([0; 8] => hex!("00000000fa00000032"); "chain defaults")]
    fn holocene_extra_data_encodes_params(params: [u8; 8]) -> [u8; 9] {
        let Setup { chain, builder, .. } = setup(Config::optimism_devnet());

        let args = BuildPayloadArgs {
            gas_limit: Some(30_000_000),
            eip1559_params: Some(Bytes::copy_from_slice(&params)),
            no_tx_pool: true,
            ..args(&chain)
        };

        let envelope = builder
            .build(&args, false)
            .expect("build should succeed")
            .resolve();

        envelope
            .execution_payload
            .extra_data
            .as_ref()
            .try_into()
            .expect("extra data should be 9 bytes long")
    }

    #[tokio::test]
    async fn witness_is_attached_on_request() -> Result<()> {
        let Setup { chain, builder, .. } = setup(Config::ethereum_devnet());

        let args = BuildPayloadArgs {
            no_tx_pool: true,
            ..args(&chain)
        };

        let envelope = builder.build(&args, true)?.resolve();
        let witness = envelope
            .witness
            .ok_or_else(|| anyhow::anyhow!("witness missing"))?;

        let witness = types::witness::ExecutionWitness::from_rlp(&witness)?;

        assert_eq!(witness.parent_header(), Some(chain.genesis().header()));

        Ok(())
    }

    #[test]
    fn extra_data_is_limited() {
        let Setup { builder, .. } = setup(Config::ethereum_devnet());

        builder
            .set_extra_data(Bytes::from(vec![0; 33]))
            .expect_err("extra data longer than 32 bytes should be rejected");
    }

    #[test]
    fn pending_block_on_rollup_is_head() -> Result<()> {
        let Setup { chain, builder, .. } = setup(Config::optimism_devnet());

        let pending = builder.pending()?;

        assert_eq!(pending.map(|block| block.hash()), Some(chain.genesis().hash()));

        Ok(())
    }

    #[test]
    fn pending_block_is_computed_and_cached() -> Result<()> {
        let Setup { chain, builder, .. } = setup(Config::ethereum_devnet());

        let first = builder.pending()?.ok_or_else(|| anyhow::anyhow!("no pending block"))?;
        let second = builder.pending()?.ok_or_else(|| anyhow::anyhow!("no pending block"))?;

        assert_eq!(first.parent_hash(), chain.genesis().hash());
        assert_eq!(first.hash(), second.hash());

        Ok(())
    }

    #[tokio::test]
    async fn close_stops_improvement() -> Result<()> {
        let Setup { chain, builder, .. } = setup(Config::ethereum_devnet());

        builder.close();

        let envelope = builder.build(&args(&chain), false)?.resolve_full().await;

        assert!(builder.is_closed());
        assert!(envelope.execution_payload.transactions.is_empty());

        Ok(())
    }
}
