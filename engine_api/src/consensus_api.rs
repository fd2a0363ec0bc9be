use core::fmt::Display;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use blockchain::{BadBlockMessage, BlockExecutor, Blockchain, Downloader, SetCanonicalError, TxPool};
use execution_engine::{
    eip1559, BlobAndProofV1, ClientVersionV1, ExecutionPayload, ExecutionPayloadBody,
    ExecutionPayloadEnvelope, ForkChoiceStateV1, ForkChoiceUpdatedResponse, PayloadAttributes,
    PayloadId, PayloadStatusV1, PayloadValidationStatus, SidecarParams, StatelessPayloadStatusV1,
    SuperchainSignal, TransitionConfigurationV1,
};
use futures::{channel::mpsc::UnboundedReceiver, StreamExt as _};
use log::{debug, info, warn};
use logging::{debug_with_head, error_with_head, info_with_head, warn_with_head, HEAD_LOG_METRICS};
use payload_builder::{BuildPayloadArgs, PayloadBuilder};
use prometheus_metrics::Metrics;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use types::{
    config::Config,
    execution::{Block, Header},
    primitives::{Bytes, ExecutionBlockHash, ExecutionBlockNumber, VersionedHash, H256},
    protocol_version::{ProtocolVersion, OP_STACK_SUPPORT},
    transaction::Transaction,
    witness::ExecutionWitness,
};

use crate::{
    error::Error,
    fork_rules::{ForkchoiceVersion, GetPayloadVersion, NewPayloadVersion, PayloadMethod, PayloadParams},
    header_queue::HeaderQueue,
    heartbeat::Activity,
    invalid_ancestors::InvalidAncestors,
    payload_queue::PayloadQueue,
    superchain::{self, HaltLevel},
};

/// Methods advertised by `engine_exchangeCapabilities`.
pub const CAPABILITIES: &[&str] = &[
    "engine_forkchoiceUpdatedV1",
    "engine_forkchoiceUpdatedV2",
    "engine_forkchoiceUpdatedV3",
    "engine_forkchoiceUpdatedWithWitnessV1",
    "engine_forkchoiceUpdatedWithWitnessV2",
    "engine_forkchoiceUpdatedWithWitnessV3",
    "engine_exchangeTransitionConfigurationV1",
    "engine_getPayloadV1",
    "engine_getPayloadV2",
    "engine_getPayloadV3",
    "engine_getPayloadV4",
    "engine_getBlobsV1",
    "engine_newPayloadV1",
    "engine_newPayloadV2",
    "engine_newPayloadV3",
    "engine_newPayloadV4",
    "engine_newPayloadWithWitnessV1",
    "engine_newPayloadWithWitnessV2",
    "engine_newPayloadWithWitnessV3",
    "engine_newPayloadWithWitnessV4",
    "engine_executeStatelessPayloadV1",
    "engine_executeStatelessPayloadV2",
    "engine_executeStatelessPayloadV3",
    "engine_executeStatelessPayloadV4",
    "engine_getPayloadBodiesByHashV1",
    "engine_getPayloadBodiesByHashV2",
    "engine_getPayloadBodiesByRangeV1",
    "engine_getPayloadBodiesByRangeV2",
    "engine_getClientVersionV1",
];

const MAX_BLOB_REQUEST: usize = 128;
const MAX_BODY_REQUEST: u64 = 1024;

/// The parts of the execution client driven through the Engine API.
#[derive(Clone)]
pub struct Collaborators {
    pub blockchain: Arc<dyn Blockchain>,
    pub downloader: Arc<dyn Downloader>,
    pub tx_pool: Arc<dyn TxPool>,
    pub executor: Arc<dyn BlockExecutor>,
}

/// An execution payload together with the parameters sent next to it.
#[derive(Clone, Debug)]
pub struct PayloadRequest {
    pub payload: ExecutionPayload,
    pub versioned_hashes: Option<Vec<VersionedHash>>,
    pub beacon_root: Option<H256>,
    pub execution_requests: Option<Vec<Bytes>>,
}

impl PayloadRequest {
    #[must_use]
    pub const fn v1(payload: ExecutionPayload) -> Self {
        Self {
            payload,
            versioned_hashes: None,
            beacon_root: None,
            execution_requests: None,
        }
    }

    fn params(&self) -> PayloadParams<'_> {
        PayloadParams {
            payload: &self.payload,
            versioned_hashes: self.versioned_hashes.as_deref(),
            beacon_root: self.beacon_root,
            execution_requests: self.execution_requests.as_deref(),
        }
    }

    fn sidecar(&self) -> SidecarParams<'_> {
        SidecarParams {
            versioned_hashes: self.versioned_hashes.as_deref().unwrap_or_default(),
            parent_beacon_block_root: self.beacon_root,
            execution_requests: self.execution_requests.as_deref(),
        }
    }
}

/// Engine API state machine.
///
/// Forkchoice updates and new payloads are each serialized by their own lock.
/// Everything else may run concurrently.
pub struct ConsensusApi {
    config: Arc<Config>,
    blockchain: Arc<dyn Blockchain>,
    downloader: Arc<dyn Downloader>,
    tx_pool: Arc<dyn TxPool>,
    executor: Arc<dyn BlockExecutor>,
    payload_builder: Arc<PayloadBuilder>,
    // Headers of payloads that could not be imported yet. Forkchoice updates may sync to them.
    remote_headers: HeaderQueue,
    local_payloads: PayloadQueue,
    invalid_ancestors: InvalidAncestors,
    activity: Arc<Activity>,
    forkchoice_lock: Mutex<()>,
    new_payload_lock: Mutex<()>,
    halt_level: Option<HaltLevel>,
    shutdown: CancellationToken,
    metrics: Option<Arc<Metrics>>,
}

impl ConsensusApi {
    #[must_use]
    pub fn new(
        config: Arc<Config>,
        collaborators: Collaborators,
        payload_builder: Arc<PayloadBuilder>,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        let Collaborators {
            blockchain,
            downloader,
            tx_pool,
            executor,
        } = collaborators;

        Self {
            config,
            blockchain,
            downloader,
            tx_pool,
            executor,
            payload_builder,
            remote_headers: HeaderQueue::default(),
            local_payloads: PayloadQueue::default(),
            invalid_ancestors: InvalidAncestors::default(),
            activity: Arc::default(),
            forkchoice_lock: Mutex::new(()),
            new_payload_lock: Mutex::new(()),
            halt_level: None,
            shutdown: CancellationToken::new(),
            metrics,
        }
    }

    /// Cancels `shutdown` when a required protocol version is signaled that this node is
    /// `halt_level` or more behind.
    #[must_use]
    pub fn with_halt_level(
        mut self,
        halt_level: Option<HaltLevel>,
        shutdown: CancellationToken,
    ) -> Self {
        self.halt_level = halt_level;
        self.shutdown = shutdown;
        self
    }

    #[must_use]
    pub const fn activity(&self) -> &Arc<Activity> {
        &self.activity
    }

    #[must_use]
    pub const fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Stops improvement of all payloads being built.
    pub fn close(&self) {
        self.payload_builder.close();
    }

    /// Applies bad blocks reported by the downloader until the sender is dropped.
    pub async fn track_bad_blocks(&self, mut bad_block_rx: UnboundedReceiver<BadBlockMessage>) {
        while let Some(BadBlockMessage { invalid, origin }) = bad_block_rx.next().await {
            warn!(
                "Marking chain as invalid (bad number: {}, bad hash: {:?}, origin: {:?})",
                invalid.number,
                invalid.hash(),
                origin.hash(),
            );

            self.invalid_ancestors.mark_invalid(invalid, &origin);
            self.track_invalid_tipsets();
        }
    }

    pub async fn forkchoice_updated(
        &self,
        version: ForkchoiceVersion,
        state: ForkChoiceStateV1,
        attributes: Option<PayloadAttributes>,
        want_witness: bool,
    ) -> Result<ForkChoiceUpdatedResponse, Error> {
        if let Some(attributes) = attributes.as_ref() {
            version.check_attributes(&self.config, attributes)?;
        }

        let response = self
            .update_forkchoice(state, attributes, version, want_witness)
            .await;

        if let (Some(metrics), Ok(response)) = (self.metrics.as_ref(), response.as_ref()) {
            metrics.register_forkchoice_status(response.payload_status.status.as_str());
        }

        response
    }

    pub async fn new_payload(
        &self,
        version: NewPayloadVersion,
        request: PayloadRequest,
        want_witness: bool,
    ) -> Result<PayloadStatusV1, Error> {
        let method = if want_witness {
            PayloadMethod::NewPayloadWithWitness
        } else {
            PayloadMethod::NewPayload
        };

        version.check(method, &self.config, request.params())?;

        if let Some(requests) = request.execution_requests.as_deref() {
            execution_engine::validate_requests(requests).map_err(Error::invalid_params)?;
        }

        let status = self.import_payload(&request, want_witness).await;

        if let Some(metrics) = self.metrics.as_ref() {
            metrics.register_new_payload_status(status.status.as_str());
        }

        Ok(status)
    }

    pub fn execute_stateless_payload(
        &self,
        version: NewPayloadVersion,
        request: &PayloadRequest,
        witness: &[u8],
    ) -> Result<StatelessPayloadStatusV1, Error> {
        version.check(
            PayloadMethod::ExecuteStatelessPayload,
            &self.config,
            request.params(),
        )?;

        Ok(self.execute_stateless(request, witness))
    }

    /// Returns the best payload built so far without waiting for improvements.
    pub async fn get_payload(
        &self,
        version: GetPayloadVersion,
        id: PayloadId,
    ) -> Result<ExecutionPayloadEnvelope, Error> {
        version.check(id)?;

        self.local_payloads
            .get(id, false)
            .await
            .ok_or(Error::UnknownPayload)
    }

    pub fn get_blobs_v1(
        &self,
        versioned_hashes: &[VersionedHash],
    ) -> Result<Vec<Option<BlobAndProofV1>>, Error> {
        if versioned_hashes.len() > MAX_BLOB_REQUEST {
            return Err(Error::TooLargeRequest(format!(
                "requested blob count too large: {}",
                versioned_hashes.len(),
            )));
        }

        Ok(self.tx_pool.blobs(versioned_hashes))
    }

    pub fn get_payload_bodies_by_hash(
        &self,
        hashes: &[ExecutionBlockHash],
    ) -> Result<Vec<Option<ExecutionPayloadBody>>, Error> {
        if hashes.len() as u64 > MAX_BODY_REQUEST {
            return Err(Error::TooLargeRequest(format!(
                "requested count too large: {}",
                hashes.len(),
            )));
        }

        let bodies = hashes
            .iter()
            .map(|hash| {
                self.blockchain
                    .block_by_hash(*hash)
                    .map(|block| execution_engine::payload_body(&block))
            })
            .collect();

        Ok(bodies)
    }

    /// Bodies of canonical blocks starting at `start`. The range is cut off at the head.
    pub fn get_payload_bodies_by_range(
        &self,
        start: ExecutionBlockNumber,
        count: u64,
    ) -> Result<Vec<Option<ExecutionPayloadBody>>, Error> {
        if start == 0 || count == 0 {
            return Err(Error::invalid_params(format!(
                "invalid start or count, start: {start} count: {count}",
            )));
        }

        if count > MAX_BODY_REQUEST {
            return Err(Error::TooLargeRequest(format!(
                "requested count too large: {count}",
            )));
        }

        let current = self.blockchain.current_header().number;
        let last = start.saturating_add(count - 1).min(current);

        let bodies = (start..=last)
            .map(|number| {
                self.blockchain
                    .block_by_number(number)
                    .map(|block| execution_engine::payload_body(&block))
            })
            .collect();

        Ok(bodies)
    }

    pub fn exchange_transition_configuration_v1(
        &self,
        remote: TransitionConfigurationV1,
    ) -> Result<TransitionConfigurationV1, Error> {
        let Some(remote_ttd) = remote.terminal_total_difficulty else {
            return Err(anyhow!("invalid terminal total difficulty").into());
        };

        self.activity.record_transition_update();

        let local_ttd = self.config.terminal_total_difficulty;

        if local_ttd != Some(remote_ttd) {
            let local = local_ttd.map_or_else(|| "<nil>".to_owned(), |ttd| ttd.to_string());

            warn!("Invalid TTD configured (local: {local}, consensus: {remote_ttd})");

            return Err(anyhow!("invalid ttd: execution {local} consensus {remote_ttd}").into());
        }

        if remote.terminal_block_hash.is_zero() {
            return Ok(TransitionConfigurationV1 {
                terminal_total_difficulty: Some(remote_ttd),
                terminal_block_hash: H256::zero(),
                terminal_block_number: 0,
            });
        }

        if self.blockchain.canonical_hash(remote.terminal_block_number)
            != Some(remote.terminal_block_hash)
        {
            return Err(anyhow!("invalid terminal block hash").into());
        }

        Ok(remote)
    }

    #[must_use]
    pub fn exchange_capabilities(&self, remote: &[String]) -> &'static [&'static str] {
        debug!("Consensus client capabilities: {remote:?}");

        CAPABILITIES
    }

    #[must_use]
    pub fn get_client_version_v1(&self, remote: &ClientVersionV1) -> Vec<ClientVersionV1> {
        debug!("Consensus client version: {remote}");

        vec![ClientVersionV1 {
            code: rollup_engine_version::CLIENT_CODE.to_owned(),
            name: rollup_engine_version::APPLICATION_NAME.to_owned(),
            version: rollup_engine_version::APPLICATION_VERSION.to_owned(),
            commit: rollup_engine_version::short_commit(),
        }]
    }

    /// Logs how the local protocol version compares to the signaled ones and halts if configured.
    pub fn signal_superchain_v1(&self, signal: Option<SuperchainSignal>) -> ProtocolVersion {
        let Some(SuperchainSignal {
            recommended,
            required,
        }) = signal
        else {
            info!("Received empty superchain version signal (local: {OP_STACK_SUPPORT})");
            return OP_STACK_SUPPORT;
        };

        superchain::log_support(OP_STACK_SUPPORT, recommended, "recommended");
        superchain::log_support(OP_STACK_SUPPORT, required, "required");

        if superchain::should_halt(self.halt_level, OP_STACK_SUPPORT, required) {
            error_with_head!(
                "Opted to halt, unprepared for protocol change \
                 (required: {required}, local: {OP_STACK_SUPPORT})",
            );

            self.close();
            self.shutdown.cancel();
        }

        OP_STACK_SUPPORT
    }

    async fn update_forkchoice(
        &self,
        state: ForkChoiceStateV1,
        attributes: Option<PayloadAttributes>,
        version: ForkchoiceVersion,
        want_witness: bool,
    ) -> Result<ForkChoiceUpdatedResponse, Error> {
        let _guard = self.forkchoice_lock.lock().await;

        let ForkChoiceStateV1 {
            head_block_hash: head_hash,
            safe_block_hash: safe_hash,
            finalized_block_hash: finalized_hash,
        } = state;

        if head_hash.is_zero() {
            warn_with_head!("Forkchoice requested update to zero hash");
            return Ok(ForkChoiceUpdatedResponse::new(PayloadStatusV1::invalid()));
        }

        self.activity.record_forkchoice_update();

        let Some(head) = self.blockchain.block_by_hash(head_hash) else {
            return self.sync_to_unknown_head(head_hash, finalized_hash);
        };

        if head.header().is_pre_merge() && head.number() > 0 {
            let parent = self
                .blockchain
                .header_by_hash(head.parent_hash())
                .ok_or_else(|| anyhow!("parent unavailable for difficulty check"))?;

            if !parent.is_pre_merge() {
                error_with_head!(
                    "Parent block is already post-ttd \
                     (number: {}, hash: {head_hash:?}, difficulty: {})",
                    head.number(),
                    head.header().difficulty,
                );

                let status = PayloadStatusV1::new(PayloadValidationStatus::InvalidTerminalBlock);
                return Ok(ForkChoiceUpdatedResponse::new(status));
            }
        }

        if self.blockchain.canonical_hash(head.number()) != Some(head_hash) {
            if let Err(SetCanonicalError {
                latest_valid_hash,
                error,
            }) = self.blockchain.set_canonical(&head)
            {
                warn_with_head!(
                    "Failed to set canonical head (hash: {head_hash:?}, \
                     latest valid: {latest_valid_hash:?}): {error:#}",
                );

                return Err(error.into());
            }
        } else if self.blockchain.current_header().hash() == head_hash {
            // Requested head is already the local head. Payloads may still be built on it.
        } else if !self.config.is_optimism() {
            // The consensus client is probably resyncing.
            info_with_head!(
                "Ignoring beacon update to old head (number: {}, hash: {head_hash:?}, have: {})",
                head.number(),
                self.blockchain.current_header().number,
            );

            return Ok(ForkChoiceUpdatedResponse::valid(head_hash, None));
        }

        self.blockchain.set_synced();
        self.track_head();

        if !finalized_hash.is_zero() {
            let finalized = self.canonical_block(finalized_hash, "final")?;
            self.blockchain.set_finalized(finalized.header());
        }

        if !safe_hash.is_zero() {
            let safe = self.canonical_block(safe_hash, "safe")?;
            self.blockchain.set_safe(safe.header());
        }

        let Some(attributes) = attributes else {
            return Ok(ForkChoiceUpdatedResponse::valid(head_hash, None));
        };

        let id = self.start_build(head_hash, attributes, version, want_witness)?;

        Ok(ForkChoiceUpdatedResponse::valid(head_hash, Some(id)))
    }

    fn sync_to_unknown_head(
        &self,
        head_hash: ExecutionBlockHash,
        finalized_hash: ExecutionBlockHash,
    ) -> Result<ForkChoiceUpdatedResponse, Error> {
        if let Some(status) = self.check_invalid_ancestor(head_hash, head_hash) {
            return Ok(ForkChoiceUpdatedResponse::new(status));
        }

        let syncing = ForkChoiceUpdatedResponse::new(PayloadStatusV1::syncing());

        let Some(header) = self.remote_headers.get(head_hash) else {
            warn_with_head!("Forkchoice requested unknown head (hash: {head_hash:?})");
            return Ok(syncing);
        };

        let finalized = self.remote_headers.get(finalized_hash);

        info_with_head!(
            "Forkchoice requested sync to new head (number: {}, hash: {head_hash:?})",
            header.number,
        );

        self.downloader
            .beacon_sync(self.blockchain.sync_mode(), &header, finalized.as_ref())?;

        Ok(syncing)
    }

    fn canonical_block(&self, hash: ExecutionBlockHash, label: &str) -> Result<Arc<Block>, Error> {
        let Some(block) = self.blockchain.block_by_hash(hash) else {
            warn_with_head!("Forkchoice {label} block not available in database (hash: {hash:?})");

            return Err(Error::InvalidForkChoiceState(format!(
                "{label} block not available in database",
            )));
        };

        if self.blockchain.canonical_hash(block.number()) != Some(hash) {
            warn_with_head!(
                "Forkchoice {label} block not in canonical chain (number: {}, hash: {hash:?})",
                block.number(),
            );

            return Err(Error::InvalidForkChoiceState(format!(
                "{label} block not in canonical chain",
            )));
        }

        Ok(block)
    }

    fn start_build(
        &self,
        parent: ExecutionBlockHash,
        attributes: PayloadAttributes,
        version: ForkchoiceVersion,
        want_witness: bool,
    ) -> Result<PayloadId, Error> {
        let eip1559_params = self.rollup_eip1559_params(&attributes)?;

        let transactions = attributes
            .transactions
            .into_iter()
            .enumerate()
            .map(|(index, bytes)| {
                Transaction::decode(bytes)
                    .map_err(|error| anyhow!("transaction {index} is not valid: {error}"))
            })
            .collect::<Result<Vec<_>>>()?;

        let args = BuildPayloadArgs {
            parent,
            timestamp: attributes.timestamp,
            fee_recipient: attributes.suggested_fee_recipient,
            random: attributes.prev_randao,
            withdrawals: attributes.withdrawals,
            beacon_root: attributes.parent_beacon_block_root,
            version: version.payload_version(),
            no_tx_pool: attributes.no_tx_pool,
            transactions,
            gas_limit: attributes.gas_limit,
            eip1559_params,
        };

        let id = args.id();

        // A build with the same arguments is already in progress.
        if self.local_payloads.has(id) {
            return Ok(id);
        }

        let timer = self.metrics.as_ref().map(|metrics| {
            metrics.payload_builds.inc();
            metrics.payload_build_times.start_timer()
        });

        let payload = match self.payload_builder.build(&args, want_witness) {
            Ok(payload) => {
                prometheus_metrics::stop_and_record(timer);
                payload
            }
            Err(error) => {
                prometheus_metrics::stop_and_discard(timer);
                error_with_head!("Failed to build payload: {error:#}");
                return Err(Error::invalid_payload_attributes(format!("{error:#}")));
            }
        };

        self.local_payloads.put(id, payload);

        Ok(id)
    }

    fn rollup_eip1559_params(&self, attributes: &PayloadAttributes) -> Result<Option<Bytes>, Error> {
        if !self.config.is_optimism() {
            return Ok(None);
        }

        if attributes.gas_limit.is_none() {
            return Err(Error::invalid_payload_attributes(
                "gasLimit parameter is required",
            ));
        }

        if self.config.is_holocene(attributes.timestamp) {
            eip1559::validate_params(&attributes.eip1559_params)
                .map_err(Error::invalid_payload_attributes)?;

            return Ok(Some(attributes.eip1559_params.clone()));
        }

        if !attributes.eip1559_params.is_empty() {
            return Err(Error::invalid_payload_attributes(
                "eip155Params not supported prior to Holocene upgrade",
            ));
        }

        Ok(None)
    }

    async fn import_payload(&self, request: &PayloadRequest, want_witness: bool) -> PayloadStatusV1 {
        let payload = &request.payload;

        if let Err(error) = self.check_rollup_extra_data(payload) {
            return invalid(error, None);
        }

        let _guard = self.new_payload_lock.lock().await;

        let block = match execution_engine::payload_to_block(&self.config, payload, request.sidecar())
        {
            Ok(block) => block,
            Err(error) => {
                warn_with_head!(
                    "Invalid NewPayload params (number: {}, hash: {:?}): {error}",
                    payload.block_number,
                    payload.block_hash,
                );

                return invalid(error, None);
            }
        };

        self.activity.record_new_payload();

        if let Some(known) = self.blockchain.block_by_hash(block.hash()) {
            warn_with_head!(
                "Ignoring already known beacon payload (number: {}, hash: {:?})",
                known.number(),
                known.hash(),
            );

            return PayloadStatusV1::valid(known.hash());
        }

        if let Some(status) = self.check_invalid_ancestor(block.hash(), block.hash()) {
            return status;
        }

        let Some(parent) = self.blockchain.block_by_hash(block.parent_hash()) else {
            return self.delay_payload_import(&block);
        };

        if block.timestamp() <= parent.timestamp() {
            warn_with_head!(
                "Invalid timestamp (parent: {}, block: {})",
                parent.timestamp(),
                block.timestamp(),
            );

            return invalid("invalid timestamp", Some(parent.header()));
        }

        // Snap sync fills the database itself and cannot take blocks out of band.
        if !self.blockchain.sync_mode().is_full() {
            return self.delay_payload_import(&block);
        }

        if !self.blockchain.has_block_and_state(block.parent_hash()) {
            self.remote_headers.put(block.hash(), block.header().clone());
            warn_with_head!("State not available, ignoring new payload");
            return PayloadStatusV1::accepted();
        }

        match self
            .blockchain
            .insert_block_without_set_head(&block, want_witness)
        {
            Ok(witness) => PayloadStatusV1 {
                witness: witness.as_ref().map(ExecutionWitness::to_rlp),
                ..PayloadStatusV1::valid(block.hash())
            },
            Err(error) => {
                warn_with_head!("NewPayload: inserting block failed: {error:#}");

                self.invalid_ancestors
                    .record_failed_import(block.header().clone());

                self.track_invalid_tipsets();

                invalid(format!("{error:#}"), Some(parent.header()))
            }
        }
    }

    fn check_rollup_extra_data(&self, payload: &ExecutionPayload) -> Result<()> {
        if !self.config.is_optimism() {
            return Ok(());
        }

        if self.config.is_holocene(payload.timestamp) {
            eip1559::validate_extra_data(&payload.extra_data)?;
        } else if !payload.extra_data.is_empty() {
            bail!("extraData must be empty before Holocene");
        }

        Ok(())
    }

    // Queues the header of a block that cannot be imported yet and extends a running sync with it.
    fn delay_payload_import(&self, block: &Block) -> PayloadStatusV1 {
        if let Some(status) = self.check_invalid_ancestor(block.parent_hash(), block.hash()) {
            return status;
        }

        self.remote_headers.put(block.hash(), block.header().clone());

        let sync_mode = self.blockchain.sync_mode();

        match self.downloader.beacon_extend(sync_mode, block.header()) {
            Ok(()) => {
                debug_with_head!(
                    "Payload accepted for sync extension (number: {}, hash: {:?})",
                    block.number(),
                    block.hash(),
                );
            }
            Err(error) if sync_mode.is_full() => {
                warn_with_head!(
                    "Ignoring payload with missing parent \
                     (number: {}, hash: {:?}, parent: {:?}, reason: {error:#})",
                    block.number(),
                    block.hash(),
                    block.parent_hash(),
                );
            }
            Err(error) => {
                warn_with_head!(
                    "Ignoring payload while snap syncing (number: {}, hash: {:?}, reason: {error:#})",
                    block.number(),
                    block.hash(),
                );
            }
        }

        PayloadStatusV1::syncing()
    }

    fn execute_stateless(&self, request: &PayloadRequest, witness: &[u8]) -> StatelessPayloadStatusV1 {
        let payload = &request.payload;

        let block = match execution_engine::payload_to_block_unchecked(
            &self.config,
            payload,
            request.sidecar(),
        ) {
            Ok(block) => block,
            Err(error) => {
                warn!(
                    "Invalid ExecuteStatelessPayload params (number: {}, hash: {:?}): {error}",
                    payload.block_number,
                    payload.block_hash,
                );

                return StatelessPayloadStatusV1::invalid(error);
            }
        };

        let witness = match ExecutionWitness::from_rlp(witness) {
            Ok(witness) => witness,
            Err(error) => {
                warn!("Invalid ExecuteStatelessPayload witness: {error}");
                return StatelessPayloadStatusV1::invalid(error);
            }
        };

        self.activity.record_new_payload();

        let outcome = match self.executor.execute_stateless(&block, &witness) {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!("ExecuteStatelessPayload: execution failed: {error:#}");
                return StatelessPayloadStatusV1::invalid(format!("{error:#}"));
            }
        };

        let header = block.header();

        let validation_error = if outcome.state_root != header.state_root {
            Some("state root mismatch")
        } else if outcome.receipts_root != header.receipts_root {
            Some("receipts root mismatch")
        } else {
            None
        };

        let status = if validation_error.is_some() {
            PayloadValidationStatus::Invalid
        } else {
            PayloadValidationStatus::Valid
        };

        StatelessPayloadStatusV1 {
            status,
            state_root: outcome.state_root,
            receipts_root: outcome.receipts_root,
            validation_error: validation_error.map(ToOwned::to_owned),
        }
    }

    fn check_invalid_ancestor(
        &self,
        check: ExecutionBlockHash,
        head: ExecutionBlockHash,
    ) -> Option<PayloadStatusV1> {
        let status = self
            .invalid_ancestors
            .check(check, head, self.blockchain.as_ref());

        self.track_invalid_tipsets();

        status
    }

    fn track_invalid_tipsets(&self) {
        if let Some(metrics) = self.metrics.as_ref() {
            metrics.set_invalid_tipsets(self.invalid_ancestors.tipset_count());
        }
    }

    fn track_head(&self) {
        let head_number = self.blockchain.current_header().number;

        HEAD_LOG_METRICS.set_head_number(head_number);
        HEAD_LOG_METRICS.set_synced(true);

        if let Some(metrics) = self.metrics.as_ref() {
            metrics.set_head_number(head_number);
        }
    }
}

// Pre-merge ancestors are reported as the zero hash.
fn invalid(error: impl Display, latest_valid: Option<&Header>) -> PayloadStatusV1 {
    let latest_valid_hash = latest_valid.map(|header| {
        if header.is_pre_merge() {
            H256::zero()
        } else {
            header.hash()
        }
    });

    PayloadStatusV1 {
        latest_valid_hash,
        validation_error: Some(error.to_string()),
        ..PayloadStatusV1::invalid()
    }
}

#[cfg(test)]
mod tests {
    use core::sync::atomic::{AtomicUsize, Ordering};

    use blockchain::{
        dev::{DevChain, DevDownloader, DevExecutor, DevTxPool, SyncRequest},
        BlockEnv, ExecutionSession, StatelessOutcome, SyncMode,
    };
    use futures::channel::mpsc;
    use payload_builder::MinerConfig;
    use test_case::test_case;
    use types::primitives::{ExecutionAddress, U256};

    use super::*;

    // Counts block executions done by the chain.
    #[derive(Default)]
    struct CountingExecutor {
        sessions: AtomicUsize,
    }

    impl BlockExecutor for CountingExecutor {
        fn begin(&self, parent: &Header, env: BlockEnv) -> Result<Box<dyn ExecutionSession>> {
            self.sessions.fetch_add(1, Ordering::SeqCst);
            DevExecutor.begin(parent, env)
        }

        fn execute_stateless(
            &self,
            block: &Block,
            witness: &ExecutionWitness,
        ) -> Result<StatelessOutcome> {
            DevExecutor.execute_stateless(block, witness)
        }
    }

    struct Setup {
        chain: Arc<DevChain>,
        chain_executor: Arc<CountingExecutor>,
        downloader: Arc<DevDownloader>,
        api: ConsensusApi,
    }

    impl Setup {
        fn new(config: Config) -> Self {
            let config = Arc::new(config);
            let executor = Arc::new(DevExecutor);
            let chain_executor = Arc::new(CountingExecutor::default());
            let chain = Arc::new(DevChain::new(Arc::clone(&config), chain_executor.clone()));
            let downloader = Arc::new(DevDownloader::default());
            let tx_pool = Arc::new(DevTxPool::default());

            let payload_builder = Arc::new(PayloadBuilder::new(
                Arc::clone(&config),
                chain.clone(),
                executor.clone(),
                tx_pool.clone(),
                MinerConfig::default(),
            ));

            let collaborators = Collaborators {
                blockchain: chain.clone(),
                downloader: downloader.clone(),
                tx_pool,
                executor,
            };

            let api = ConsensusApi::new(config, collaborators, payload_builder, None);

            Self {
                chain,
                chain_executor,
                downloader,
                api,
            }
        }

        fn ethereum() -> Self {
            Self::new(Config::ethereum_devnet())
        }

        fn genesis_hash(&self) -> H256 {
            self.chain.genesis().hash()
        }

        async fn update_head(&self, head: H256) -> Result<ForkChoiceUpdatedResponse, Error> {
            self.api
                .forkchoice_updated(ForkchoiceVersion::V3, head_state(head), None, false)
                .await
        }

        // Builds an empty child of `parent` through the Engine API.
        async fn build(&self, parent: H256, timestamp: u64) -> anyhow::Result<PayloadRequest> {
            self.build_with(parent, attributes(timestamp)).await
        }

        async fn build_with(
            &self,
            parent: H256,
            attributes: PayloadAttributes,
        ) -> anyhow::Result<PayloadRequest> {
            let response = self
                .api
                .forkchoice_updated(
                    ForkchoiceVersion::V3,
                    head_state(parent),
                    Some(attributes),
                    false,
                )
                .await?;

            let id = response
                .payload_id
                .ok_or_else(|| anyhow!("no payload was started"))?;

            let envelope = self.api.get_payload(GetPayloadVersion::V4, id).await?;

            Ok(PayloadRequest {
                payload: envelope.execution_payload,
                versioned_hashes: Some(vec![]),
                beacon_root: envelope.parent_beacon_block_root,
                execution_requests: envelope.execution_requests.map(|requests| requests.0),
            })
        }

        async fn import(&self, request: PayloadRequest) -> Result<PayloadStatusV1, Error> {
            self.api
                .new_payload(NewPayloadVersion::V4, request, false)
                .await
        }
    }

    fn head_state(head: H256) -> ForkChoiceStateV1 {
        ForkChoiceStateV1 {
            head_block_hash: head,
            ..ForkChoiceStateV1::default()
        }
    }

    fn attributes(timestamp: u64) -> PayloadAttributes {
        PayloadAttributes {
            timestamp,
            prev_randao: H256::repeat_byte(1),
            suggested_fee_recipient: ExecutionAddress::repeat_byte(2),
            withdrawals: Some(vec![]),
            parent_beacon_block_root: Some(H256::zero()),
            transactions: vec![],
            no_tx_pool: true,
            gas_limit: None,
            eip1559_params: Bytes::new(),
        }
    }

    fn rollup_attributes(timestamp: u64) -> PayloadAttributes {
        PayloadAttributes {
            gas_limit: Some(30_000_000),
            eip1559_params: Bytes::from_static(&[0, 0, 0, 8, 0, 0, 0, 2]),
            ..attributes(timestamp)
        }
    }

    // Changes a payload and recomputes its block hash.
    fn modified(
        config: &Config,
        request: &PayloadRequest,
        modify: impl FnOnce(&mut ExecutionPayload),
    ) -> anyhow::Result<PayloadRequest> {
        let mut request = request.clone();
        modify(&mut request.payload);

        let block =
            execution_engine::payload_to_block_unchecked(config, &request.payload, request.sidecar())?;

        request.payload.block_hash = block.hash();

        Ok(request)
    }

    #[tokio::test]
    async fn zero_head_is_invalid() -> anyhow::Result<()> {
        let setup = Setup::ethereum();

        let response = setup.update_head(H256::zero()).await?;

        assert_eq!(response.payload_status, PayloadStatusV1::invalid());
        assert_eq!(response.payload_id, None);
        assert!(setup.api.activity().snapshot().last_forkchoice_update.is_none());

        Ok(())
    }

    #[tokio::test]
    async fn identical_attributes_reuse_payload() -> anyhow::Result<()> {
        let setup = Setup::ethereum();
        let genesis = setup.genesis_hash();

        let first = setup
            .api
            .forkchoice_updated(ForkchoiceVersion::V3, head_state(genesis), Some(attributes(12)), false)
            .await?;

        let second = setup
            .api
            .forkchoice_updated(ForkchoiceVersion::V3, head_state(genesis), Some(attributes(12)), false)
            .await?;

        assert!(first.payload_id.is_some());
        assert_eq!(first.payload_id, second.payload_id);
        assert_eq!(setup.api.local_payloads.len(), 1);
        assert_eq!(first.payload_status, PayloadStatusV1::valid(genesis));

        Ok(())
    }

    #[tokio::test]
    async fn rejected_attributes_do_not_start_builds() {
        let setup = Setup::ethereum();
        let genesis = setup.genesis_hash();

        let attributes = PayloadAttributes {
            parent_beacon_block_root: None,
            ..attributes(12)
        };

        let result = setup
            .api
            .forkchoice_updated(ForkchoiceVersion::V2, head_state(genesis), Some(attributes), false)
            .await;

        assert!(matches!(result, Err(Error::UnsupportedFork(_))));
        assert!(setup.api.local_payloads.is_empty());
        assert!(setup.api.activity().snapshot().last_forkchoice_update.is_none());
    }

    #[tokio::test]
    async fn built_payload_is_imported_and_made_canonical() -> anyhow::Result<()> {
        let setup = Setup::ethereum();
        let request = setup.build(setup.genesis_hash(), 12).await?;
        let hash = request.payload.block_hash;

        let status = setup.import(request.clone()).await?;

        assert_eq!(status, PayloadStatusV1::valid(hash));
        assert_eq!(setup.chain.canonical_hash(1), None);

        // Importing the same payload again is a no-op.
        assert_eq!(setup.import(request).await?, PayloadStatusV1::valid(hash));

        let response = setup.update_head(hash).await?;

        assert_eq!(response.payload_status, PayloadStatusV1::valid(hash));
        assert_eq!(setup.chain.canonical_hash(1), Some(hash));
        assert!(setup.chain.is_synced());

        Ok(())
    }

    #[tokio::test]
    async fn witness_is_returned_on_request() -> anyhow::Result<()> {
        let setup = Setup::ethereum();
        let request = setup.build(setup.genesis_hash(), 12).await?;

        let status = setup
            .api
            .new_payload(NewPayloadVersion::V4, request, true)
            .await?;

        let witness = status
            .witness
            .ok_or_else(|| anyhow!("witness was requested"))?;

        assert_eq!(
            ExecutionWitness::from_rlp(&witness)?.parent_header(),
            Some(setup.chain.genesis().header()),
        );

        Ok(())
    }

    #[tokio::test]
    async fn old_canonical_head_is_ignored() -> anyhow::Result<()> {
        let setup = Setup::ethereum();
        let genesis = setup.genesis_hash();
        let request = setup.build(genesis, 12).await?;
        let hash = request.payload.block_hash;

        setup.import(request).await?;
        setup.update_head(hash).await?;

        let response = setup
            .api
            .forkchoice_updated(ForkchoiceVersion::V3, head_state(genesis), Some(attributes(24)), false)
            .await?;

        assert_eq!(response, ForkChoiceUpdatedResponse::valid(genesis, None));
        assert_eq!(setup.chain.current_header().hash(), hash);

        Ok(())
    }

    #[tokio::test]
    async fn finalized_and_safe_blocks_must_be_canonical() -> anyhow::Result<()> {
        let setup = Setup::ethereum();
        let genesis = setup.genesis_hash();
        let canonical = setup.build(genesis, 12).await?;
        let sibling = setup.build(genesis, 13).await?;
        let canonical_hash = canonical.payload.block_hash;
        let sibling_hash = sibling.payload.block_hash;

        setup.import(canonical).await?;
        setup.import(sibling).await?;

        let update = |finalized, safe| ForkChoiceStateV1 {
            head_block_hash: canonical_hash,
            safe_block_hash: safe,
            finalized_block_hash: finalized,
        };

        let result = setup
            .api
            .forkchoice_updated(ForkchoiceVersion::V3, update(H256::repeat_byte(9), H256::zero()), None, false)
            .await;

        assert_eq!(
            result.err().and_then(|error| error.data().map(ToOwned::to_owned)).as_deref(),
            Some("final block not available in database"),
        );

        let result = setup
            .api
            .forkchoice_updated(ForkchoiceVersion::V3, update(genesis, sibling_hash), None, false)
            .await;

        assert_eq!(
            result.err().and_then(|error| error.data().map(ToOwned::to_owned)).as_deref(),
            Some("safe block not in canonical chain"),
        );

        setup
            .api
            .forkchoice_updated(ForkchoiceVersion::V3, update(genesis, canonical_hash), None, false)
            .await?;

        assert_eq!(setup.chain.finalized_header().map(|header| header.hash()), Some(genesis));
        assert_eq!(setup.chain.safe_header().map(|header| header.hash()), Some(canonical_hash));

        Ok(())
    }

    #[tokio::test]
    async fn timestamp_must_increase() -> anyhow::Result<()> {
        let setup = Setup::ethereum();
        let genesis = setup.genesis_hash();
        let request = setup.build(genesis, 12).await?;
        let stale = modified(&setup.api.config, &request, |payload| payload.timestamp = 0)?;

        let status = setup.import(stale).await?;

        assert_eq!(status.status, PayloadValidationStatus::Invalid);
        assert_eq!(status.latest_valid_hash, Some(genesis));
        assert_eq!(status.validation_error.as_deref(), Some("invalid timestamp"));

        Ok(())
    }

    #[tokio::test]
    async fn mismatched_block_hash_is_invalid() -> anyhow::Result<()> {
        let setup = Setup::ethereum();
        let mut request = setup.build(setup.genesis_hash(), 12).await?;
        request.payload.block_hash = H256::repeat_byte(0xaa);

        let status = setup.import(request).await?;

        assert_eq!(status.status, PayloadValidationStatus::Invalid);
        assert_eq!(status.latest_valid_hash, None);
        assert!(status
            .validation_error
            .is_some_and(|error| error.starts_with("blockhash mismatch")));
        assert!(setup.api.activity().snapshot().last_new_payload.is_none());

        Ok(())
    }

    #[tokio::test]
    async fn failed_import_taints_block() -> anyhow::Result<()> {
        let setup = Setup::ethereum();
        let genesis = setup.genesis_hash();
        let request = setup.build(genesis, 12).await?;
        let bad = modified(&setup.api.config, &request, |payload| {
            payload.state_root = H256::repeat_byte(0xff);
        })?;

        let status = setup.import(bad.clone()).await?;

        assert_eq!(status.status, PayloadValidationStatus::Invalid);
        assert_eq!(status.latest_valid_hash, Some(genesis));
        assert!(status
            .validation_error
            .is_some_and(|error| error.starts_with("invalid merkle root")));

        let status = setup.import(bad).await?;

        assert_eq!(status.status, PayloadValidationStatus::Invalid);
        assert_eq!(status.latest_valid_hash, Some(genesis));
        assert_eq!(
            status.validation_error.as_deref(),
            Some("links to previously rejected block"),
        );

        Ok(())
    }

    #[tokio::test]
    async fn descendants_of_failed_import_are_invalid() -> anyhow::Result<()> {
        let setup = Setup::ethereum();
        let genesis = setup.genesis_hash();
        let request = setup.build(genesis, 12).await?;
        let bad = modified(&setup.api.config, &request, |payload| {
            payload.state_root = H256::repeat_byte(0xff);
        })?;
        let bad_hash = bad.payload.block_hash;

        setup.import(bad).await?;

        let child = modified(&setup.api.config, &request, |payload| {
            payload.parent_hash = bad_hash;
            payload.block_number = 2;
            payload.timestamp = 24;
        })?;
        let child_hash = child.payload.block_hash;

        let status = setup.import(child).await?;

        assert_eq!(status.status, PayloadValidationStatus::Invalid);
        assert_eq!(status.latest_valid_hash, Some(genesis));
        assert_eq!(
            status.validation_error.as_deref(),
            Some("links to previously rejected block"),
        );
        assert_eq!(setup.api.invalid_ancestors.tipset_count(), 2);
        assert!(setup.api.remote_headers.get(child_hash).is_none());
        assert!(setup.downloader.requests().is_empty());

        // The child is now a bad tip of its own.
        let response = setup.update_head(child_hash).await?;

        assert_eq!(response.payload_status.status, PayloadValidationStatus::Invalid);
        assert_eq!(response.payload_status.latest_valid_hash, Some(genesis));

        Ok(())
    }

    #[tokio::test]
    async fn payload_on_parent_without_state_is_accepted() -> anyhow::Result<()> {
        let producer = Setup::ethereum();
        let first = producer.build(producer.genesis_hash(), 12).await?;
        let first_hash = first.payload.block_hash;

        producer.import(first.clone()).await?;
        producer.update_head(first_hash).await?;

        let second = producer.build(first_hash, 24).await?;
        let second_hash = second.payload.block_hash;

        let follower = Setup::ethereum();
        let first_block =
            execution_engine::payload_to_block(&follower.api.config, &first.payload, first.sidecar())?;

        follower.chain.insert_block_without_state(first_block);

        assert_eq!(follower.import(second).await?, PayloadStatusV1::accepted());
        assert_eq!(
            follower.api.remote_headers.get(second_hash).map(|header| header.hash()),
            Some(second_hash),
        );
        assert!(!follower.chain.has_block_and_state(second_hash));

        Ok(())
    }

    #[tokio::test]
    async fn proof_of_work_head_on_merged_parent_is_invalid_terminal_block() -> anyhow::Result<()> {
        let setup = Setup::ethereum();
        let genesis = setup.chain.genesis();

        let header = Header {
            parent_hash: genesis.hash(),
            number: 1,
            timestamp: 12,
            difficulty: U256::one(),
            ..Header::post_merge_defaults()
        };

        let block = Block::new(header, types::execution::Body::default());
        let hash = block.hash();

        setup.chain.insert_block_without_state(block);

        let response = setup.update_head(hash).await?;

        assert_eq!(
            response.payload_status,
            PayloadStatusV1::new(PayloadValidationStatus::InvalidTerminalBlock),
        );
        assert_eq!(response.payload_id, None);
        assert_eq!(setup.chain.canonical_hash(1), None);

        Ok(())
    }

    #[tokio::test]
    async fn concurrent_imports_of_same_payload_execute_once() -> anyhow::Result<()> {
        let setup = Setup::ethereum();
        let request = setup.build(setup.genesis_hash(), 12).await?;
        let hash = request.payload.block_hash;

        let (first, second) = tokio::join!(setup.import(request.clone()), setup.import(request));

        assert_eq!(first?, PayloadStatusV1::valid(hash));
        assert_eq!(second?, PayloadStatusV1::valid(hash));
        assert_eq!(setup.chain_executor.sessions.load(Ordering::SeqCst), 1);

        Ok(())
    }

    #[tokio::test]
    async fn payload_with_unknown_parent_is_synced_to() -> anyhow::Result<()> {
        let producer = Setup::ethereum();
        let first = producer.build(producer.genesis_hash(), 12).await?;
        let first_hash = first.payload.block_hash;

        producer.import(first).await?;
        producer.update_head(first_hash).await?;

        let second = producer.build(first_hash, 24).await?;
        let second_hash = second.payload.block_hash;

        let follower = Setup::ethereum();

        // Forkchoice updates to heads that were never seen cannot start a sync.
        let response = follower.update_head(second_hash).await?;

        assert_eq!(response.payload_status, PayloadStatusV1::syncing());
        assert!(follower.downloader.requests().is_empty());

        assert_eq!(follower.import(second).await?, PayloadStatusV1::syncing());

        let response = follower.update_head(second_hash).await?;

        assert_eq!(response.payload_status, PayloadStatusV1::syncing());
        assert_eq!(
            follower.downloader.requests(),
            [SyncRequest::Sync {
                mode: SyncMode::Full,
                head: second_hash,
                finalized: None,
            }],
        );

        Ok(())
    }

    #[tokio::test]
    async fn payload_is_delayed_during_snap_sync() -> anyhow::Result<()> {
        let setup = Setup::ethereum();
        let request = setup.build(setup.genesis_hash(), 12).await?;
        let hash = request.payload.block_hash;

        setup.chain.set_sync_mode(SyncMode::Snap);

        assert_eq!(setup.import(request).await?, PayloadStatusV1::syncing());
        assert!(setup.api.remote_headers.get(hash).is_some());
        assert!(!setup.chain.has_block_and_state(hash));

        Ok(())
    }

    #[tokio::test]
    async fn bad_blocks_from_downloader_reject_descendants() -> anyhow::Result<()> {
        let setup = Setup::ethereum();
        let genesis = setup.chain.genesis();

        let invalid = Header {
            parent_hash: genesis.hash(),
            number: 1,
            ..Header::post_merge_defaults()
        };

        let origin = Header {
            parent_hash: invalid.hash(),
            number: 2,
            ..Header::post_merge_defaults()
        };

        let (tx, rx) = mpsc::unbounded();
        let origin_hash = origin.hash();

        tx.unbounded_send(BadBlockMessage { invalid, origin })?;
        drop(tx);

        setup.api.track_bad_blocks(rx).await;

        let response = setup.update_head(origin_hash).await?;

        assert_eq!(response.payload_status.status, PayloadValidationStatus::Invalid);
        assert_eq!(response.payload_status.latest_valid_hash, Some(genesis.hash()));

        Ok(())
    }

    #[tokio::test]
    async fn unknown_payload_id() {
        let setup = Setup::ethereum();
        let mut id = types::primitives::H64::zero();
        id.0[0] = 3;

        let result = setup.api.get_payload(GetPayloadVersion::V3, PayloadId(id)).await;

        assert!(matches!(result, Err(Error::UnknownPayload)));

        let result = setup.api.get_payload(GetPayloadVersion::V2, PayloadId(id)).await;

        assert!(matches!(result, Err(Error::UnsupportedFork(_))));
    }

    #[tokio::test]
    async fn bodies_by_range_are_clipped_to_head() -> anyhow::Result<()> {
        let setup = Setup::ethereum();
        let request = setup.build(setup.genesis_hash(), 12).await?;
        let hash = request.payload.block_hash;

        setup.import(request).await?;
        setup.update_head(hash).await?;

        let bodies = setup.api.get_payload_bodies_by_range(1, 10)?;

        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0].as_ref().map(|body| body.transactions.len()), Some(0));
        assert!(setup.api.get_payload_bodies_by_range(5, 10)?.is_empty());

        let bodies = setup
            .api
            .get_payload_bodies_by_hash(&[hash, H256::repeat_byte(7)])?;

        assert!(bodies[0].is_some());
        assert!(bodies[1].is_none());

        Ok(())
    }

    #[test_case(0, 1 => (-32602, Some("invalid start or count, start: 0 count: 1".to_owned())))]
    #[test_case(1, 0 => (-32602, Some("invalid start or count, start: 1 count: 0".to_owned())))]
    #[test_case(1, 1025 => (-38004, Some("requested count too large: 1025".to_owned())))]
    fn bodies_by_range_limits(start: u64, count: u64) -> (i32, Option<String>) {
        let setup = Setup::ethereum();

        match setup.api.get_payload_bodies_by_range(start, count) {
            Ok(_) => (0, None),
            Err(error) => (error.code(), error.data().map(ToOwned::to_owned)),
        }
    }

    #[test]
    fn blob_requests_are_limited() -> anyhow::Result<()> {
        let setup = Setup::ethereum();

        assert_eq!(setup.api.get_blobs_v1(&[H256::zero(); 128])?.len(), 128);

        let error = setup
            .api
            .get_blobs_v1(&[H256::zero(); 129])
            .expect_err("more than 128 blobs were requested");

        assert_eq!(error.code(), -38004);
        assert_eq!(error.data(), Some("requested blob count too large: 129"));

        Ok(())
    }

    #[test]
    fn transition_configuration_is_checked() -> anyhow::Result<()> {
        let setup = Setup::ethereum();
        let genesis = setup.genesis_hash();

        let remote = TransitionConfigurationV1 {
            terminal_total_difficulty: Some(U256::zero()),
            terminal_block_hash: genesis,
            terminal_block_number: 0,
        };

        assert_eq!(setup.api.exchange_transition_configuration_v1(remote)?, remote);
        assert!(setup.api.activity().snapshot().last_transition_update.is_some());

        let error = setup
            .api
            .exchange_transition_configuration_v1(TransitionConfigurationV1 {
                terminal_total_difficulty: Some(U256::from(5)),
                ..remote
            })
            .expect_err("terminal total difficulty differs");

        assert_eq!(error.message(), "invalid ttd: execution 0 consensus 5");

        let error = setup
            .api
            .exchange_transition_configuration_v1(TransitionConfigurationV1 {
                terminal_block_number: 1,
                ..remote
            })
            .expect_err("terminal block is not canonical");

        assert_eq!(error.message(), "invalid terminal block hash");

        let error = setup
            .api
            .exchange_transition_configuration_v1(TransitionConfigurationV1 {
                terminal_total_difficulty: None,
                ..remote
            })
            .expect_err("terminal total difficulty is missing");

        assert_eq!(error.code(), -32603);

        Ok(())
    }

    #[test]
    fn capabilities_and_client_version() {
        let setup = Setup::ethereum();

        let capabilities = setup.api.exchange_capabilities(&[]);

        assert_eq!(capabilities.len(), 29);
        assert_eq!(capabilities.first(), Some(&"engine_forkchoiceUpdatedV1"));
        assert_eq!(capabilities.last(), Some(&"engine_getClientVersionV1"));

        let remote = ClientVersionV1 {
            code: "XX".to_owned(),
            name: "consensus".to_owned(),
            version: "1.0.0".to_owned(),
            commit: "0x00000000".to_owned(),
        };

        let versions = setup.api.get_client_version_v1(&remote);

        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].code, "RE");
        assert_eq!(versions[0].commit.len(), 10);
    }

    #[test_case(None => false; "halting disabled")]
    #[test_case(Some(HaltLevel::Major) => true)]
    fn superchain_signal_may_halt(halt_level: Option<HaltLevel>) -> bool {
        let shutdown = CancellationToken::new();
        let api = Setup::new(Config::optimism_devnet())
            .api
            .with_halt_level(halt_level, shutdown.clone());

        let signal = SuperchainSignal {
            recommended: ProtocolVersion::v0([0; 8], 99, 0, 0, 0),
            required: ProtocolVersion::v0([0; 8], 99, 0, 0, 0),
        };

        assert_eq!(api.signal_superchain_v1(Some(signal)), OP_STACK_SUPPORT);

        shutdown.is_cancelled()
    }

    #[tokio::test]
    async fn rollup_attributes_require_gas_limit() {
        let setup = Setup::new(Config::optimism_devnet());
        let genesis = setup.genesis_hash();

        let result = setup
            .api
            .forkchoice_updated(ForkchoiceVersion::V3, head_state(genesis), Some(attributes(2)), false)
            .await;

        assert_eq!(
            result.err().and_then(|error| error.data().map(ToOwned::to_owned)).as_deref(),
            Some("gasLimit parameter is required"),
        );
    }

    #[tokio::test]
    async fn rollup_payload_requires_holocene_extra_data() -> anyhow::Result<()> {
        let setup = Setup::new(Config::optimism_devnet());
        let request = setup
            .build_with(setup.genesis_hash(), rollup_attributes(2))
            .await?;

        let hash = request.payload.block_hash;
        let without_extra_data = modified(&setup.api.config, &request, |payload| {
            payload.extra_data = Bytes::new();
        })?;

        let status = setup.import(without_extra_data).await?;

        assert_eq!(status.status, PayloadValidationStatus::Invalid);
        assert_eq!(
            status.validation_error.as_deref(),
            Some("holocene extraData should be 9 bytes, got 0"),
        );

        assert_eq!(setup.import(request).await?, PayloadStatusV1::valid(hash));

        Ok(())
    }

    #[tokio::test]
    async fn rollup_builds_on_old_canonical_head() -> anyhow::Result<()> {
        let setup = Setup::new(Config::optimism_devnet());
        let genesis = setup.genesis_hash();
        let request = setup.build_with(genesis, rollup_attributes(2)).await?;
        let hash = request.payload.block_hash;

        setup.import(request).await?;
        setup.update_head(hash).await?;

        let response = setup
            .api
            .forkchoice_updated(
                ForkchoiceVersion::V3,
                head_state(genesis),
                Some(rollup_attributes(4)),
                false,
            )
            .await?;

        assert_eq!(response.payload_status, PayloadStatusV1::valid(genesis));
        assert!(response.payload_id.is_some());
        assert_eq!(setup.api.local_payloads.len(), 2);

        // The head is left alone. Only the payload is built on the older block.
        assert_eq!(setup.chain.current_header().hash(), hash);

        Ok(())
    }

    #[tokio::test]
    async fn stateless_execution_uses_witness() -> anyhow::Result<()> {
        let producer = Setup::ethereum();
        let request = producer.build(producer.genesis_hash(), 12).await?;

        let witness = producer
            .api
            .new_payload(NewPayloadVersion::V4, request.clone(), true)
            .await?
            .witness
            .ok_or_else(|| anyhow!("witness was requested"))?;

        let verifier = Setup::ethereum();

        let status = verifier
            .api
            .execute_stateless_payload(NewPayloadVersion::V4, &request, &witness)?;

        assert_eq!(status.status, PayloadValidationStatus::Valid);
        assert_eq!(status.state_root, request.payload.state_root);
        assert_eq!(status.receipts_root, request.payload.receipts_root);

        let wrong_root = PayloadRequest {
            payload: ExecutionPayload {
                state_root: H256::repeat_byte(3),
                ..request.payload.clone()
            },
            ..request.clone()
        };

        let status = verifier
            .api
            .execute_stateless_payload(NewPayloadVersion::V4, &wrong_root, &witness)?;

        assert_eq!(status.status, PayloadValidationStatus::Invalid);
        assert_eq!(status.validation_error.as_deref(), Some("state root mismatch"));
        assert_eq!(status.state_root, request.payload.state_root);

        let status = verifier
            .api
            .execute_stateless_payload(NewPayloadVersion::V4, &request, &[])?;

        assert_eq!(status.status, PayloadValidationStatus::Invalid);

        Ok(())
    }
}
