use core::future::Future;
use std::{process::ExitCode, sync::Arc};

use anyhow::Result;
use blockchain::dev::{DevChain, DevDownloader, DevExecutor, DevTxPool};
use clap::{Error as ClapError, Parser as _};
use engine_api::{Collaborators, ConsensusApi, Heartbeat, HeartbeatMessage, HeartbeatTimings};
use futures::channel::mpsc;
use http_api::{HttpApi, JwtSecret};
use log::{debug, error, info, warn};
use payload_builder::PayloadBuilder;
use rollup_engine_version::APPLICATION_VERSION_WITH_PLATFORM;
use tokio::runtime::Builder;
use tokio_util::sync::CancellationToken;

use crate::{
    rollup_engine_args::RollupEngineArgs,
    rollup_engine_config::{MetricsConfig, RollupEngineConfig},
};

mod rollup_engine_args;
mod rollup_engine_config;

fn main() -> ExitCode {
    if let Err(error) = try_main() {
        error.downcast_ref().map(ClapError::exit);
        error!("{error:?}");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn try_main() -> Result<()> {
    let args = RollupEngineArgs::try_parse()?;

    binary_utils::initialize_logger(module_path!(), args.always_write_style())?;

    let config = args
        .try_into_config()
        .map_err(RollupEngineArgs::clap_error)?;

    info!("starting {APPLICATION_VERSION_WITH_PLATFORM}");
    config.report();

    block_on(run(config))
}

async fn run(config: RollupEngineConfig) -> Result<()> {
    let RollupEngineConfig {
        chain_config,
        http_api_config,
        jwt_secret_path,
        miner_config,
        metrics_config,
        halt_level,
    } = config;

    let MetricsConfig {
        metrics,
        metrics_address,
    } = metrics_config;

    let jwt_secret = Arc::new(JwtSecret::load_or_create(&jwt_secret_path)?);

    let (bad_block_tx, bad_block_rx) = mpsc::unbounded();
    let (heartbeat_tx, heartbeat_rx) = mpsc::unbounded();

    let executor = Arc::new(DevExecutor);
    let chain = Arc::new(DevChain::new(Arc::clone(&chain_config), executor.clone()));
    let tx_pool = Arc::new(DevTxPool::default());

    info!("genesis block: {:?}", chain.genesis().hash());

    let payload_builder = Arc::new(PayloadBuilder::new(
        Arc::clone(&chain_config),
        chain.clone(),
        executor.clone(),
        tx_pool.clone(),
        miner_config,
    ));

    let collaborators = Collaborators {
        blockchain: chain,
        downloader: Arc::new(DevDownloader::new(bad_block_tx)),
        tx_pool,
        executor,
    };

    let shutdown = CancellationToken::new();

    let api = Arc::new(
        ConsensusApi::new(
            Arc::clone(&chain_config),
            collaborators,
            payload_builder,
            metrics.clone(),
        )
        .with_halt_level(halt_level, shutdown.clone()),
    );

    let heartbeat = Heartbeat::new(
        chain_config,
        Arc::clone(api.activity()),
        HeartbeatTimings::default(),
        heartbeat_rx,
    );

    let heartbeat = tokio::spawn(heartbeat.run());

    let track_bad_blocks = tokio::spawn({
        let api = Arc::clone(&api);
        async move { api.track_bad_blocks(bad_block_rx).await }
    });

    let metrics_server = metrics_address.map(|address| {
        tokio::spawn(http_api::run_metrics_server(address, shutdown.clone()))
    });

    tokio::spawn(stop_on_ctrl_c(shutdown.clone()));

    if let Some(metrics) = metrics.as_ref() {
        metrics.set_live();
    }

    let http_api = HttpApi {
        api: Arc::clone(&api),
        jwt_secret,
        http_api_config,
        metrics,
    };

    let result = http_api.run(shutdown.clone()).await;

    info!("shutting down");

    shutdown.cancel();

    if heartbeat_tx.unbounded_send(HeartbeatMessage::Stop).is_err() {
        debug!("heartbeat already stopped");
    }

    api.close();
    track_bad_blocks.abort();

    heartbeat.await?;

    if let Some(metrics_server) = metrics_server {
        if let Err(error) = metrics_server.await? {
            warn!("metrics server failed: {error:?}");
        }
    }

    result
}

async fn stop_on_ctrl_c(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => info!("received Ctrl-C"),
                Err(error) => {
                    warn!("unable to listen for Ctrl-C: {error}");
                    return;
                }
            }
        }
        () = shutdown.cancelled() => return,
    }

    shutdown.cancel();
}

fn block_on(future: impl Future<Output = Result<()>>) -> Result<()> {
    // This is roughly what `#[tokio::main]` expands to.
    Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(future)
}
