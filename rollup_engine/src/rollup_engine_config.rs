use core::net::SocketAddr;
use std::{path::PathBuf, sync::Arc};

use engine_api::HaltLevel;
use http_api::HttpApiConfig;
use log::info;
use payload_builder::MinerConfig;
use prometheus_metrics::Metrics;
use types::config::Config as ChainConfig;

#[derive(Clone, Default)]
pub struct MetricsConfig {
    pub metrics: Option<Arc<Metrics>>,
    pub metrics_address: Option<SocketAddr>,
}

pub struct RollupEngineConfig {
    pub chain_config: Arc<ChainConfig>,
    pub http_api_config: HttpApiConfig,
    pub jwt_secret_path: PathBuf,
    pub miner_config: MinerConfig,
    pub metrics_config: MetricsConfig,
    pub halt_level: Option<HaltLevel>,
}

impl RollupEngineConfig {
    pub fn report(&self) {
        let Self {
            chain_config,
            http_api_config,
            jwt_secret_path,
            miner_config,
            metrics_config,
            halt_level,
        } = self;

        info!(
            "chain: {} (chain ID: {}, optimism: {})",
            chain_config.config_name,
            chain_config.chain_id,
            chain_config.is_optimism(),
        );

        info!("Engine API address: {}", http_api_config.address);
        info!("JWT secret file: {jwt_secret_path:?}");

        info!(
            "miner: gas ceil {}, recommit {:?}, extra data {} bytes",
            miner_config.gas_ceil,
            miner_config.recommit,
            miner_config.extra_data.len(),
        );

        if let Some(address) = metrics_config.metrics_address {
            info!("metrics address: {address}");
        }

        match halt_level {
            Some(level) => info!("halting on {level} protocol version changes"),
            None => info!("not halting on protocol version changes"),
        }
    }
}
