use core::{
    fmt::Display,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};
use std::{path::PathBuf, sync::Arc};

use anyhow::{ensure, Result};
use bytes::Bytes;
use clap::{error::ErrorKind, Args, CommandFactory as _, Error as ClapError, Parser, ValueEnum};
use engine_api::HaltLevel;
use features::Feature;
use http_api::HttpApiConfig;
use log::info;
use payload_builder::{MinerConfig, DEFAULT_GAS_CEIL, DEFAULT_RECOMMIT};
use prometheus_metrics::{Metrics, METRICS};
use rollup_engine_version::{APPLICATION_NAME, APPLICATION_VERSION};
use thiserror::Error;
use types::{
    config::Config as ChainConfig,
    execution::MAXIMUM_EXTRA_DATA_SIZE,
    primitives::{ExecutionAddress, Gas},
};

use crate::rollup_engine_config::{MetricsConfig, RollupEngineConfig};

const DEFAULT_JWT_SECRET_FILE: &str = "jwt.hex";
const DEFAULT_METRICS_PORT: u16 = 6060;

/// Grandine <info@grandine.io>
/// Engine API server driving an execution chain from a consensus or rollup node
#[derive(Parser)]
#[clap(display_name = APPLICATION_NAME, verbatim_doc_comment, version = APPLICATION_VERSION)]
pub struct RollupEngineArgs {
    #[clap(flatten)]
    chain_options: ChainOptions,

    #[clap(flatten)]
    http_api_options: HttpApiOptions,

    #[clap(flatten)]
    miner_options: MinerOptions,

    #[clap(flatten)]
    metrics_options: MetricsOptions,

    /// Halt when a required protocol version at least this far ahead is signaled
    /// [possible values: major, minor, patch]
    #[clap(long, value_name = "LEVEL")]
    rollup_halt: Option<HaltLevel>,

    /// List of optional runtime features to enable
    #[clap(long, value_delimiter = ',')]
    features: Vec<Feature>,

    /// Write colored logs even when not writing to a terminal
    #[clap(long)]
    always_write_style: bool,
}

#[derive(Args)]
struct ChainOptions {
    /// Name of the built-in chain to run
    #[clap(long, value_enum, default_value_t = Network::default())]
    network: Network,

    /// Load chain configuration from YAML_FILE instead of using a built-in one
    #[clap(long, value_name = "YAML_FILE")]
    chain_config: Option<PathBuf>,
}

#[derive(Args)]
struct HttpApiOptions {
    /// Engine API address
    #[clap(long, default_value_t = HttpApiConfig::default().address.ip())]
    http_address: IpAddr,

    /// Engine API port
    #[clap(long, default_value_t = HttpApiConfig::default().address.port())]
    http_port: u16,

    /// Path to the hex-encoded JWT secret shared with the consensus client.
    /// A new secret is generated if the file does not exist.
    #[clap(long, value_name = "FILE", default_value = DEFAULT_JWT_SECRET_FILE)]
    jwt_secret: PathBuf,

    /// List of Access-Control-Allow-Origin header values for the Engine API server
    #[clap(long, value_delimiter = ',')]
    http_allowed_origins: Vec<String>,

    /// Engine API request timeout in milliseconds
    #[clap(long)]
    http_timeout: Option<u64>,
}

#[derive(Args)]
struct MinerOptions {
    /// Gas limit to target when the consensus client does not set one
    #[clap(long, default_value_t = DEFAULT_GAS_CEIL)]
    miner_gas_ceil: Gas,

    /// Extra data included in built blocks
    #[clap(long, value_parser = parse_extra_data)]
    miner_extra_data: Option<Bytes>,

    /// Time between payload rebuilds in milliseconds
    #[clap(long, default_value_t = MinerOptions::default_recommit())]
    miner_recommit: u64,

    /// Maximum data availability size of a single transaction. 0 means no limit
    #[clap(long)]
    miner_max_da_tx_size: Option<u64>,

    /// Maximum data availability size of a block. 0 means no limit
    #[clap(long)]
    miner_max_da_block_size: Option<u64>,

    /// Fee recipient of the pending block
    #[clap(long, value_name = "EXECUTION_ADDRESS")]
    miner_pending_fee_recipient: Option<ExecutionAddress>,

    /// Build the pending block from the transaction pool on rollups
    #[clap(long)]
    rollup_compute_pending_block: bool,
}

impl MinerOptions {
    // `#[clap(value_parser = …)]` cannot be used because `Duration` does not implement `Display`.
    fn default_recommit() -> u64 {
        DEFAULT_RECOMMIT.as_secs() * 1000
    }
}

#[derive(Args)]
struct MetricsOptions {
    /// Collect Prometheus metrics and serve them at /metrics
    #[clap(long)]
    metrics: bool,

    /// Metrics server address
    #[clap(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    metrics_address: IpAddr,

    /// Metrics server port
    #[clap(long, default_value_t = DEFAULT_METRICS_PORT)]
    metrics_port: u16,
}

#[derive(Clone, Copy, Default, ValueEnum)]
#[cfg_attr(test, derive(PartialEq, Eq, Debug))]
pub enum Network {
    #[default]
    OptimismDevnet,
    EthereumDevnet,
    OpMainnet,
    Mainnet,
}

impl Network {
    fn chain_config(self) -> ChainConfig {
        match self {
            Self::OptimismDevnet => ChainConfig::optimism_devnet(),
            Self::EthereumDevnet => ChainConfig::ethereum_devnet(),
            Self::OpMainnet => ChainConfig::op_mainnet(),
            Self::Mainnet => ChainConfig::ethereum_mainnet(),
        }
    }
}

impl RollupEngineArgs {
    #[must_use]
    pub const fn always_write_style(&self) -> bool {
        self.always_write_style
    }

    pub fn try_into_config(self) -> Result<RollupEngineConfig> {
        let Self {
            chain_options,
            http_api_options,
            miner_options,
            metrics_options,
            rollup_halt,
            features,
            ..
        } = self;

        let ChainOptions {
            network,
            chain_config,
        } = chain_options;

        let chain_config = match chain_config {
            Some(path) => {
                let bytes = fs_err::read(path)?;
                serde_yaml::from_slice(bytes.as_slice())?
            }
            None => network.chain_config(),
        };

        chain_config.validate()?;

        let HttpApiOptions {
            http_address,
            http_port,
            jwt_secret,
            http_allowed_origins,
            http_timeout,
        } = http_api_options;

        let http_api_config = HttpApiConfig {
            allowed_origins: http_allowed_origins,
            timeout: http_timeout.map(Duration::from_millis),
            ..HttpApiConfig::with_address(http_address, http_port)
        };

        let MinerOptions {
            miner_gas_ceil,
            miner_extra_data,
            miner_recommit,
            miner_max_da_tx_size,
            miner_max_da_block_size,
            miner_pending_fee_recipient,
            rollup_compute_pending_block,
        } = miner_options;

        ensure!(miner_recommit > 0, Error::ZeroRecommit);

        let miner_config = MinerConfig {
            pending_fee_recipient: miner_pending_fee_recipient.unwrap_or_default(),
            extra_data: miner_extra_data.unwrap_or_default(),
            gas_ceil: miner_gas_ceil,
            recommit: Duration::from_millis(miner_recommit),
            rollup_compute_pending_block,
            max_da_tx_size: miner_max_da_tx_size.filter(|size| *size > 0),
            max_da_block_size: miner_max_da_block_size.filter(|size| *size > 0),
        };

        let MetricsOptions {
            metrics,
            metrics_address,
            metrics_port,
        } = metrics_options;

        let metrics_config = if metrics {
            let metrics = Arc::new(Metrics::new()?);
            metrics.register_with_default_metrics()?;
            METRICS.get_or_init(|| Arc::clone(&metrics));

            MetricsConfig {
                metrics: Some(metrics),
                metrics_address: Some(SocketAddr::new(metrics_address, metrics_port)),
            }
        } else {
            MetricsConfig::default()
        };

        for feature in features {
            info!("enabling feature: {feature}");
            feature.enable();
        }

        Ok(RollupEngineConfig {
            chain_config: Arc::new(chain_config),
            http_api_config,
            jwt_secret_path: jwt_secret,
            miner_config,
            metrics_config,
            halt_level: rollup_halt,
        })
    }

    pub fn clap_error(message: impl Display) -> ClapError {
        Self::command().error(ErrorKind::ValueValidation, message)
    }
}

#[derive(Debug, Error)]
enum Error {
    #[error("extra data must be no longer than {MAXIMUM_EXTRA_DATA_SIZE} bytes")]
    ExtraDataTooLong,
    #[error("--miner-recommit must be greater than zero")]
    ZeroRecommit,
}

fn parse_extra_data(string: &str) -> Result<Bytes> {
    ensure!(
        string.len() <= MAXIMUM_EXTRA_DATA_SIZE,
        Error::ExtraDataTooLong,
    );

    Ok(Bytes::copy_from_slice(string.as_bytes()))
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use tempfile::NamedTempFile;
    use test_case::test_case;

    use super::*;

    #[test]
    fn default_network_is_optimism_devnet() -> Result<()> {
        let config = try_config_from_args([])?;

        assert_eq!(*config.chain_config, ChainConfig::optimism_devnet());
        assert_eq!(config.halt_level, None);
        assert!(config.metrics_config.metrics.is_none());

        Ok(())
    }

    #[test_case("optimism-devnet", Network::OptimismDevnet)]
    #[test_case("ethereum-devnet", Network::EthereumDevnet)]
    #[test_case("op-mainnet", Network::OpMainnet)]
    #[test_case("mainnet", Network::Mainnet)]
    fn network_option(name: &str, network: Network) -> Result<()> {
        let config = try_config_from_args(["--network", name])?;

        assert_eq!(*config.chain_config, network.chain_config());

        Ok(())
    }

    #[test]
    fn http_options() -> Result<()> {
        let config = try_config_from_args([
            "--http-address",
            "0.0.0.0",
            "--http-port",
            "9551",
            "--http-allowed-origins",
            "http://a.example,http://b.example",
            "--http-timeout",
            "500",
        ])?;

        assert_eq!(
            config.http_api_config.address,
            SocketAddr::from(([0, 0, 0, 0], 9551)),
        );
        assert_eq!(
            config.http_api_config.allowed_origins,
            ["http://a.example", "http://b.example"],
        );
        assert_eq!(
            config.http_api_config.timeout,
            Some(Duration::from_millis(500)),
        );
        assert_eq!(config.jwt_secret_path, PathBuf::from(DEFAULT_JWT_SECRET_FILE));

        Ok(())
    }

    #[test]
    fn miner_options() -> Result<()> {
        let config = try_config_from_args([
            "--miner-gas-ceil",
            "60000000",
            "--miner-extra-data",
            "rollup",
            "--miner-recommit",
            "250",
            "--miner-max-da-tx-size",
            "0",
            "--miner-max-da-block-size",
            "1000",
            "--rollup-compute-pending-block",
        ])?;

        let miner_config = config.miner_config;

        assert_eq!(miner_config.gas_ceil, 60_000_000);
        assert_eq!(miner_config.extra_data, Bytes::from_static(b"rollup"));
        assert_eq!(miner_config.recommit, Duration::from_millis(250));
        assert_eq!(miner_config.max_da_tx_size, None);
        assert_eq!(miner_config.max_da_block_size, Some(1000));
        assert!(miner_config.rollup_compute_pending_block);

        Ok(())
    }

    #[test]
    fn default_recommit_matches_miner_config() -> Result<()> {
        let config = try_config_from_args([])?;

        assert_eq!(config.miner_config.recommit, DEFAULT_RECOMMIT);

        Ok(())
    }

    #[test]
    fn extra_data_must_fit_in_header() {
        let extra_data = "x".repeat(MAXIMUM_EXTRA_DATA_SIZE + 1);

        assert!(try_config_from_args(["--miner-extra-data", &extra_data]).is_err());
    }

    #[test]
    fn zero_recommit_is_rejected() {
        assert!(try_config_from_args(["--miner-recommit", "0"]).is_err());
    }

    #[test_case("major" => Some(HaltLevel::Major))]
    #[test_case("minor" => Some(HaltLevel::Minor))]
    #[test_case("patch" => Some(HaltLevel::Patch))]
    #[test_case("none" => None)]
    fn rollup_halt_option(level: &str) -> Option<HaltLevel> {
        try_config_from_args(["--rollup-halt", level])
            .ok()
            .and_then(|config| config.halt_level)
    }

    #[test]
    fn chain_config_is_read_from_file() -> Result<()> {
        let mut file = NamedTempFile::new()?;

        writeln!(file, "CONFIG_NAME: custom")?;
        writeln!(file, "CHAIN_ID: 4242")?;
        writeln!(file, "SHANGHAI_TIME: 0")?;

        let path = file.path().to_str().unwrap_or_default().to_owned();
        let config = try_config_from_args(["--network", "mainnet", "--chain-config", &path])?;

        assert_eq!(config.chain_config.chain_id, 4242);
        assert_eq!(config.chain_config.config_name, "custom");

        Ok(())
    }

    #[test]
    fn misordered_forks_are_rejected() -> Result<()> {
        let mut file = NamedTempFile::new()?;

        writeln!(file, "SHANGHAI_TIME: 10")?;
        writeln!(file, "CANCUN_TIME: 5")?;

        let path = file.path().to_str().unwrap_or_default().to_owned();

        assert!(try_config_from_args(["--chain-config", &path]).is_err());

        Ok(())
    }

    fn try_config_from_args<'a>(
        arguments: impl IntoIterator<Item = &'a str>,
    ) -> Result<RollupEngineConfig> {
        RollupEngineArgs::try_parse_from(core::iter::once(APPLICATION_NAME).chain(arguments))?
            .try_into_config()
    }
}
