use std::io::Write as _;

use anyhow::Result;
use env_logger::{Builder, WriteStyle};
use log::{debug, LevelFilter};

pub const LOG_ENVIRONMENT_VARIABLE: &str = "ROLLUP_ENGINE_LOG";

// Crates whose messages are shown by default. Everything else is filtered out.
const LOGGING_CRATES: &[&str] = &[
    "binary_utils",
    "blockchain",
    "engine_api",
    "execution_engine",
    "features",
    "http_api",
    "logging",
    "payload_builder",
    "prometheus_metrics",
];

pub fn initialize_logger(module_path: &str, always_write_style: bool) -> Result<()> {
    let mut builder = logger_builder(module_path, always_write_style);

    if let Ok(filters) = std::env::var(LOG_ENVIRONMENT_VARIABLE) {
        builder.parse_filters(filters.as_str());
    }

    builder.try_init()?;

    debug!("logger initialized");

    Ok(())
}

fn logger_builder(module_path: &str, always_write_style: bool) -> Builder {
    let mut builder = Builder::new();

    builder.filter_level(LevelFilter::Off);

    for module in LOGGING_CRATES.iter().copied().chain([module_path]) {
        builder.filter_module(module, LevelFilter::Info);
    }

    builder
        .format_timestamp_millis()
        .format_target(false)
        .format(|formatter, record| {
            let style = formatter.default_level_style(record.level());

            writeln!(
                formatter,
                "[{}] {style}{:<5}{style:#} {}",
                formatter.timestamp_millis(),
                record.level(),
                record.args(),
            )
        });

    if always_write_style {
        builder.write_style(WriteStyle::Always);
    }

    builder
}

