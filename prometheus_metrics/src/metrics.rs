use core::time::Duration;
use std::sync::Arc;

use anyhow::Result;
use log::warn;
use once_cell::sync::OnceCell;
use prometheus::{
    histogram_opts, opts, Histogram, HistogramTimer, HistogramVec, IntCounter, IntCounterVec,
    IntGauge,
};
use types::primitives::ExecutionBlockNumber;

use crate::helpers;

pub static METRICS: OnceCell<Arc<Metrics>> = OnceCell::new();

#[derive(Debug)]
pub struct Metrics {
    // Overview
    live: IntGauge,
    head_number: IntGauge,

    // HTTP API metrics
    http_api_response_times: HistogramVec,

    // Engine API metrics
    engine_api_requests: IntCounterVec,
    engine_api_response_times: HistogramVec,
    forkchoice_statuses: IntCounterVec,
    new_payload_statuses: IntCounterVec,
    invalid_tipsets: IntGauge,

    // Payload building
    pub payload_builds: IntCounter,
    pub payload_build_times: Histogram,
    pub payload_improvements: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        Ok(Self {
            // Overview
            live: IntGauge::new("IS_LIVE", "Rollup engine status")?,
            head_number: IntGauge::new("HEAD_NUMBER", "Number of the canonical head block")?,

            // HTTP API metrics
            http_api_response_times: HistogramVec::new(
                histogram_opts!(
                    "HTTP_API_RESPONSE_TIMES",
                    "Response times for HTTP API responses"
                ),
                &["request_path"],
            )?,

            // Engine API metrics
            engine_api_requests: IntCounterVec::new(
                opts!("ENGINE_API_REQUESTS", "Number of Engine API requests per method"),
                &["method"],
            )?,

            engine_api_response_times: HistogramVec::new(
                histogram_opts!(
                    "ENGINE_API_RESPONSE_TIMES",
                    "Time spent handling Engine API requests per method"
                ),
                &["method"],
            )?,

            forkchoice_statuses: IntCounterVec::new(
                opts!(
                    "FORKCHOICE_UPDATED_STATUSES",
                    "Number of forkchoice updates per returned status"
                ),
                &["status"],
            )?,

            new_payload_statuses: IntCounterVec::new(
                opts!(
                    "NEW_PAYLOAD_STATUSES",
                    "Number of new payloads per returned status"
                ),
                &["status"],
            )?,

            invalid_tipsets: IntGauge::new(
                "INVALID_TIPSETS",
                "Number of chain tips known to descend from a bad block",
            )?,

            // Payload building
            payload_builds: IntCounter::new("PAYLOAD_BUILDS", "Number of payload builds started")?,

            payload_build_times: Histogram::with_opts(histogram_opts!(
                "PAYLOAD_BUILD_TIMES",
                "Time taken to build the empty block of a payload",
            ))?,

            payload_improvements: IntCounter::new(
                "PAYLOAD_IMPROVEMENTS",
                "Number of times a payload was replaced by a block with more fees",
            )?,
        })
    }

    pub fn register_with_default_metrics(&self) -> Result<()> {
        let default_registry = prometheus::default_registry();

        default_registry.register(Box::new(self.live.clone()))?;
        default_registry.register(Box::new(self.head_number.clone()))?;
        default_registry.register(Box::new(self.http_api_response_times.clone()))?;
        default_registry.register(Box::new(self.engine_api_requests.clone()))?;
        default_registry.register(Box::new(self.engine_api_response_times.clone()))?;
        default_registry.register(Box::new(self.forkchoice_statuses.clone()))?;
        default_registry.register(Box::new(self.new_payload_statuses.clone()))?;
        default_registry.register(Box::new(self.invalid_tipsets.clone()))?;
        default_registry.register(Box::new(self.payload_builds.clone()))?;
        default_registry.register(Box::new(self.payload_build_times.clone()))?;
        default_registry.register(Box::new(self.payload_improvements.clone()))?;

        Ok(())
    }

    // Overview
    pub fn set_live(&self) {
        self.live.set(1)
    }

    pub fn set_head_number(&self, number: ExecutionBlockNumber) {
        self.head_number
            .set(i64::try_from(number).unwrap_or(i64::MAX))
    }

    // HTTP API metrics
    pub fn set_http_api_response_time(&self, labels: &[&str], response_duration: Duration) {
        match self
            .http_api_response_times
            .get_metric_with_label_values(labels)
        {
            Ok(metrics) => metrics.observe(response_duration.as_secs_f64()),
            Err(error) => warn!("unable to track HTTP API response time for {labels:?}: {error:?}"),
        }
    }

    // Engine API metrics
    pub fn engine_api_request(&self, method: &str) -> Option<HistogramTimer> {
        match self.engine_api_requests.get_metric_with_label_values(&[method]) {
            Ok(counter) => counter.inc(),
            Err(error) => warn!("unable to count Engine API request {method}: {error:?}"),
        }

        helpers::start_timer_vec(&self.engine_api_response_times, method)
    }

    pub fn register_forkchoice_status(&self, status: &str) {
        match self.forkchoice_statuses.get_metric_with_label_values(&[status]) {
            Ok(counter) => counter.inc(),
            Err(error) => warn!("unable to track forkchoice status {status}: {error:?}"),
        }
    }

    pub fn register_new_payload_status(&self, status: &str) {
        match self.new_payload_statuses.get_metric_with_label_values(&[status]) {
            Ok(counter) => counter.inc(),
            Err(error) => warn!("unable to track new payload status {status}: {error:?}"),
        }
    }

    pub fn set_invalid_tipsets(&self, count: usize) {
        self.invalid_tipsets
            .set(i64::try_from(count).unwrap_or(i64::MAX))
    }
}
