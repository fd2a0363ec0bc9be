use core::{net::SocketAddr, time::Duration};
use std::{sync::Arc, time::Instant};

use anyhow::{Error as AnyhowError, Result};
use axum::{
    body::Bytes,
    error_handling::HandleErrorLayer,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    routing::post,
    BoxError, Json, Router,
};
use engine_api::ConsensusApi;
use features::Feature;
use jsonrpsee::types::{error::ErrorCode, Id, InvalidRequest, Request};
use logging::info_with_head;
use prometheus_metrics::Metrics;
use serde::Serialize;
use serde_json::value::RawValue;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;

use crate::{
    http_api_config::HttpApiConfig,
    jwt::JwtSecret,
    methods,
    middleware::{self, MAX_BODY_SIZE},
    rpc::{Output, Params},
};

const LATENCY_WARNING_THRESHOLD: Duration = Duration::from_secs(1);

/// Authenticated JSON-RPC server for the Engine API.
pub struct HttpApi {
    pub api: Arc<ConsensusApi>,
    pub jwt_secret: Arc<JwtSecret>,
    pub http_api_config: HttpApiConfig,
    pub metrics: Option<Arc<Metrics>>,
}

impl HttpApi {
    /// Serves requests until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let listener = self.http_api_config.listener().await?;
        let address = listener.local_addr()?;
        let router = self.router()?;

        info_with_head!("Engine API listening on {address}");

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(AnyhowError::new)
    }

    fn router(self) -> Result<Router> {
        let Self {
            api,
            jwt_secret,
            http_api_config,
            metrics,
        } = self;

        let state = RpcState {
            api,
            metrics: metrics.clone(),
        };

        let mut router = Router::new()
            .route("/", post(handle_rpc))
            .with_state(state)
            .layer(DefaultBodyLimit::max(MAX_BODY_SIZE));

        if Feature::LogHttpBodies.is_enabled() {
            router = router.layer(axum::middleware::from_fn(middleware::log_bodies));
        }

        router = router.layer(axum::middleware::from_fn_with_state(
            jwt_secret,
            middleware::authorize,
        ));

        if let Some(timeout) = http_api_config.timeout {
            router = router.layer(
                ServiceBuilder::new()
                    .layer(HandleErrorLayer::new(|_: BoxError| async {
                        StatusCode::REQUEST_TIMEOUT
                    }))
                    .timeout(timeout),
            );
        }

        let router = router
            .layer(axum::middleware::from_fn_with_state(
                metrics,
                middleware::log_requests,
            ))
            .layer(http_api_config.cors()?);

        Ok(router)
    }
}

#[derive(Clone)]
struct RpcState {
    api: Arc<ConsensusApi>,
    metrics: Option<Arc<Metrics>>,
}

impl RpcState {
    async fn handle(&self, raw: &RawValue) -> Output {
        match serde_json::from_str::<Request>(raw.get()) {
            Ok(request) => self.call(request).await,
            Err(_) => {
                let id = serde_json::from_str::<InvalidRequest>(raw.get())
                    .map_or(Id::Null, |invalid| invalid.id.into_owned());

                Output::new(id, Err(ErrorCode::InvalidRequest.into()))
            }
        }
    }

    async fn call(&self, request: Request<'_>) -> Output {
        let Request {
            id, method, params, ..
        } = request;

        let id = id.into_owned();

        let params = match Params::parse(params.as_deref()) {
            Ok(params) => params,
            Err(error) => return Output::new(id, Err(error)),
        };

        features::log!(LogEngineApiCalls, "{method} called with {params:?}");

        // Unknown method names would create unbounded label values.
        let timer = self
            .metrics
            .as_ref()
            .filter(|_| methods::is_known(&method))
            .and_then(|metrics| metrics.engine_api_request(&method));

        let start = Instant::now();
        let result = methods::dispatch(&self.api, &method, &params).await;
        let elapsed = start.elapsed();

        prometheus_metrics::stop_and_record(timer);

        if elapsed > LATENCY_WARNING_THRESHOLD && Feature::WarnOnJsonRpcLatency.is_enabled() {
            Feature::WarnOnJsonRpcLatency.warn(format_args!("{method} took {elapsed:?}"));
        }

        match &result {
            Ok(value) => features::log!(LogEngineApiCalls, "{method} returned {value}"),
            Err(error) => features::log!(LogEngineApiCalls, "{method} failed: {error:?}"),
        }

        Output::new(id, result)
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum Reply {
    Single(Output),
    Batch(Vec<Output>),
}

async fn handle_rpc(State(state): State<RpcState>, body: Bytes) -> Json<Reply> {
    let parsed = core::str::from_utf8(&body)
        .ok()
        .and_then(|text| serde_json::from_str::<&RawValue>(text).ok());

    let Some(raw) = parsed else {
        return Json(Reply::Single(Output::anonymous(ErrorCode::ParseError)));
    };

    if !raw.get().starts_with('[') {
        return Json(Reply::Single(state.handle(raw).await));
    }

    let Ok(batch) = serde_json::from_str::<Vec<&RawValue>>(raw.get()) else {
        return Json(Reply::Single(Output::anonymous(ErrorCode::ParseError)));
    };

    if batch.is_empty() {
        return Json(Reply::Single(Output::anonymous(ErrorCode::InvalidRequest)));
    }

    let mut outputs = Vec::with_capacity(batch.len());

    for raw in batch {
        outputs.push(state.handle(raw).await);
    }

    Json(Reply::Batch(outputs))
}
