use core::{net::SocketAddr, time::Duration};
use std::{sync::Arc, time::Instant};

use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::Response,
};
use features::Feature;
use log::info;
use prometheus_metrics::Metrics;

use crate::{error::Error, jwt::JwtSecret};

// Engine API payloads with blobs can be large.
pub const MAX_BODY_SIZE: usize = 128 * 1024 * 1024;

const BEARER_PREFIX: &str = "Bearer ";

pub async fn authorize(
    State(secret): State<Arc<JwtSecret>>,
    request: Request,
    next: Next,
) -> Result<Response, Error> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix(BEARER_PREFIX))
        .ok_or(Error::MissingToken)?;

    secret.verify(token.trim()).map_err(Error::InvalidToken)?;

    Ok(next.run(request).await)
}

pub async fn log_requests(
    State(metrics): State<Option<Arc<Metrics>>>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(remote)| *remote);

    if Feature::LogHttpRequests.is_enabled() {
        info!("received request ({method} {uri}) from {remote:?}");
    }

    if Feature::LogHttpHeaders.is_enabled() {
        info!("request headers for ({method} {uri}): {:?}", request.headers());
    }

    let start = Instant::now();
    let response = next.run(request).await;
    let latency = start.elapsed();

    if Feature::LogHttpRequests.is_enabled() {
        info!(
            "produced response ({}) to ({method} {uri}) for {remote:?} in {latency:?}",
            response.status(),
        );
    }

    if let Some(metrics) = metrics {
        record_latency(&metrics, &response, &format!("{method} {}", uri.path()), latency);
    }

    response
}

pub async fn log_bodies(request: Request, next: Next) -> Result<Response, StatusCode> {
    let uri = request.uri().clone();

    let (parts, body) = request.into_parts();
    let bytes = buffer_and_log("request", body).await?;
    let response = next.run(Request::from_parts(parts, Body::from(bytes))).await;

    let (parts, body) = response.into_parts();
    let bytes = buffer_and_log("response", body).await?;

    info!("finished logging bodies for {uri}");

    Ok(Response::from_parts(parts, Body::from(bytes)))
}

async fn buffer_and_log(direction: &str, body: Body) -> Result<Bytes, StatusCode> {
    let bytes = axum::body::to_bytes(body, MAX_BODY_SIZE)
        .await
        .map_err(|_| StatusCode::PAYLOAD_TOO_LARGE)?;

    if let Ok(string) = core::str::from_utf8(&bytes) {
        info!("{direction} body: {string}");
    }

    Ok(bytes)
}

fn record_latency(metrics: &Metrics, response: &Response, request_path: &str, latency: Duration) {
    // Don't observe arbitrary requests
    if response.status() == StatusCode::NOT_FOUND {
        return;
    }

    metrics.set_http_api_response_time(&[request_path], latency);
}
