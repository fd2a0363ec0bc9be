use core::net::SocketAddr;

use anyhow::{Error as AnyhowError, Result};
use axum::{routing::get, Router};
use log::info;
use prometheus::TextEncoder;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::error::Error;

/// Serves metrics in the Prometheus text format at `/metrics` until `shutdown` is cancelled.
pub async fn run_metrics_server(address: SocketAddr, shutdown: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(address).await?;

    info!("metrics server listening on {}", listener.local_addr()?);

    axum::serve(listener, router())
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(AnyhowError::new)
}

fn router() -> Router {
    Router::new().route("/metrics", get(prometheus_metrics))
}

async fn prometheus_metrics() -> Result<String, Error> {
    let mut buffer = String::new();

    TextEncoder::new()
        .encode_utf8(prometheus::gather().as_slice(), &mut buffer)
        .map_err(AnyhowError::new)?;

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use prometheus::{IntCounter, Opts};
    use tower::ServiceExt as _;

    use super::*;

    #[tokio::test]
    async fn registered_metrics_are_served() -> Result<()> {
        let counter = IntCounter::with_opts(Opts::new(
            "METRICS_SERVER_TEST_COUNTER",
            "Counter registered by the metrics server test",
        ))?;

        prometheus::register(Box::new(counter.clone()))?;
        counter.inc();

        let response = router()
            .oneshot(Request::get("/metrics").body(Body::empty())?)
            .await?;

        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        let text = core::str::from_utf8(&bytes)?;

        assert!(text.contains("METRICS_SERVER_TEST_COUNTER 1"));

        Ok(())
    }
}
