use core::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use anyhow::Result;
use axum::http::HeaderValue;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};

pub const DEFAULT_ENGINE_API_PORT: u16 = 8551;

#[derive(Clone, Debug)]
pub struct HttpApiConfig {
    pub address: SocketAddr,
    /// Origins allowed to make cross-origin requests. `*` allows any origin.
    pub allowed_origins: Vec<String>,
    pub timeout: Option<Duration>,
}

impl Default for HttpApiConfig {
    fn default() -> Self {
        Self::with_address(Ipv4Addr::LOCALHOST, DEFAULT_ENGINE_API_PORT)
    }
}

impl HttpApiConfig {
    #[must_use]
    pub fn with_address(ip_address: impl Into<IpAddr>, port: u16) -> Self {
        Self {
            address: (ip_address, port).into(),
            allowed_origins: vec![],
            timeout: None,
        }
    }

    pub(crate) fn cors(&self) -> Result<CorsLayer> {
        let allow_origin = if self.allowed_origins.iter().any(|origin| origin == "*") {
            AllowOrigin::any()
        } else {
            let origins = self
                .allowed_origins
                .iter()
                .map(|origin| HeaderValue::from_str(origin))
                .collect::<Result<Vec<_>, _>>()?;

            AllowOrigin::list(origins)
        };

        Ok(CorsLayer::new().allow_origin(allow_origin))
    }

    pub(crate) async fn listener(&self) -> Result<TcpListener> {
        TcpListener::bind(self.address).await.map_err(Into::into)
    }
}
