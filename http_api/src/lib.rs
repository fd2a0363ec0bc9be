//! Engine API JSON-RPC server.
//!
//! Requests are authenticated with JWT tokens signed by a shared secret and dispatched to
//! [`engine_api::ConsensusApi`].

pub use crate::{
    http_api_config::{HttpApiConfig, DEFAULT_ENGINE_API_PORT},
    jwt::JwtSecret,
    metrics_server::run_metrics_server,
    task::HttpApi,
};

mod error;
mod http_api_config;
mod jwt;
mod methods;
mod metrics_server;
mod middleware;
mod rpc;
mod task;
