//! # Faultline API
//!
//! HTTP surface for the root-cause analyzer:
//! - `POST /api/v1/rca/analyze` — analyze one alarm batch
//! - `GET /api/v1/rca/config` — effective analyzer configuration
//! - `GET /api/v1/rca/stats` — analyzer statistics
//! - `/health`, `/health/live`, `/health/ready` — health checks

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod handlers;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use faultline_analysis::Analyzer;
use tracing::info;

/// API server settings
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub timeout_secs: u64,
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: ([0, 0, 0, 0], 8080).into(),
            timeout_secs: 30,
            cors_origins: vec!["*".to_string()],
        }
    }
}

/// Shared state for all handlers
#[derive(Debug, Clone)]
pub struct ApiState {
    pub analyzer: Arc<Analyzer>,
    pub version: &'static str,
}

/// HTTP server wrapping the analyzer
#[derive(Debug)]
pub struct ApiServer {
    config: ApiConfig,
    state: Arc<ApiState>,
}

impl ApiServer {
    pub fn new(config: ApiConfig, analyzer: Arc<Analyzer>) -> Self {
        Self {
            config,
            state: Arc::new(ApiState {
                analyzer,
                version: env!("CARGO_PKG_VERSION"),
            }),
        }
    }

    /// Serve until the process is shut down
    pub async fn serve(self) -> std::io::Result<()> {
        let router = routes::create_router(&self.config, self.state.clone());
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        info!(addr = %self.config.bind_addr, "api server listening");
        axum::serve(listener, router).await
    }

    /// Serve with a shutdown future for graceful termination
    pub async fn serve_with_shutdown(
        self,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<()> {
        let router = routes::create_router(&self.config, self.state.clone());
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        info!(addr = %self.config.bind_addr, "api server listening");
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
    }
}

/// Convenience for building the state without a server (tests, embedding)
pub fn api_state(analyzer: Arc<Analyzer>) -> Arc<ApiState> {
    Arc::new(ApiState {
        analyzer,
        version: env!("CARGO_PKG_VERSION"),
    })
}
