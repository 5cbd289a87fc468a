//! API route definitions.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;

use crate::handlers::{analyze, health, liveness, rca_config, rca_stats, readiness};
use crate::{ApiConfig, ApiState};

/// Build the full application router
pub fn create_router(config: &ApiConfig, state: Arc<ApiState>) -> Router {
    let api_v1 = Router::new()
        .route("/rca/analyze", post(analyze))
        .route("/rca/config", get(rca_config))
        .route("/rca/stats", get(rca_stats))
        .with_state(state.clone());

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/health/live", get(liveness))
        .route("/health/ready", get(readiness))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(health_routes)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any))
        .layer(TimeoutLayer::new(Duration::from_secs(config.timeout_secs)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_state;
    use faultline_analysis::Analyzer;
    use faultline_core::config::{AnalyzerConfig, PromptOptions};
    use faultline_topology::{SnapshotOracle, TopologySnapshot};

    #[test]
    fn test_router_creation() {
        let oracle = Arc::new(SnapshotOracle::new(TopologySnapshot::default()));
        let analyzer = Arc::new(
            Analyzer::new(oracle, None, AnalyzerConfig::default(), PromptOptions::default())
                .unwrap(),
        );
        let router = create_router(&ApiConfig::default(), api_state(analyzer));
        drop(router);
    }
}
