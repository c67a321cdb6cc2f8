//! Serving endpoint using Axum
//!
//! Publishes the current endpoint snapshot as plain text, plus a health
//! check. The server never touches the probe pipeline; it only reads the
//! shared snapshot cache.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use crate::cache::CacheStore;
use crate::config::ServeConfig;
use crate::error::{RelayError, Result};

use super::routes;

/// Shared state for request handlers
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<CacheStore>,
    pub started_at: Instant,
}

/// Serving endpoint server
pub struct ApiServer {
    config: ServeConfig,
    state: AppState,
}

impl ApiServer {
    /// Create a new server over the shared snapshot cache
    pub fn new(config: ServeConfig, cache: Arc<CacheStore>) -> Self {
        let state = AppState {
            cache,
            started_at: Instant::now(),
        };

        Self { config, state }
    }

    /// Build the router
    fn build_router(&self) -> Router {
        routes::create_router(self.state.clone()).layer(TraceLayer::new_for_http())
    }

    /// Run the server until shutdown
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|_| {
                RelayError::InvalidConfig(format!(
                    "invalid serve address {}:{}",
                    self.config.host, self.config.port
                ))
            })?;

        let router = self.build_router();

        info!("Serving endpoint listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            })
            .await
            .map_err(|e| RelayError::Internal(e.to_string()))?;

        info!("Serving endpoint shut down");
        Ok(())
    }
}
