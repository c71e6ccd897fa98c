use std::sync::Arc;

use chatloop_agents::TurnExecutor;
use chatloop_common::{Error, Result};
use chatloop_config::AppConfig;
use tokio::net::TcpListener;
use tracing::info;

use crate::router::build_router;
use crate::state::AppState;

/// The HTTP server: owns the shared state and serves the router until Ctrl-C.
pub struct GatewayServer {
    state: Arc<AppState>,
}

impl GatewayServer {
    pub fn new(config: AppConfig, executor: TurnExecutor) -> Self {
        Self {
            state: Arc::new(AppState::new(config, executor)),
        }
    }

    /// Bind the configured address and serve.
    pub async fn run(self) -> Result<()> {
        let addr = self.state.config.bind_address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Gateway(format!("failed to bind {addr}: {e}")))?;
        self.serve(listener).await
    }

    /// Serve on an already-bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let addr = listener.local_addr()?;
        info!(
            "gateway listening on http://{} ({} tools)",
            addr,
            self.state.executor.tools().len()
        );

        let app = build_router(self.state);
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Gateway(format!("server error: {e}")))?;

        info!("gateway shut down");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
