//! HTTP listener.

use std::future::Future;
use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::routes::{AppState, build_router};

/// A bound HTTP server.
#[derive(Debug)]
pub struct HttpServer {
    listener: TcpListener,
    router: Router,
    state: AppState,
    local_addr: SocketAddr,
}

impl HttpServer {
    /// Binds the configured address.
    pub async fn bind(config: &ServerConfig, state: AppState) -> ServerResult<Self> {
        if config.batch_size == 0 {
            return Err(ServerError::config("batch_size must be at least 1"));
        }

        let listener = TcpListener::bind(config.listen_addr).await?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            router: build_router(state.clone()),
            state,
            local_addr,
        })
    }

    /// Returns the address actually bound.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves requests until `shutdown` completes, then drains in-flight
    /// requests.
    pub async fn run_until_shutdown<F>(self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!(addr = %self.local_addr, "server listening");
        let sweeper = tokio::spawn(sweep_sessions(self.state));
        let served = axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await;
        sweeper.abort();
        served?;
        info!("server stopped");
        Ok(())
    }
}

/// Evicts idle sessions until aborted.
async fn sweep_sessions(state: AppState) {
    let mut interval = tokio::time::interval(state.config().sweep_interval());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let evicted = state.sessions().evict_idle();
        if evicted > 0 {
            debug!(evicted, remaining = state.sessions().len(), "session sweep");
        }
    }
}
