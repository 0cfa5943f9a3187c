//! HTTP service: OAuth redirect endpoints, session tokens, spreadsheet export.
//!
//! This crate provides the sheetlink web service that handles:
//! - The OAuth authorize/callback redirect pair
//! - Per-browser sessions holding their tokens in a TTL cache
//! - Spreadsheet export, answering with a redirect to the new sheet
//!
//! # Example
//!
//! ```rust,no_run
//! use sheetlink_google::ClientFactory;
//! use sheetlink_server::{AppState, HttpServer, ServerConfig, ShutdownHandle};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     let state = AppState::new(ClientFactory::default(), config.clone());
//!     let server = HttpServer::bind(&config, state).await?;
//!
//!     let shutdown = ShutdownHandle::new();
//!     shutdown.spawn_listener();
//!     server.run_until_shutdown(shutdown.wait()).await?;
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod routes;
mod server;
mod session;
mod signals;

pub use config::{DEFAULT_LISTEN_ADDR, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use routes::{AppState, ExportRequest, build_router};
pub use server::HttpServer;
pub use session::{DEFAULT_MAX_SESSIONS, Session, SessionStore};
pub use signals::ShutdownHandle;
