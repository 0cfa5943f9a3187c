//! Google OAuth and Sheets export.
//!
//! This crate connects the row pipeline in `sheetlink-core` to Google:
//!
//! - [`TokenStore`] - Where OAuth tokens live (TTL cache, files)
//! - [`ClientFactory`] - Merges configuration, loads and refreshes tokens
//! - [`RedirectFlow`] - The authorize/callback pair for web sessions
//! - [`SheetExporter`] - Creates a spreadsheet and appends rows in batches
//! - [`ApiError`] - Error types for every operation above
//!
//! # Architecture
//!
//! ```text
//!  GoogleConfig + overrides        TokenStore
//!            │                         │
//!            ▼                         │
//!    ┌───────────────┐  get / put     │
//!    │ ClientFactory │◄───────────────┘
//!    └───────┬───────┘
//!            │ refresh via OAuthClient
//!            ▼
//!    ┌───────────────┐  sheets()  ┌──────────────┐
//!    │ GoogleClient  │───────────►│ SheetsClient │
//!    └───────────────┘            └──────┬───────┘
//!                                        │ SheetWriter (RowSink)
//!                                        ▼
//!                                 ┌──────────────┐
//!                                 │  RowBatcher  │
//!                                 └──────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use sheetlink_google::{ClientFactory, FileTokenStore, GoogleConfigOverrides, SheetExporter};
//!
//! async fn export(factory: &ClientFactory, rows: serde_json::Value) -> ApiResult<String> {
//!     let store = FileTokenStore::new(FileTokenStore::default_dir());
//!     let client = factory.build(&store, &GoogleConfigOverrides::new()).await?;
//!     let exporter = SheetExporter::with_default_size(client.sheets()?);
//!     Ok(exporter.export_json("Report", rows, None).await?.spreadsheet_url)
//! }
//! ```

pub mod config;
pub mod error;
pub mod export;
pub mod factory;
pub mod flow;
pub mod oauth;
pub mod sheets;
pub mod store;
pub mod token;

#[cfg(test)]
mod testing;

// Re-export main types at crate root
pub use config::{
    AccessType, GoogleConfig, GoogleConfigOverrides, GoogleEndpoints, OAuthCredentials,
    TOKEN_KEY_PREFIX,
};
pub use error::{ApiError, ApiErrorCode, ApiResult};
pub use export::SheetExporter;
pub use factory::{ClientFactory, GoogleClient};
pub use flow::{
    AuthorizeOutcome, CallbackParams, DEFAULT_RETURN_URL, PendingAuthorization, RedirectFlow,
};
pub use oauth::{AuthorizationRequest, OAuthClient, PkceFlow, generate_state};
pub use sheets::{DEFAULT_SHEET_ID, SheetWriter, SheetsClient, SpreadsheetRef};
pub use store::{CacheTokenStore, FileTokenStore, TokenStore};
pub use token::{EXPIRY_LEEWAY_SECS, Token};
