//! CLI: Google authorization, spreadsheet export, server launcher
//!
//! This crate provides the `sheetlink` command-line interface.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod secret;

pub use cli::Cli;
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
