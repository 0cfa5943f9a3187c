//! Configuration commands.

use std::path::Path;

use crate::config::{ClientConfig, GoogleSettings};
use crate::error::{ClientError, ClientResult};
use crate::secret::SecretRef;

/// Dump the current configuration to stdout.
pub fn dump(config: &ClientConfig, config_path: &Path) -> ClientResult<()> {
    let toml_str = toml::to_string_pretty(config)
        .map_err(|e| ClientError::Config(format!("failed to serialize config: {}", e)))?;
    println!("# config.toml ({})", config_path.display());
    println!("{}", toml_str);

    Ok(())
}

/// Validate the configuration.
pub fn validate(config: &ClientConfig) -> ClientResult<()> {
    check(config)?;
    if let Some(ref google) = config.google {
        println!("Google credentials are valid.");
        if has_inline_secret(google) {
            println!(
                "note: client_secret is stored in plain text; \
                 consider an env::, file:: or pass:: reference"
            );
        }
    }
    println!("Configuration is valid.");
    Ok(())
}

fn check(config: &ClientConfig) -> ClientResult<()> {
    config.server_config(None).map_err(ClientError::Config)?;

    if let Some(ref google) = config.google {
        let credentials = google
            .resolve_credentials()
            .map_err(|e| ClientError::Config(format!("invalid Google credentials: {}", e)))?;
        google
            .to_google_config(credentials)
            .map_err(ClientError::Config)?;
    }
    Ok(())
}

/// True when `client_secret` is written into config.toml itself.
fn has_inline_secret(google: &GoogleSettings) -> bool {
    google
        .client_secret
        .as_deref()
        .is_some_and(|secret| !SecretRef::parse(secret).is_reference())
}

/// Show the configuration file path.
pub fn path(config_path: &Path) -> ClientResult<()> {
    println!("config: {}", config_path.display());
    Ok(())
}
