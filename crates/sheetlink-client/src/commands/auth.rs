//! Authentication commands.

use std::path::{Path, PathBuf};

use tracing::info;

use sheetlink_google::{
    ClientFactory, GoogleClient, GoogleConfig, GoogleConfigOverrides, OAuthCredentials, TokenStore,
};

use crate::config::{ClientConfig, GoogleSettings};
use crate::error::{ClientError, ClientResult};

/// Ports tried, in order, for the loopback redirect.
const LOOPBACK_PORTS: (u16, u16) = (8085, 8099);

/// Run the Google authorization flow.
///
/// Resolves credentials from CLI flags, a `--credentials-file`, or
/// `config.toml`, then runs the installed-app flow with PKCE and stores
/// the token where `sheetlink export` will find it.
///
/// Credentials given on the command line are persisted to `config.toml`.
pub async fn google(
    client_id: Option<String>,
    client_secret: Option<String>,
    credentials_file: Option<PathBuf>,
    force: bool,
    config: &ClientConfig,
    config_path: &Path,
) -> ClientResult<()> {
    let (credentials, source) = resolve_google_credentials(
        client_id,
        client_secret,
        credentials_file,
        config.google.as_ref(),
    )?;

    let settings = config.google.clone().unwrap_or_default();
    let google_config = settings
        .to_google_config(credentials.clone())
        .map_err(ClientError::Config)?;
    let store = settings.token_store();
    let client = current_client(google_config, &store).await?;

    if client.is_authorized() && !force {
        save_credentials(config_path, &credentials, &source);
        println!("Already authorized with Google Sheets.");
        println!("Use --force to re-authorize.");
        return Ok(());
    }

    println!("Starting Google authorization...");
    println!();
    println!("A browser window will open for you to grant access.");
    println!("If the browser doesn't open, check the terminal for a URL to copy.");
    println!();

    let token = client
        .oauth()
        .authorize_loopback(client.config(), LOOPBACK_PORTS)
        .await?;
    store.put(client.token_key(), token)?;
    save_credentials(config_path, &credentials, &source);

    info!(key = %client.token_key(), "Google authorization successful");
    println!();
    println!("Authorization successful!");
    println!("Token saved to {}", store.path_for(client.token_key()).display());

    Ok(())
}

/// Loads the stored token for `google_config`.
///
/// A refresh token Google no longer accepts is deleted, so the loopback
/// flow runs again instead of failing on every attempt.
async fn current_client(
    google_config: GoogleConfig,
    store: &dyn TokenStore,
) -> ClientResult<GoogleClient> {
    let client = ClientFactory::new(google_config)
        .build_for_authorization(store, &GoogleConfigOverrides::default())
        .await?;
    Ok(client)
}

/// Where the credentials were resolved from.
#[derive(Debug, PartialEq)]
enum CredentialSource {
    /// `--client-id`/`--client-secret` or `--credentials-file`.
    Cli,
    /// Already in config.toml.
    Config,
}

/// Resolve credentials.
///
/// Priority: `--client-id` + `--client-secret`, then `--credentials-file`,
/// then the `[google]` section of config.toml. Giving only one of the two
/// flags is an error.
fn resolve_google_credentials(
    client_id: Option<String>,
    client_secret: Option<String>,
    credentials_file: Option<PathBuf>,
    settings: Option<&GoogleSettings>,
) -> ClientResult<(OAuthCredentials, CredentialSource)> {
    match (client_id, client_secret) {
        (Some(id), Some(secret)) => {
            return Ok((OAuthCredentials::new(id, secret), CredentialSource::Cli));
        }
        (Some(_), None) => {
            return Err(ClientError::Config(
                "--client-id requires --client-secret".to_string(),
            ));
        }
        (None, Some(_)) => {
            return Err(ClientError::Config(
                "--client-secret requires --client-id".to_string(),
            ));
        }
        (None, None) => {}
    }

    if let Some(path) = credentials_file {
        let credentials = OAuthCredentials::from_file(&path)?;
        return Ok((credentials, CredentialSource::Cli));
    }

    let settings = settings.ok_or_else(|| {
        ClientError::Config(format!(
            "Google credentials not found. Either:\n  \
             - Pass --client-id and --client-secret\n  \
             - Pass --credentials-file <path>\n  \
             - Add a [google] section to {}",
            ClientConfig::default_path().display()
        ))
    })?;
    let credentials = settings.resolve_credentials().map_err(ClientError::Config)?;
    Ok((credentials, CredentialSource::Config))
}

/// Writes credentials into the `[google]` table of `content`, keeping
/// everything else in the document as it was.
fn with_credentials(content: &str, credentials: &OAuthCredentials) -> Result<String, String> {
    let mut doc = content
        .parse::<toml_edit::DocumentMut>()
        .map_err(|e| format!("could not parse config.toml for writing: {}", e))?;

    if !doc.contains_key("google") {
        doc["google"] = toml_edit::Item::Table(toml_edit::Table::new());
    }
    let google = doc["google"]
        .as_table_mut()
        .ok_or_else(|| "`google` in config.toml is not a table".to_string())?;
    google["client_id"] = toml_edit::value(credentials.client_id.as_str());
    google["client_secret"] = toml_edit::value(credentials.client_secret.as_str());

    Ok(doc.to_string())
}

/// Saves CLI-provided credentials to `config_path`.
///
/// Failures are logged, never fatal: the token is already stored.
fn save_credentials(config_path: &Path, credentials: &OAuthCredentials, source: &CredentialSource) {
    if *source == CredentialSource::Config {
        return;
    }

    let content = std::fs::read_to_string(config_path).unwrap_or_default();
    let updated = match with_credentials(&content, credentials) {
        Ok(updated) => updated,
        Err(e) => {
            info!("{}", e);
            return;
        }
    };

    if let Some(parent) = config_path.parent()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        info!(
            "could not create config directory {}: {}",
            parent.display(),
            e
        );
        return;
    }

    match std::fs::write(config_path, updated) {
        Ok(()) => info!("saved Google credentials to {}", config_path.display()),
        Err(e) => info!("could not write {}: {}", config_path.display(), e),
    }
}
