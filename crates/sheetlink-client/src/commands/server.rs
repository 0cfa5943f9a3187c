//! Server command: runs the HTTP service in the foreground.

use tracing::info;

use sheetlink_google::ClientFactory;
use sheetlink_server::{AppState, HttpServer, ShutdownHandle};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// Starts the HTTP service and blocks until SIGINT/SIGTERM.
pub async fn run(listen: Option<String>, config: &ClientConfig) -> ClientResult<()> {
    let settings = config.google.as_ref().ok_or_else(|| {
        ClientError::Config(format!(
            "no [google] section in {}; the server needs client credentials and a redirect_uri",
            ClientConfig::default_path().display()
        ))
    })?;
    if settings.redirect_uri.is_none() {
        return Err(ClientError::Config(
            "[google] redirect_uri is required to run the server".to_string(),
        ));
    }

    let credentials = settings.resolve_credentials().map_err(ClientError::Config)?;
    let google_config = settings
        .to_google_config(credentials)
        .map_err(ClientError::Config)?;
    let server_config = config
        .server_config(listen.as_deref())
        .map_err(ClientError::Config)?;

    let shutdown = ShutdownHandle::new();
    shutdown.spawn_listener();

    let state = AppState::new(ClientFactory::new(google_config), server_config.clone());
    let server = HttpServer::bind(&server_config, state).await?;
    info!(addr = %server.local_addr(), "sheetlink server listening");
    println!("Listening on http://{}", server.local_addr());

    server.run_until_shutdown(shutdown.wait()).await?;
    info!("server stopped");
    Ok(())
}
