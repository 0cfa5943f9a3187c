//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// sheetlink - Export JSON rows to Google Sheets
#[derive(Debug, Parser)]
#[command(name = "sheetlink")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "SHEETLINK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Authentication commands
    Auth {
        #[command(subcommand)]
        provider: AuthProvider,
    },

    /// Export a JSON file to a new spreadsheet
    Export {
        /// JSON file holding an array of rows (`-` for stdin)
        file: PathBuf,

        /// Spreadsheet title (defaults to the file name)
        #[arg(long, short)]
        title: Option<String>,

        /// Column mapping as `field=Header` (can be repeated, in column order)
        #[arg(long = "field", short = 'f', action = clap::ArgAction::Append)]
        fields: Vec<String>,

        /// Rows per append request
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Start the HTTP service in the foreground
    Server {
        /// Address to listen on (overrides `[server] listen_addr`)
        #[arg(long, env = "SHEETLINK_LISTEN")]
        listen: Option<String>,
    },
}

/// Authentication providers.
#[derive(Debug, Subcommand)]
pub enum AuthProvider {
    /// Authorize access to Google Sheets
    Google {
        /// OAuth client ID (from Google Cloud Console)
        #[arg(long, env = "GOOGLE_CLIENT_ID")]
        client_id: Option<String>,

        /// OAuth client secret (from Google Cloud Console)
        #[arg(long, env = "GOOGLE_CLIENT_SECRET")]
        client_secret: Option<String>,

        /// Path to Google Cloud Console credentials JSON file
        #[arg(long, env = "GOOGLE_CREDENTIALS_FILE")]
        credentials_file: Option<PathBuf>,

        /// Force re-authorization even if a valid token is stored
        #[arg(long, short)]
        force: bool,
    },
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Validate configuration
    Validate,

    /// Show configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_export_with_fields() {
        let cli = Cli::try_parse_from([
            "sheetlink",
            "export",
            "rows.json",
            "--title",
            "Report",
            "--field",
            "name=Name",
            "-f",
            "age",
            "--batch-size",
            "50",
        ])
        .unwrap();

        match cli.command {
            Command::Export {
                file,
                title,
                fields,
                batch_size,
            } => {
                assert_eq!(file, PathBuf::from("rows.json"));
                assert_eq!(title.as_deref(), Some("Report"));
                assert_eq!(fields, vec!["name=Name", "age"]);
                assert_eq!(batch_size, Some(50));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_global_flags() {
        let cli =
            Cli::try_parse_from(["sheetlink", "-v", "-c", "/tmp/c.toml", "config", "path"]).unwrap();
        assert!(cli.debug);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
        assert!(matches!(
            cli.command,
            Command::Config {
                action: ConfigAction::Path
            }
        ));
    }

    #[test]
    fn parses_auth_force() {
        let cli = Cli::try_parse_from(["sheetlink", "auth", "google", "--force"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Auth {
                provider: AuthProvider::Google { force: true, .. }
            }
        ));
    }

    #[test]
    fn command_is_required() {
        assert!(Cli::try_parse_from(["sheetlink"]).is_err());
    }
}
