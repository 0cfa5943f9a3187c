//! Export command.

use std::io::Read;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info};

use sheetlink_core::FieldMap;
use sheetlink_google::{ClientFactory, GoogleConfigOverrides, SheetExporter};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// Title used when rows come from stdin and no `--title` is given.
const STDIN_TITLE: &str = "sheetlink export";

/// Export a JSON file of rows to a new spreadsheet and print its URL.
pub async fn run(
    file: PathBuf,
    title: Option<String>,
    fields: Vec<String>,
    batch_size: Option<usize>,
    config: &ClientConfig,
) -> ClientResult<()> {
    let rows = read_rows(&file)?;
    let fields = parse_fields(&fields)?;
    let title = title.unwrap_or_else(|| default_title(&file));
    let batch_size = batch_size.unwrap_or(config.export.batch_size);

    let settings = config.google.clone().unwrap_or_default();
    let credentials = settings.resolve_credentials().map_err(ClientError::Config)?;
    let google_config = settings
        .to_google_config(credentials)
        .map_err(ClientError::Config)?;
    let store = settings.token_store();

    let client = ClientFactory::new(google_config)
        .build(&store, &GoogleConfigOverrides::default())
        .await?;
    let exporter = SheetExporter::new(client.sheets()?, batch_size)?;

    debug!(%title, batch_size, "exporting");
    let created = exporter
        .export_json(&title, rows, fields.as_ref())
        .await?;

    info!(spreadsheet_id = %created.spreadsheet_id, "spreadsheet created");
    println!("{}", created.spreadsheet_url);
    Ok(())
}

/// Reads JSON from `path`, or from stdin when `path` is `-`.
fn read_rows(path: &Path) -> ClientResult<Value> {
    let content = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| ClientError::Input(format!("failed to read stdin: {}", e)))?;
        buf
    } else {
        std::fs::read_to_string(path)
            .map_err(|e| ClientError::Input(format!("failed to read {}: {}", path.display(), e)))?
    };
    parse_rows(&content)
}

fn parse_rows(content: &str) -> ClientResult<Value> {
    serde_json::from_str(content).map_err(|e| ClientError::Input(format!("invalid JSON: {}", e)))
}

/// Parses `--field` specs; no specs means no mapping.
fn parse_fields(specs: &[String]) -> ClientResult<Option<FieldMap>> {
    if specs.is_empty() {
        return Ok(None);
    }
    FieldMap::parse_specs(specs)
        .map(Some)
        .map_err(|e| ClientError::Input(e.to_string()))
}

fn default_title(path: &Path) -> String {
    if path.as_os_str() == "-" {
        return STDIN_TITLE.to_string();
    }
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| STDIN_TITLE.to_string())
}
