//! Google Sheets API v4 client.
//!
//! Only the two calls an export needs are implemented: creating a
//! spreadsheet and appending rows to one of its sheets through
//! `spreadsheets.batchUpdate` with an `appendCells` request.

use serde::{Deserialize, Serialize};
use sheetlink_core::{BoxFuture, RowSink};
use tracing::debug;

use crate::error::{ApiError, ApiResult};

/// Identifier of the first sheet in a spreadsheet we create.
pub const DEFAULT_SHEET_ID: i64 = 0;

/// A created spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpreadsheetRef {
    /// Spreadsheet identifier.
    pub spreadsheet_id: String,
    /// Browser URL of the spreadsheet.
    pub spreadsheet_url: String,
}

// Request payloads -----------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateSpreadsheetRequest<'a> {
    properties: SpreadsheetProperties<'a>,
    sheets: Vec<SheetSpec<'a>>,
}

#[derive(Debug, Serialize)]
struct SpreadsheetProperties<'a> {
    title: &'a str,
}

#[derive(Debug, Serialize)]
struct SheetSpec<'a> {
    properties: SheetProperties<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties<'a> {
    sheet_id: i64,
    title: &'a str,
}

#[derive(Debug, Serialize)]
struct BatchUpdateRequest {
    requests: Vec<SheetRequest>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum SheetRequest {
    AppendCells(AppendCellsRequest),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AppendCellsRequest {
    sheet_id: i64,
    rows: Vec<RowPayload>,
    fields: &'static str,
}

#[derive(Debug, Serialize)]
struct RowPayload {
    values: Vec<CellPayload>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CellPayload {
    user_entered_value: ExtendedValue,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExtendedValue {
    string_value: String,
}

fn append_cells_body(sheet_id: i64, rows: Vec<Vec<String>>) -> BatchUpdateRequest {
    let rows = rows
        .into_iter()
        .map(|cells| RowPayload {
            values: cells
                .into_iter()
                .map(|text| CellPayload {
                    user_entered_value: ExtendedValue { string_value: text },
                })
                .collect(),
        })
        .collect();

    BatchUpdateRequest {
        requests: vec![SheetRequest::AppendCells(AppendCellsRequest {
            sheet_id,
            rows,
            fields: "userEnteredValue",
        })],
    }
}

/// Sheets API client authorised with one access token.
#[derive(Debug, Clone)]
pub struct SheetsClient {
    http_client: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl SheetsClient {
    /// Creates a client for the API rooted at `base_url`.
    pub fn new(
        http_client: reqwest::Client,
        base_url: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        }
    }

    /// Creates a spreadsheet with a single sheet (id 0).
    pub async fn create_spreadsheet(&self, title: &str) -> ApiResult<SpreadsheetRef> {
        let url = format!("{}/v4/spreadsheets", self.base_url);
        let body = CreateSpreadsheetRequest {
            properties: SpreadsheetProperties { title },
            sheets: vec![SheetSpec {
                properties: SheetProperties {
                    sheet_id: DEFAULT_SHEET_ID,
                    title: "Sheet1",
                },
            }],
        };

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::from_transport("create spreadsheet", e))?;

        let body = Self::read_success(response, "create spreadsheet").await?;
        let created: SpreadsheetRef = serde_json::from_str(&body).map_err(|e| {
            ApiError::invalid_response(format!("failed to parse spreadsheet: {}", e))
        })?;

        debug!(spreadsheet_id = %created.spreadsheet_id, "created spreadsheet");
        Ok(created)
    }

    /// Appends rows to a sheet in one `batchUpdate` call.
    pub async fn append_cells(
        &self,
        spreadsheet_id: &str,
        sheet_id: i64,
        rows: Vec<Vec<String>>,
    ) -> ApiResult<()> {
        let url = format!(
            "{}/v4/spreadsheets/{}:batchUpdate",
            self.base_url,
            urlencoding::encode(spreadsheet_id)
        );
        let count = rows.len();
        let body = append_cells_body(sheet_id, rows);

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::from_transport("append cells", e))?;

        Self::read_success(response, "append cells").await?;
        debug!(spreadsheet_id, rows = count, "appended rows");
        Ok(())
    }

    async fn read_success(response: reqwest::Response, context: &str) -> ApiResult<String> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::from_transport(context, e))?;

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ApiError::authentication(format!(
                "{}: access token rejected: {}",
                context, body
            ))
            .with_status(status.as_u16()));
        }
        if !status.is_success() {
            return Err(ApiError::external(status.as_u16(), body));
        }
        Ok(body)
    }

    /// Returns a sink appending to `sheet_id` of `spreadsheet_id`.
    pub fn writer(&self, spreadsheet_id: impl Into<String>, sheet_id: i64) -> SheetWriter {
        SheetWriter {
            client: self.clone(),
            spreadsheet_id: spreadsheet_id.into(),
            sheet_id,
        }
    }
}

/// [`RowSink`] that appends each batch to a sheet.
#[derive(Debug, Clone)]
pub struct SheetWriter {
    client: SheetsClient,
    spreadsheet_id: String,
    sheet_id: i64,
}

impl RowSink for SheetWriter {
    type Error = ApiError;

    fn write_rows(&mut self, rows: Vec<Vec<String>>) -> BoxFuture<'_, ApiResult<()>> {
        Box::pin(async move {
            self.client
                .append_cells(&self.spreadsheet_id, self.sheet_id, rows)
                .await
        })
    }
}
