//! Spreadsheet export.
//!
//! Creates a new spreadsheet and streams rows into its first sheet through
//! a [`RowBatcher`], so large exports cost one `appendCells` call per
//! batch instead of one per row.

use serde_json::Value;
use sheetlink_core::{DEFAULT_BATCH_SIZE, FieldMap, RowBatcher, RowData, convert_row, header_row};
use tracing::{info, instrument};

use crate::error::{ApiError, ApiResult};
use crate::sheets::{DEFAULT_SHEET_ID, SheetsClient, SpreadsheetRef};

/// Exports rows into new spreadsheets.
#[derive(Debug, Clone)]
pub struct SheetExporter {
    sheets: SheetsClient,
    batch_size: usize,
}

impl SheetExporter {
    /// Creates an exporter flushing every `batch_size` rows.
    pub fn new(sheets: SheetsClient, batch_size: usize) -> ApiResult<Self> {
        if batch_size == 0 {
            return Err(ApiError::from(sheetlink_core::CoreError::InvalidBatchSize(0)));
        }
        Ok(Self { sheets, batch_size })
    }

    /// Creates an exporter with the default batch size.
    pub fn with_default_size(sheets: SheetsClient) -> Self {
        Self {
            sheets,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Returns the batch size.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Creates a spreadsheet titled `title` holding `rows`.
    ///
    /// The header row comes from `fields` when given, otherwise from the
    /// keys of the first record. An API failure aborts the export; rows
    /// already appended stay in the spreadsheet.
    #[instrument(skip(self, rows, fields), fields(rows = rows.len()))]
    pub async fn export(
        &self,
        title: &str,
        rows: &[RowData],
        fields: Option<&FieldMap>,
    ) -> ApiResult<SpreadsheetRef> {
        let created = self.sheets.create_spreadsheet(title).await?;
        let writer = self
            .sheets
            .writer(created.spreadsheet_id.clone(), DEFAULT_SHEET_ID);
        let mut batcher = RowBatcher::new(writer, self.batch_size)?;

        if let Some(header) = header_row(rows.first(), fields) {
            batcher.add_row(header).await?;
        }
        for row in rows {
            batcher.add_row(convert_row(row, fields)).await?;
        }
        batcher.finalize().await?;

        let stats = batcher.stats();
        info!(
            spreadsheet_id = %created.spreadsheet_id,
            rows = stats.rows_written,
            flushes = stats.flushes,
            "export complete"
        );
        Ok(created)
    }

    /// Exports a JSON array of rows.
    ///
    /// Fails with `UnknownDataShape` before any API call if the value is
    /// not an array or holds nested values.
    pub async fn export_json(
        &self,
        title: &str,
        rows: Value,
        fields: Option<&FieldMap>,
    ) -> ApiResult<SpreadsheetRef> {
        let rows = RowData::many_from_json(rows)?;
        self.export(title, &rows, fields).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::ApiErrorCode;
    use crate::testing::{MOCK_SHEET_ID, MOCK_SHEET_URL, MockGoogle};

    fn exporter(mock: &MockGoogle, batch_size: usize) -> SheetExporter {
        let sheets = SheetsClient::new(reqwest::Client::new(), &mock.base, "ya29.test");
        SheetExporter::new(sheets, batch_size).unwrap()
    }

    fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[tokio::test]
    async fn exports_records_with_header() {
        let mock = MockGoogle::start().await;
        let rows = vec![
            RowData::record([("name", "Ada"), ("lang", "en")]),
            RowData::record([("name", "Linus"), ("lang", "fi")]),
        ];

        let created = exporter(&mock, 10)
            .export("People", &rows, None)
            .await
            .unwrap();
        assert_eq!(created.spreadsheet_id, MOCK_SHEET_ID);
        assert_eq!(created.spreadsheet_url, MOCK_SHEET_URL);
        assert_eq!(mock.titles(), vec!["People".to_string()]);
        assert_eq!(mock.bearer_tokens(), vec!["ya29.test".to_string()]);
        assert_eq!(
            mock.appends(),
            vec![vec![
                strings(&["name", "lang"]),
                strings(&["Ada", "en"]),
                strings(&["Linus", "fi"]),
            ]]
        );
    }

    #[tokio::test]
    async fn batches_by_threshold() {
        let mock = MockGoogle::start().await;
        let rows: Vec<RowData> = (0..5)
            .map(|i| RowData::list([i.to_string()]))
            .collect();

        exporter(&mock, 2)
            .export("Numbers", &rows, None)
            .await
            .unwrap();

        let appends = mock.appends();
        assert_eq!(appends.len(), 3);
        assert_eq!(appends.iter().map(Vec::len).collect::<Vec<_>>(), [2, 2, 1]);
        assert_eq!(appends[2], vec![strings(&["4"])]);
    }

    #[tokio::test]
    async fn field_map_orders_columns() {
        let mock = MockGoogle::start().await;
        let fields = FieldMap::new().with_field("b", "Bee").with_field("a", "Ay");
        let rows = RowData::many_from_json(json!([{"a": 1, "b": true}, ["x", "y"]])).unwrap();

        exporter(&mock, 100)
            .export("Mapped", &rows, Some(&fields))
            .await
            .unwrap();

        assert_eq!(
            mock.appends(),
            vec![vec![
                strings(&["Bee", "Ay"]),
                strings(&["TRUE", "1"]),
                strings(&["x", "y"]),
            ]]
        );
    }

    #[tokio::test]
    async fn empty_export_creates_spreadsheet_only() {
        let mock = MockGoogle::start().await;
        exporter(&mock, 3)
            .export_json("Empty", json!([]), None)
            .await
            .unwrap();
        assert_eq!(mock.titles().len(), 1);
        assert!(mock.appends().is_empty());
    }

    #[tokio::test]
    async fn unknown_shape_fails_before_any_call() {
        let mock = MockGoogle::start().await;
        let err = exporter(&mock, 3)
            .export_json("Bad", json!([{"nested": {"x": 1}}]), None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ApiErrorCode::UnknownDataShape);
        assert!(mock.titles().is_empty());
    }

    #[tokio::test]
    async fn append_failure_aborts_export() {
        let mock = MockGoogle::start().await;
        mock.fail_appends_after(1);
        let rows: Vec<RowData> = (0..6).map(|i| RowData::list([i.to_string()])).collect();

        let err = exporter(&mock, 2)
            .export("Partial", &rows, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ApiErrorCode::ExternalApiFailure);
        assert_eq!(err.status(), Some(500));
        assert_eq!(mock.appends().len(), 1);
    }

    #[tokio::test]
    async fn unauthorized_is_authentication_error() {
        let mock = MockGoogle::start().await;
        let sheets = SheetsClient::new(reqwest::Client::new(), &mock.base, "");
        let err = SheetExporter::with_default_size(sheets)
            .export("x", &[], None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ApiErrorCode::AuthenticationFailed);
        assert_eq!(err.status(), Some(401));
        assert!(err.message().contains("missing credentials"));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let sheets = SheetsClient::new(reqwest::Client::new(), "http://127.0.0.1:1", "t");
        let err = SheetExporter::new(sheets, 0).unwrap_err();
        assert_eq!(err.code(), ApiErrorCode::MissingConfiguration);
    }
}
