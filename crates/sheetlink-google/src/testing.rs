//! Local stand-in for Google's token and Sheets endpoints.

use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use serde_json::{Value, json};

use crate::config::{GoogleConfig, GoogleEndpoints, OAuthCredentials};

pub(crate) const MOCK_SHEET_ID: &str = "mock-sheet";
pub(crate) const MOCK_SHEET_URL: &str = "https://docs.example.com/spreadsheets/d/mock-sheet/edit";

#[derive(Debug)]
struct Inner {
    token_reply: (StatusCode, String),
    token_requests: Vec<String>,
    titles: Vec<String>,
    bearer: Vec<String>,
    appends: Vec<Vec<Vec<String>>>,
    fail_appends_after: Option<usize>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            token_reply: (
                StatusCode::OK,
                r#"{"access_token":"ya29.mock","expires_in":3599,"token_type":"Bearer"}"#
                    .to_string(),
            ),
            token_requests: Vec::new(),
            titles: Vec::new(),
            bearer: Vec::new(),
            appends: Vec::new(),
            fail_appends_after: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MockGoogle {
    pub(crate) base: String,
    inner: Arc<Mutex<Inner>>,
}

impl MockGoogle {
    pub(crate) async fn start() -> Self {
        let mut mock = Self::default();
        let app = Router::new()
            .route("/token", post(token))
            .route("/v4/spreadsheets", post(create))
            .route("/v4/spreadsheets/{target}", post(batch_update))
            .with_state(mock.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        mock.base = format!("http://{addr}");
        mock
    }

    pub(crate) fn config(&self) -> GoogleConfig {
        GoogleConfig::new(OAuthCredentials::new(
            "test-client.apps.googleusercontent.com",
            "test-secret",
        ))
        .with_endpoints(GoogleEndpoints::with_base(&self.base))
    }

    pub(crate) fn reply_token(&self, status: StatusCode, body: &str) {
        self.inner.lock().unwrap().token_reply = (status, body.to_string());
    }

    pub(crate) fn fail_appends_after(&self, successes: usize) {
        self.inner.lock().unwrap().fail_appends_after = Some(successes);
    }

    pub(crate) fn token_requests(&self) -> Vec<String> {
        self.inner.lock().unwrap().token_requests.clone()
    }

    pub(crate) fn titles(&self) -> Vec<String> {
        self.inner.lock().unwrap().titles.clone()
    }

    pub(crate) fn bearer_tokens(&self) -> Vec<String> {
        self.inner.lock().unwrap().bearer.clone()
    }

    pub(crate) fn appends(&self) -> Vec<Vec<Vec<String>>> {
        self.inner.lock().unwrap().appends.clone()
    }
}

fn bearer(headers: &HeaderMap) -> String {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default()
        .to_string()
}

async fn token(State(mock): State<MockGoogle>, body: String) -> Response {
    let mut inner = mock.inner.lock().unwrap();
    inner.token_requests.push(body);
    let (status, reply) = inner.token_reply.clone();
    (status, reply).into_response()
}

async fn create(
    State(mock): State<MockGoogle>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<Value>,
) -> Response {
    let mut inner = mock.inner.lock().unwrap();
    inner.bearer.push(bearer(&headers));
    if bearer(&headers).is_empty() {
        return (StatusCode::UNAUTHORIZED, "missing credentials").into_response();
    }
    let title = body["properties"]["title"].as_str().unwrap_or_default();
    inner.titles.push(title.to_string());
    axum::Json(json!({
        "spreadsheetId": MOCK_SHEET_ID,
        "spreadsheetUrl": MOCK_SHEET_URL,
        "properties": {"title": title}
    }))
    .into_response()
}

async fn batch_update(
    State(mock): State<MockGoogle>,
    Path(target): Path<String>,
    axum::Json(body): axum::Json<Value>,
) -> Response {
    if target != format!("{MOCK_SHEET_ID}:batchUpdate") {
        return (StatusCode::NOT_FOUND, "unknown spreadsheet").into_response();
    }

    let mut inner = mock.inner.lock().unwrap();
    if inner
        .fail_appends_after
        .is_some_and(|n| inner.appends.len() >= n)
    {
        return (StatusCode::INTERNAL_SERVER_ERROR, "backend error").into_response();
    }

    let append = &body["requests"][0]["appendCells"];
    assert_eq!(append["sheetId"], 0);
    assert_eq!(append["fields"], "userEnteredValue");
    let rows = append["rows"]
        .as_array()
        .map(|rows| {
            rows.iter()
                .map(|row| {
                    row["values"]
                        .as_array()
                        .map(|cells| {
                            cells
                                .iter()
                                .map(|c| {
                                    c["userEnteredValue"]["stringValue"]
                                        .as_str()
                                        .unwrap_or_default()
                                        .to_string()
                                })
                                .collect()
                        })
                        .unwrap_or_default()
                })
                .collect()
        })
        .unwrap_or_default();
    inner.appends.push(rows);
    axum::Json(json!({"spreadsheetId": MOCK_SHEET_ID, "replies": [{}]})).into_response()
}
