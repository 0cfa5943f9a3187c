//! HTTP routes.
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `GET /authorize?return_url=` | start or skip the consent redirect |
//! | `GET /callback` | OAuth redirect target |
//! | `POST /export` | create a spreadsheet, `303` to its URL |
//! | `GET /health` | liveness |

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use sheetlink_core::FieldMap;
use sheetlink_google::{
    ApiErrorCode, AuthorizeOutcome, CallbackParams, ClientFactory, GoogleConfigOverrides,
    RedirectFlow, SheetExporter,
};
use tracing::{info, instrument};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::session::SessionStore;

/// State shared by every request.
#[derive(Debug, Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    flow: RedirectFlow,
    sessions: SessionStore,
    config: ServerConfig,
    started_at: Instant,
}

impl AppState {
    /// Creates the state from a client factory and server configuration.
    pub fn new(factory: ClientFactory, config: ServerConfig) -> Self {
        let sessions = SessionStore::new(config.session_cookie.clone(), config.cache_ttl)
            .with_max_sessions(config.max_sessions);
        Self {
            inner: Arc::new(Inner {
                flow: RedirectFlow::new(factory),
                sessions,
                config,
                started_at: Instant::now(),
            }),
        }
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Returns the session store.
    pub fn sessions(&self) -> &SessionStore {
        &self.inner.sessions
    }
}

/// Builds the application router.
pub fn build_router(state: AppState) -> Router {
    let max_body = state.config().max_body_bytes;
    Router::new()
        .route("/health", get(health))
        .route("/authorize", get(authorize))
        .route("/callback", get(callback))
        .route("/export", post(export))
        .layer(DefaultBodyLimit::max(max_body))
        .with_state(state)
}

fn with_cookie(response: impl IntoResponse, cookie: Option<String>) -> Response {
    let mut response = response.into_response();
    if let Some(cookie) = cookie.and_then(|c| c.parse().ok()) {
        response.headers_mut().append(SET_COOKIE, cookie);
    }
    response
}

/// Return URLs must stay on this site.
fn is_local_path(url: &str) -> bool {
    url.starts_with('/') && !url.starts_with("//") && !url.contains('\\')
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": state.inner.started_at.elapsed().as_secs(),
        "sessions": state.sessions().len(),
    }))
}

#[derive(Debug, Deserialize)]
struct AuthorizeQuery {
    return_url: Option<String>,
}

#[instrument(skip_all)]
async fn authorize(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<AuthorizeQuery>,
) -> ServerResult<Response> {
    let return_url = query.return_url.filter(|u| !u.is_empty());
    if return_url.as_deref().is_some_and(|u| !is_local_path(u)) {
        return Err(ServerError::bad_request("return_url must be a local path"));
    }

    let (session, cookie) = state.sessions().get_or_create(&headers);
    let outcome = state
        .inner
        .flow
        .authorize(
            session.tokens(),
            &GoogleConfigOverrides::default(),
            return_url.as_deref(),
        )
        .await?;

    let target = match outcome {
        AuthorizeOutcome::Authorized { return_url } => return_url,
        AuthorizeOutcome::Redirect { url, pending } => {
            session.set_pending(pending);
            url
        }
    };
    Ok(with_cookie(Redirect::to(&target), cookie))
}

#[instrument(skip_all)]
async fn callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> ServerResult<Response> {
    let session = state.sessions().find(&headers);
    let pending = session.as_ref().and_then(|s| s.take_pending());
    let Some(session) = session else {
        return Err(ServerError::bad_request("no session for this callback"));
    };

    let result = state
        .inner
        .flow
        .callback(
            session.tokens(),
            &GoogleConfigOverrides::default(),
            pending.as_ref(),
            &params,
        )
        .await;

    match result {
        Ok(target) => {
            info!(session = %session.id(), "session authorized");
            Ok(Redirect::to(&target).into_response())
        }
        Err(err) if err.code() == ApiErrorCode::AuthenticationFailed => {
            Err(ServerError::bad_request(err.message()))
        }
        Err(err) => Err(err.into()),
    }
}

/// Body of `POST /export`.
#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    /// Spreadsheet title.
    pub title: String,
    /// Optional field to header mapping, in column order.
    #[serde(default)]
    pub fields: Option<FieldMap>,
    /// Rows to export.
    pub rows: Value,
}

#[instrument(skip_all)]
async fn export(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ExportRequest>,
) -> ServerResult<Response> {
    if request.title.trim().is_empty() {
        return Err(ServerError::bad_request("title must not be empty"));
    }
    let session = state
        .sessions()
        .find(&headers)
        .ok_or_else(|| ServerError::Api(not_authorized()))?;

    let client = state
        .inner
        .flow
        .factory()
        .build(session.tokens(), &GoogleConfigOverrides::default())
        .await?;
    if !client.is_authorized() {
        return Err(ServerError::Api(not_authorized()));
    }

    let exporter = SheetExporter::new(client.sheets()?, state.config().batch_size)?;
    let created = exporter
        .export_json(&request.title, request.rows, request.fields.as_ref())
        .await?;

    info!(
        title = %request.title,
        spreadsheet_id = %created.spreadsheet_id,
        "exported spreadsheet"
    );
    Ok((
        StatusCode::SEE_OTHER,
        [(axum::http::header::LOCATION, created.spreadsheet_url)],
    )
        .into_response())
}

fn not_authorized() -> sheetlink_google::ApiError {
    sheetlink_google::ApiError::not_authorized("not authorized, visit /authorize first")
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use axum::body::Body;
    use axum::extract::Path;
    use axum::http::Request;
    use axum::http::header::{COOKIE, LOCATION};

    use sheetlink_google::{GoogleConfig, GoogleEndpoints, OAuthCredentials, Token, TokenStore};
    use tower::ServiceExt;

    use super::*;

    const SHEET_URL: &str = "https://docs.example.com/spreadsheets/d/s1/edit";

    type Appends = Arc<Mutex<Vec<Value>>>;

    /// Starts a stand-in for the token and Sheets endpoints.
    async fn start_google() -> (String, Appends) {
        let appends: Appends = Arc::default();
        let app = Router::new()
            .route(
                "/token",
                post(|| async {
                    Json(json!({
                        "access_token": "ya29.session",
                        "expires_in": 3599,
                        "refresh_token": "1//r"
                    }))
                }),
            )
            .route(
                "/v4/spreadsheets",
                post(|| async {
                    Json(json!({"spreadsheetId": "s1", "spreadsheetUrl": SHEET_URL}))
                }),
            )
            .route(
                "/v4/spreadsheets/{target}",
                post(
                    |State(appends): State<Appends>,
                     Path(_target): Path<String>,
                     Json(body): Json<Value>| async move {
                        appends.lock().unwrap().push(body);
                        Json(json!({}))
                    },
                ),
            )
            .with_state(appends.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), appends)
    }

    fn test_state(base: &str) -> AppState {
        test_state_with(base, ServerConfig::default().with_batch_size(2))
    }

    fn test_state_with(base: &str, config: ServerConfig) -> AppState {
        let google = GoogleConfig::new(OAuthCredentials::new(
            "test-client.apps.googleusercontent.com",
            "test-secret",
        ))
        .with_redirect_uri("http://localhost:8080/callback")
        .with_endpoints(GoogleEndpoints::with_base(base));
        AppState::new(ClientFactory::new(google), config)
    }

    fn unix_now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
    }

    fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn location(response: &Response) -> String {
        response.headers()[LOCATION].to_str().unwrap().to_string()
    }

    fn session_cookie(response: &Response) -> String {
        let raw = response.headers()[SET_COOKIE].to_str().unwrap();
        raw.split(';').next().unwrap().to_string()
    }

    fn state_param(url: &str) -> String {
        url.split('&')
            .find_map(|pair| pair.strip_prefix("state="))
            .unwrap()
            .to_string()
    }

    async fn json_body(response: Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    /// Runs authorize + callback and returns the session cookie.
    async fn authorized_cookie(app: &Router) -> String {
        let response = app
            .clone()
            .oneshot(get("/authorize", None))
            .await
            .unwrap();
        let cookie = session_cookie(&response);
        let state = state_param(&location(&response));

        let response = app
            .clone()
            .oneshot(get(
                &format!("/callback?code=c&state={state}"),
                Some(&cookie),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        cookie
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let app = build_router(test_state("http://127.0.0.1:1"));
        let response = app.oneshot(get("/health", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["sessions"], 0);
    }

    #[tokio::test]
    async fn authorize_redirects_to_consent() {
        let (base, _) = start_google().await;
        let app = build_router(test_state(&base));

        let response = app
            .oneshot(get("/authorize?return_url=/done", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert!(location(&response).starts_with(&format!("{base}/auth?")));
        assert!(session_cookie(&response).starts_with("sheetlink_session="));
    }

    #[tokio::test]
    async fn cookieless_requests_do_not_pile_up_sessions() {
        let config = ServerConfig::default().with_cache_ttl(Duration::from_millis(1));
        let state = test_state_with("http://127.0.0.1:1", config);
        let app = build_router(state.clone());

        for _ in 0..500 {
            let response = app.clone().oneshot(get("/authorize", None)).await.unwrap();
            assert_eq!(response.status(), StatusCode::SEE_OTHER);
        }
        std::thread::sleep(Duration::from_millis(20));
        app.oneshot(get("/authorize", None)).await.unwrap();
        assert_eq!(state.sessions().len(), 1);
    }

    #[tokio::test]
    async fn session_cap_bounds_sessions() {
        let config = ServerConfig::default().with_max_sessions(10);
        let state = test_state_with("http://127.0.0.1:1", config);
        let app = build_router(state.clone());

        for _ in 0..50 {
            app.clone().oneshot(get("/authorize", None)).await.unwrap();
        }
        assert_eq!(state.sessions().len(), 10);
    }

    #[tokio::test]
    async fn expired_access_token_is_refreshed_in_session() {
        let (base, _) = start_google().await;
        let state = test_state(&base);
        let app = build_router(state.clone());

        let response = app.clone().oneshot(get("/authorize", None)).await.unwrap();
        let cookie = session_cookie(&response);
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, cookie.parse().unwrap());
        let session = state.sessions().find(&headers).unwrap();
        let key = state.inner.flow.factory().defaults().token_key();
        let stale = Token::new("ya29.old", 3600)
            .with_created(unix_now() - 7200)
            .with_refresh_token("1//r");
        session.tokens().put(&key, stale).unwrap();

        let response = app
            .oneshot(get("/authorize?return_url=/done", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(location(&response), "/done");
        assert_eq!(session.tokens().get(&key).unwrap().access_token, "ya29.session");
    }

    #[tokio::test]
    async fn authorize_rejects_external_return_url() {
        let app = build_router(test_state("http://127.0.0.1:1"));
        let response = app
            .oneshot(get("/authorize?return_url=https://evil.example.com", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn callback_completes_and_redirects_to_return_url() {
        let (base, _) = start_google().await;
        let app = build_router(test_state(&base));

        let response = app
            .clone()
            .oneshot(get("/authorize?return_url=/reports", None))
            .await
            .unwrap();
        let cookie = session_cookie(&response);
        let state = state_param(&location(&response));

        let response = app
            .clone()
            .oneshot(get(
                &format!("/callback?code=abc&state={state}"),
                Some(&cookie),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/reports");

        // Authorized now: authorize goes straight to the return URL.
        let response = app
            .oneshot(get("/authorize?return_url=/again", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(location(&response), "/again");
    }

    #[tokio::test]
    async fn callback_with_wrong_state_is_400() {
        let (base, _) = start_google().await;
        let app = build_router(test_state(&base));

        let response = app
            .clone()
            .oneshot(get("/authorize", None))
            .await
            .unwrap();
        let cookie = session_cookie(&response);

        let response = app
            .oneshot(get("/callback?code=abc&state=forged", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "bad_request");
    }

    #[tokio::test]
    async fn callback_with_provider_error_is_400() {
        let (base, _) = start_google().await;
        let app = build_router(test_state(&base));
        let response = app
            .clone()
            .oneshot(get("/authorize", None))
            .await
            .unwrap();
        let cookie = session_cookie(&response);
        let state = state_param(&location(&response));

        let response = app
            .oneshot(get(
                &format!("/callback?error=access_denied&state={state}"),
                Some(&cookie),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn export_requires_authorization() {
        let app = build_router(test_state("http://127.0.0.1:1"));
        let response = app
            .oneshot(
                Request::post("/export")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"title":"T","rows":[]}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn export_redirects_to_spreadsheet() {
        let (base, appends) = start_google().await;
        let app = build_router(test_state(&base));
        let cookie = authorized_cookie(&app).await;

        let body = json!({
            "title": "Report",
            "fields": {"name": "Name", "age": "Age"},
            "rows": [{"name": "Ada", "age": 36}, {"name": "Alan", "age": 41}]
        });
        let response = app
            .oneshot(
                Request::post("/export")
                    .header("content-type", "application/json")
                    .header(COOKIE, &cookie)
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), SHEET_URL);

        // Header + 2 rows with a batch size of 2.
        let appends = appends.lock().unwrap();
        assert_eq!(appends.len(), 2);
        let first = &appends[0]["requests"][0]["appendCells"]["rows"];
        assert_eq!(first[0]["values"][0]["userEnteredValue"]["stringValue"], "Name");
        assert_eq!(first[1]["values"][1]["userEnteredValue"]["stringValue"], "36");
    }

    #[tokio::test]
    async fn export_unknown_shape_is_422() {
        let (base, _) = start_google().await;
        let app = build_router(test_state(&base));
        let cookie = authorized_cookie(&app).await;

        let response = app
            .oneshot(
                Request::post("/export")
                    .header("content-type", "application/json")
                    .header(COOKIE, &cookie)
                    .body(Body::from(r#"{"title":"T","rows":"not a list"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json_body(response).await["error"], "unknown_data_shape");
    }

    #[test]
    fn local_paths_only() {
        assert!(is_local_path("/"));
        assert!(is_local_path("/reports?id=1"));
        assert!(!is_local_path("//evil.example.com"));
        assert!(!is_local_path("https://evil.example.com"));
        assert!(!is_local_path("/\\evil"));
    }
}
