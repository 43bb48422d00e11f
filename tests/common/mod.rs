//! Shared fixtures: an in-process Calendar API double and a scripted identity provider
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use gcal_mcp_server_rust::calendar::client::CalendarClient;
use gcal_mcp_server_rust::calendar::credentials::{
    Credential, CredentialManager, CredentialStore, IdentityProvider,
};
use gcal_mcp_server_rust::config::Config;
use gcal_mcp_server_rust::error::Result;

pub const ACCESS_TOKEN: &str = "test-access-token";
pub const SCOPE: &str = "https://www.googleapis.com/auth/calendar";

/// Events returned per list page, small enough to exercise pagination
pub const PAGE_SIZE: usize = 2;

#[derive(Default)]
pub struct MockCalendar {
    pub events: Vec<Value>,
    pub next_id: usize,
    pub list_requests: usize,
    pub patches: Vec<Value>,
    pub reject_tokens: bool,
    /// Answer every list page with the same continuation token
    pub stuck_page_token: bool,
}

pub type MockState = Arc<Mutex<MockCalendar>>;

fn google_error(status: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
    (
        status,
        Json(json!({
            "error": {"code": status.as_u16(), "message": message, "errors": []}
        })),
    )
}

fn authorized(state: &MockState, headers: &HeaderMap) -> bool {
    if state.lock().unwrap().reject_tokens {
        return false;
    }
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map_or(false, |v| v == format!("Bearer {}", ACCESS_TOKEN))
}

/// Start or end of a stored event as an instant; all-day dates are midnight UTC
pub fn boundary(event: &Value, key: &str) -> Option<DateTime<Utc>> {
    let value = &event[key];
    if let Some(dt) = value["dateTime"].as_str() {
        return DateTime::parse_from_rfc3339(dt).ok().map(|d| d.with_timezone(&Utc));
    }
    value["date"]
        .as_str()
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
}

async fn list_events(
    State(state): State<MockState>,
    Path(_calendar): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    if !authorized(&state, &headers) {
        return google_error(StatusCode::UNAUTHORIZED, "Invalid Credentials");
    }

    let parse = |key: &str| {
        query
            .get(key)
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|d| d.with_timezone(&Utc))
    };
    let (Some(time_min), Some(time_max)) = (parse("timeMin"), parse("timeMax")) else {
        return google_error(StatusCode::BAD_REQUEST, "Missing time bounds");
    };

    let mut guard = state.lock().unwrap();
    guard.list_requests += 1;

    let mut matching: Vec<Value> = guard
        .events
        .iter()
        .filter(|e| match (boundary(e, "start"), boundary(e, "end")) {
            (Some(start), Some(end)) => start < time_max && end > time_min,
            _ => false,
        })
        .cloned()
        .collect();
    matching.sort_by_key(|e| boundary(e, "start"));

    let offset: usize = query
        .get("pageToken")
        .and_then(|t| t.parse().ok())
        .unwrap_or(0);
    let page: Vec<Value> = matching.iter().skip(offset).take(PAGE_SIZE).cloned().collect();

    let mut body = json!({"kind": "calendar#events", "items": page});
    if guard.stuck_page_token {
        body["nextPageToken"] = json!("stuck");
    } else if offset + PAGE_SIZE < matching.len() {
        body["nextPageToken"] = json!((offset + PAGE_SIZE).to_string());
    }
    (StatusCode::OK, Json(body))
}

async fn insert_event(
    State(state): State<MockState>,
    Path(_calendar): Path<String>,
    headers: HeaderMap,
    Json(mut body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !authorized(&state, &headers) {
        return google_error(StatusCode::UNAUTHORIZED, "Invalid Credentials");
    }
    if body["summary"].as_str().is_none() {
        return google_error(StatusCode::BAD_REQUEST, "Missing summary");
    }

    let mut guard = state.lock().unwrap();
    guard.next_id += 1;
    let id = format!("evt{}", guard.next_id);
    body["id"] = json!(id);
    body["status"] = json!("confirmed");
    body["htmlLink"] = json!(format!("https://calendar.google.com/event?eid={}", id));
    guard.events.push(body.clone());
    (StatusCode::OK, Json(body))
}

async fn get_event(
    State(state): State<MockState>,
    Path((_calendar, event_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    if !authorized(&state, &headers) {
        return google_error(StatusCode::UNAUTHORIZED, "Invalid Credentials");
    }
    let guard = state.lock().unwrap();
    match guard.events.iter().find(|e| e["id"] == event_id) {
        Some(event) => (StatusCode::OK, Json(event.clone())),
        None => google_error(StatusCode::NOT_FOUND, "Not Found"),
    }
}

async fn patch_event(
    State(state): State<MockState>,
    Path((_calendar, event_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !authorized(&state, &headers) {
        return google_error(StatusCode::UNAUTHORIZED, "Invalid Credentials");
    }
    let mut guard = state.lock().unwrap();
    guard.patches.push(body.clone());
    let Some(event) = guard.events.iter_mut().find(|e| e["id"] == event_id) else {
        return google_error(StatusCode::NOT_FOUND, "Not Found");
    };
    if let (Some(target), Some(changes)) = (event.as_object_mut(), body.as_object()) {
        for (key, value) in changes {
            target.insert(key.clone(), value.clone());
        }
    }
    (StatusCode::OK, Json(event.clone()))
}

/// Serve the Calendar API double on an ephemeral port, returning its base URL
pub async fn spawn_mock_calendar(state: MockState) -> String {
    let app = Router::new()
        .route("/calendars/:calendar_id/events", get(list_events).post(insert_event))
        .route(
            "/calendars/:calendar_id/events/:event_id",
            get(get_event).patch(patch_event),
        )
        .with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Identity provider that hands out the token the mock API accepts
#[derive(Default)]
pub struct FakeProvider {
    pub refreshes: AtomicUsize,
    pub authorizations: AtomicUsize,
    pub deny: AtomicBool,
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    async fn refresh(&self, _credential: &Credential) -> Result<Credential> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(Credential::new(ACCESS_TOKEN, None, Some(3600), Vec::new()))
    }

    async fn authorize(&self, scopes: &[String]) -> Result<Credential> {
        self.authorizations.fetch_add(1, Ordering::SeqCst);
        if self.deny.load(Ordering::SeqCst) {
            return Err(gcal_mcp_server_rust::error::AuthError::AuthorizationDenied {
                reason: "access_denied".to_string(),
            }
            .into());
        }
        Ok(Credential::new(
            ACCESS_TOKEN,
            Some("refresh".to_string()),
            Some(3600),
            scopes.to_vec(),
        ))
    }
}

pub struct TestContext {
    pub client: Arc<CalendarClient>,
    pub provider: Arc<FakeProvider>,
    pub state: MockState,
    pub config: Config,
    _dir: tempfile::TempDir,
}

impl TestContext {
    pub fn provider_calls(&self) -> (usize, usize) {
        (
            self.provider.refreshes.load(Ordering::SeqCst),
            self.provider.authorizations.load(Ordering::SeqCst),
        )
    }

    pub fn store(&self) -> CredentialStore {
        CredentialStore::new(&self.config.token_path)
    }

    /// Insert an event straight into the API double
    pub fn seed_event(&self, id: &str, summary: &str, start: &str, end: &str) {
        let mut guard = self.state.lock().unwrap();
        guard.events.push(json!({
            "id": id,
            "summary": summary,
            "start": {"dateTime": start, "timeZone": "UTC"},
            "end": {"dateTime": end, "timeZone": "UTC"},
            "htmlLink": format!("https://calendar.google.com/event?eid={}", id),
            "status": "confirmed"
        }));
    }
}

/// Client wired to the API double, with a valid stored token
pub async fn setup() -> TestContext {
    setup_with(Some(Credential::new(
        ACCESS_TOKEN,
        Some("refresh".to_string()),
        Some(3600),
        vec![SCOPE.to_string()],
    )))
    .await
}

pub async fn setup_with(stored: Option<Credential>) -> TestContext {
    let dir = tempfile::tempdir().unwrap();
    let state: MockState = Arc::new(Mutex::new(MockCalendar::default()));
    let base_url = spawn_mock_calendar(state.clone()).await;

    let mut config = Config::from_dir(dir.path());
    config.api_base_url = base_url;

    let store = CredentialStore::new(&config.token_path);
    if let Some(credential) = stored {
        store.save(&credential).await.unwrap();
    }

    let provider = Arc::new(FakeProvider::default());
    let manager = Arc::new(CredentialManager::new(store, provider.clone()));
    let client = Arc::new(CalendarClient::new(manager, &config));

    TestContext {
        client,
        provider,
        state,
        config,
        _dir: dir,
    }
}
