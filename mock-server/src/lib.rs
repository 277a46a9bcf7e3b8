use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::debug;

pub const NEARBY_PHOTOS_PATH: &str = "/1.0/list/nearby-photos/";
pub const SEQUENCE_PHOTO_LIST_PATH: &str = "/1.0/sequence/photo-list/";
pub const TRACKS_PATH: &str = "/tracks";

/// Canned data the mock API serves. Also loadable from a JSON document
/// with the same field names.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Fixtures {
    /// Items returned by the nearby-photos endpoint.
    pub nearby_photos: Vec<Value>,
    /// `osv` objects by sequence id.
    pub sequences: HashMap<u64, Value>,
    /// Track items, sliced into pages by `page` / `ipp`.
    pub tracks: Vec<Value>,
    /// Every page after the first also repeats this many items of the
    /// page before it.
    pub track_page_overlap: usize,
    /// This track page answers with HTTP 500 and an error envelope.
    pub failing_track_page: Option<u32>,
    /// When set, every JSON endpoint answers with this error status.
    pub error_status: Option<(u16, String)>,
    /// Files served under `/files/`.
    pub files: HashMap<String, Vec<u8>>,
}

/// One request as the mock API saw it.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedRequest {
    pub path: String,
    pub user_agent: Option<String>,
    pub form: HashMap<String, String>,
}

pub type RequestLog = Arc<Mutex<Vec<RecordedRequest>>>;

#[derive(Clone)]
struct AppState {
    fixtures: Arc<Fixtures>,
    log: RequestLog,
}

impl AppState {
    fn record(&self, path: &str, headers: &HeaderMap, form: HashMap<String, String>) {
        debug!(path, ?form, "request");
        let user_agent = headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if let Ok(mut log) = self.log.lock() {
            log.push(RecordedRequest {
                path: path.to_string(),
                user_agent,
                form,
            });
        }
    }
}

pub fn app(fixtures: Fixtures) -> Router {
    app_with_log(fixtures).0
}

/// Router plus a handle on the log of requests it receives.
pub fn app_with_log(fixtures: Fixtures) -> (Router, RequestLog) {
    let log = RequestLog::default();
    let state = AppState {
        fixtures: Arc::new(fixtures),
        log: log.clone(),
    };
    let router = Router::new()
        .route(NEARBY_PHOTOS_PATH, post(nearby_photos))
        .route(SEQUENCE_PHOTO_LIST_PATH, post(sequence_photo_list))
        .route(TRACKS_PATH, post(tracks))
        .route("/files/{*path}", get(file))
        .with_state(state);
    (router, log)
}

pub async fn run(listener: TcpListener, fixtures: Fixtures) -> Result<(), std::io::Error> {
    serve(listener, app(fixtures)).await
}

/// Serve an already-built router, e.g. one from `app_with_log`.
pub async fn serve(listener: TcpListener, router: Router) -> Result<(), std::io::Error> {
    axum::serve(listener, router).await
}

/// A small data set: one sequence of three photos near Cluj-Napoca, the
/// photos it contains, and five matched tracks.
pub fn demo_fixtures() -> Fixtures {
    let photos: Vec<Value> = (0..3u32)
        .map(|index| {
            json!({
                "id": (1000 + index).to_string(),
                "sequence_id": "77",
                "sequence_index": index.to_string(),
                "lat": format!("{}", 46.7712 + f64::from(index) * 0.0001),
                "lng": "23.6236",
                "heading": "90.0",
                "name": format!("files/77/{index}.jpg"),
                "th_name": format!("files/77/th_{index}.jpg"),
                "username": "demo",
                "timestamp": "1489050000",
            })
        })
        .collect();
    let sequence_photos: Vec<Value> = photos
        .iter()
        .map(|photo| {
            let mut photo = photo.clone();
            if let Some(object) = photo.as_object_mut() {
                object.remove("username");
                object.remove("sequence_id");
            }
            photo
        })
        .collect();
    let tracks = (0..5u32)
        .map(|i| {
            let lat = 46.77 + f64::from(i) * 0.001;
            json!({
                "id": format!("way-{i}"),
                "track": [[lat, 23.62], [lat + 0.0005, 23.625]],
                "coverage": (i % 3 + 1).to_string(),
            })
        })
        .collect();
    let files = (0..3u32)
        .map(|index| (format!("77/{index}.jpg"), vec![0xff, 0xd8, 0xff, index as u8]))
        .collect();
    Fixtures {
        nearby_photos: photos,
        sequences: HashMap::from([(77, json!({ "id": "77", "photos": sequence_photos }))]),
        tracks,
        files,
        ..Fixtures::default()
    }
}

fn status(code: u16, message: &str) -> Value {
    let api_code = if code < 400 { "600" } else { "690" };
    let http_message = StatusCode::from_u16(code)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("");
    json!({
        "apiCode": api_code,
        "apiMessage": message,
        "httpCode": code,
        "httpMessage": http_message,
    })
}

fn ok_status() -> Value {
    status(200, "The request has been processed without incidents")
}

fn error_response(code: u16, message: &str) -> Response {
    let http = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (http, Json(json!({ "status": status(code, message) }))).into_response()
}

fn form_number<T: std::str::FromStr>(form: &HashMap<String, String>, key: &str) -> Option<T> {
    form.get(key).and_then(|v| v.parse().ok())
}

async fn nearby_photos(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state.record(NEARBY_PHOTOS_PATH, &headers, form);
    if let Some((code, message)) = &state.fixtures.error_status {
        return error_response(*code, message);
    }
    let items = &state.fixtures.nearby_photos;
    Json(json!({
        "status": ok_status(),
        "currentPageItems": items,
        "totalItems": items.len(),
    }))
    .into_response()
}

async fn sequence_photo_list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let id: Option<u64> = form_number(&form, "sequenceId");
    state.record(SEQUENCE_PHOTO_LIST_PATH, &headers, form);
    if let Some((code, message)) = &state.fixtures.error_status {
        return error_response(*code, message);
    }
    let Some(id) = id else {
        return error_response(400, "Invalid or missing sequenceId");
    };
    match state.fixtures.sequences.get(&id) {
        Some(osv) => Json(json!({ "status": ok_status(), "osv": osv })).into_response(),
        None => Json(json!({ "status": ok_status() })).into_response(),
    }
}

async fn tracks(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let page = form_number::<usize>(&form, "page").unwrap_or(1).max(1);
    let ipp = form_number::<usize>(&form, "ipp").unwrap_or(1000).max(1);
    state.record(TRACKS_PATH, &headers, form);
    let fixtures = &state.fixtures;
    if let Some((code, message)) = &fixtures.error_status {
        return error_response(*code, message);
    }
    if fixtures.failing_track_page.map(|p| p as usize) == Some(page) {
        return error_response(500, &format!("page {page} is unavailable"));
    }

    let total = fixtures.tracks.len();
    let mut start = (page - 1).saturating_mul(ipp).min(total);
    if page > 1 {
        start = start.saturating_sub(fixtures.track_page_overlap);
    }
    let end = page.saturating_mul(ipp).min(total);
    Json(json!({
        "status": ok_status(),
        "currentPageItems": &fixtures.tracks[start..end],
        "totalItems": total,
    }))
    .into_response()
}

async fn file(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(path): Path<String>,
) -> Response {
    state.record(&format!("/files/{path}"), &headers, HashMap::new());
    match state.fixtures.files.get(&path) {
        Some(bytes) => ([(header::CONTENT_TYPE, "image/jpeg")], bytes.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
