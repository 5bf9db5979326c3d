//! Local stand-ins for the metadata service, completion and OCR APIs and the
//! Telegram Bot API, served by one axum router on a random port.

#![allow(dead_code)]

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use cheatsheet::config::{CompletionConfig, Settings};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

pub const BOT_TOKEN: &str = "test-token";
pub const IAM_TOKEN: &str = "t1.iam-test";
pub const PNG: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// What the fake services answer and what they saw.
pub struct Mock {
    pub metadata_status: StatusCode,
    pub completion_status: StatusCode,
    pub completion_answers: Vec<String>,
    pub ocr_lines: Vec<String>,
    pub file_bytes: Vec<u8>,
    pub sent: Mutex<Vec<Value>>,
    pub completion_requests: Mutex<Vec<(Option<String>, Value)>>,
    pub ocr_requests: Mutex<Vec<(HeaderMap, Value)>>,
    pub metadata_calls: Mutex<usize>,
}

impl Default for Mock {
    fn default() -> Self {
        Self {
            metadata_status: StatusCode::OK,
            completion_status: StatusCode::OK,
            completion_answers: vec!["Because arithmetic.".to_string()],
            ocr_lines: vec!["2+2=4".to_string()],
            file_bytes: PNG.to_vec(),
            sent: Mutex::new(Vec::new()),
            completion_requests: Mutex::new(Vec::new()),
            ocr_requests: Mutex::new(Vec::new()),
            metadata_calls: Mutex::new(0),
        }
    }
}

impl Mock {
    pub fn sent_texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .expect("sent lock")
            .iter()
            .filter_map(|v| v.get("text").and_then(|t| t.as_str()).map(str::to_string))
            .collect()
    }

    pub fn metadata_calls(&self) -> usize {
        *self.metadata_calls.lock().expect("metadata lock")
    }
}

async fn metadata_token(State(mock): State<Arc<Mock>>, headers: HeaderMap) -> impl IntoResponse {
    *mock.metadata_calls.lock().expect("metadata lock") += 1;
    if headers.get("Metadata-Flavor").and_then(|v| v.to_str().ok()) != Some("Google") {
        return (StatusCode::FORBIDDEN, Json(json!({}))).into_response();
    }
    if mock.metadata_status != StatusCode::OK {
        return (mock.metadata_status, "no token").into_response();
    }
    Json(json!({ "access_token": IAM_TOKEN, "expires_in": 43200, "token_type": "Bearer" }))
        .into_response()
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn completion(
    State(mock): State<Arc<Mock>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    mock.completion_requests
        .lock()
        .expect("completion lock")
        .push((bearer(&headers), body));
    if mock.completion_status != StatusCode::OK {
        return (mock.completion_status, "model unavailable").into_response();
    }
    let alternatives: Vec<Value> = mock
        .completion_answers
        .iter()
        .map(|a| json!({ "message": { "role": "assistant", "text": a }, "status": "ALTERNATIVE_STATUS_FINAL" }))
        .collect();
    Json(json!({ "result": { "alternatives": alternatives, "modelVersion": "test" } })).into_response()
}

async fn ocr(State(mock): State<Arc<Mock>>, headers: HeaderMap, Json(body): Json<Value>) -> impl IntoResponse {
    mock.ocr_requests
        .lock()
        .expect("ocr lock")
        .push((headers, body));
    let lines: Vec<Value> = mock.ocr_lines.iter().map(|l| json!({ "text": l })).collect();
    Json(json!({ "result": { "textAnnotation": { "blocks": [{ "lines": lines }] }, "page": "0" } }))
}

async fn get_file(Query(q): Query<HashMap<String, String>>) -> impl IntoResponse {
    match q.get("file_id").map(String::as_str) {
        Some("missing") => Json(json!({ "ok": false, "description": "file not found" })),
        Some(id) => Json(json!({ "ok": true, "result": { "file_id": id, "file_path": "photos/file_0.png" } })),
        None => Json(json!({ "ok": false })),
    }
}

async fn file_download(State(mock): State<Arc<Mock>>) -> impl IntoResponse {
    Bytes::from(mock.file_bytes.clone())
}

async fn send_message(State(mock): State<Arc<Mock>>, Json(body): Json<Value>) -> impl IntoResponse {
    let unknown_chat = body.get("chat_id").and_then(|v| v.as_i64()) == Some(-1);
    mock.sent.lock().expect("sent lock").push(body);
    if unknown_chat {
        return (StatusCode::BAD_REQUEST, Json(json!({ "ok": false }))).into_response();
    }
    Json(json!({ "ok": true, "result": {} })).into_response()
}

/// Serve the fake services; returns their base URL ("http://127.0.0.1:PORT").
pub async fn spawn_mock(mock: Arc<Mock>) -> String {
    let app = Router::new()
        .route(
            "/computeMetadata/v1/instance/service-accounts/default/token",
            get(metadata_token),
        )
        .route("/completion", post(completion))
        .route("/ocr", post(ocr))
        .route(&format!("/bot{}/getFile", BOT_TOKEN), get(get_file))
        .route(&format!("/file/bot{}/photos/file_0.png", BOT_TOKEN), get(file_download))
        .route(&format!("/bot{}/sendMessage", BOT_TOKEN), post(send_message))
        .with_state(mock);
    spawn_router(app).await
}

pub async fn spawn_router(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock listener");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{}", addr)
}

pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

/// Settings pointing every client at the mock base URL.
pub fn settings(base: &str) -> Settings {
    Settings {
        bind: "127.0.0.1".to_string(),
        port: free_port(),
        folder_id: "b1g-test".to_string(),
        metadata_addr: base.trim_start_matches("http://").to_string(),
        completion_url: format!("{}/completion", base),
        ocr_url: format!("{}/ocr", base),
        completion: CompletionConfig::default(),
        prompt_path: PathBuf::from("prompt.txt"),
        system_prompt: "You help with operating systems exams.".to_string(),
        bot_token: BOT_TOKEN.to_string(),
        webhook_secret: None,
        telegram_api_base: base.to_string(),
    }
}
