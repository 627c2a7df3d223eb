//! Fake backend speaking the same routes and JSON shapes as the real service.

#![allow(dead_code)]

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One multipart field as the backend saw it.
#[derive(Debug, Clone)]
pub struct Received {
    pub field: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// How `POST /upload` answers.
#[derive(Debug, Clone)]
pub enum UploadReply {
    /// Newer schema with a nested `analysis` object.
    WithAnalysis,
    /// Older schema: file name and path only.
    Legacy,
    /// Non-success status, optionally with a `{"error": ...}` body.
    Error(StatusCode, Option<&'static str>),
    /// 200 with a body that is not JSON.
    Malformed,
    /// Legacy reply after a delay.
    Slow(Duration),
}

#[derive(Clone)]
struct BackendState {
    reply: UploadReply,
    received: Arc<Mutex<Vec<Received>>>,
}

pub struct Backend {
    pub addr: SocketAddr,
    received: Arc<Mutex<Vec<Received>>>,
}

impl Backend {
    pub async fn start(reply: UploadReply) -> Self {
        let received = Arc::new(Mutex::new(Vec::new()));
        let state = BackendState {
            reply,
            received: received.clone(),
        };
        let app = Router::new()
            .route("/", get(home))
            .route("/upload", post(upload))
            .route("/simplify", post(simplify))
            .route("/generate-audiobook", post(generate_audiobook))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { addr, received }
    }

    /// Origin of a port nothing listens on.
    pub async fn unreachable_url() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}")
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn received(&self) -> Vec<Received> {
        self.received.lock().unwrap().clone()
    }
}

/// The real service converts every upload to PDF and names it after the original.
fn stored_name(original: &str) -> String {
    let stem = Path::new(original)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    format!("{stem}.pdf")
}

async fn home() -> Json<Value> {
    Json(json!({"message": "Welcome to the Children's Audiobook System!"}))
}

async fn upload(State(state): State<BackendState>, mut multipart: Multipart) -> Response {
    let mut original = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
        if name == "file" {
            original = file_name.clone();
        }
        state.received.lock().unwrap().push(Received {
            field: name,
            file_name,
            content_type,
            bytes,
        });
    }

    let Some(original) = original else {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "No file uploaded"}))).into_response();
    };
    let filename = stored_name(&original);

    match state.reply {
        UploadReply::WithAnalysis => Json(json!({
            "status": "success",
            "message": "File uploaded and analyzed",
            "file_path": format!("uploads/{filename}"),
            "filename": filename,
            "analysis": {
                "status": "success",
                "target_age_group": "5-8",
                "simplified_text": "The fox met the owl.",
                "characters": [
                    {"name": "Fox", "dialogue_count": 4, "first_appearance": 1, "sample_dialogue": "Who goes there?"},
                    {"name": "Owl", "dialogue_count": 2, "first_appearance": 3, "sample_dialogue": "Hoo!"}
                ]
            }
        }))
        .into_response(),
        UploadReply::Legacy => legacy(&filename),
        UploadReply::Slow(delay) => {
            tokio::time::sleep(delay).await;
            legacy(&filename)
        }
        UploadReply::Error(status, Some(message)) => {
            (status, Json(json!({"error": message}))).into_response()
        }
        UploadReply::Error(status, None) => status.into_response(),
        UploadReply::Malformed => (StatusCode::OK, "<html>oops</html>").into_response(),
    }
}

fn legacy(filename: &str) -> Response {
    Json(json!({
        "status": "success",
        "message": "File uploaded and converted to PDF successfully",
        "file_path": format!("uploads/{filename}"),
        "filename": filename,
    }))
    .into_response()
}

async fn simplify(Json(body): Json<Value>) -> Response {
    match body.get("text").and_then(Value::as_str) {
        Some(text) => Json(json!({"simplified_story": format!("Simply: {text}")})).into_response(),
        None => (StatusCode::BAD_REQUEST, Json(json!({"error": "No text provided"}))).into_response(),
    }
}

async fn generate_audiobook(Json(body): Json<Value>) -> Response {
    match body.get("text").and_then(Value::as_str) {
        Some(_) => Json(json!({
            "message": "Audiobook generated successfully",
            "audio_files": ["audio_output/line_0_NARRATOR.mp3", "audio_output/line_1_FOX.mp3"]
        }))
        .into_response(),
        None => (StatusCode::BAD_REQUEST, Json(json!({"error": "No text provided"}))).into_response(),
    }
}
