// src/models.rs

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A manuscript chosen for upload.
/// Holds only what the transport needs; the bytes stay on disk until the request streams them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedFile {
    pub path: PathBuf,
    /// File name as sent in the multipart `file` field.
    pub name: String,
    pub size: u64,
}

impl SelectedFile {
    pub fn new(path: impl Into<PathBuf>, name: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            size,
        }
    }

    /// Lowercased extension of the file name, if there is one.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
    }

    /// MIME type the backend expects for the manuscript formats it accepts.
    pub fn mime_type(&self) -> &'static str {
        match self.extension().as_deref() {
            Some("pdf") => "application/pdf",
            Some("txt") => "text/plain",
            Some("epub") => "application/epub+zip",
            Some("mobi") => "application/x-mobipocket-ebook",
            _ => "application/octet-stream",
        }
    }
}

/// Lifecycle of an upload attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum UploadStatus {
    Idle,
    Ready,
    InFlight,
    Succeeded,
    Failed,
}

impl UploadStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, UploadStatus::Succeeded | UploadStatus::Failed)
    }
}

/// One character found by the backend's language analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterProfile {
    pub name: String,
    #[serde(default)]
    pub dialogue_count: u32,
    /// Index of the line where the character first speaks.
    #[serde(default)]
    pub first_appearance: u32,
    #[serde(default)]
    pub sample_dialogue: String,
}

/// Structured analysis returned alongside an upload by newer backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub target_age_group: String,
    #[serde(default)]
    pub simplified_text: String,
    #[serde(default)]
    pub characters: Vec<CharacterProfile>,
}

/// Parsed body of a successful `POST /upload`.
///
/// Older backends answer with just the stored file name and path; newer ones
/// nest an `analysis` object. Both deserialize into this shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadEnvelope {
    pub filename: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub analysis: Option<Analysis>,
}

/// Outcome of a successful attempt, kept by the orchestrator until handed off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    /// Server-assigned name; keys the detail route.
    pub filename: String,
    pub file_path: Option<String>,
    pub analysis: Option<Analysis>,
}

impl From<UploadEnvelope> for UploadResult {
    fn from(envelope: UploadEnvelope) -> Self {
        Self {
            filename: envelope.filename,
            file_path: envelope.file_path,
            analysis: envelope.analysis,
        }
    }
}

/// Hand-off to the detail view. The analysis travels here, never in the route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Navigation {
    pub route: String,
    pub filename: String,
    pub analysis: Option<Analysis>,
}

impl Navigation {
    pub fn to_book(result: UploadResult) -> Self {
        Self {
            route: book_route(&result.filename),
            filename: result.filename,
            analysis: result.analysis,
        }
    }
}

/// Detail route for a server-assigned filename.
pub fn book_route(filename: &str) -> String {
    format!("/book/{}", crate::transport::encode_segment(filename))
}

/// Response of `POST /simplify`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimplifyResponse {
    pub simplified_story: String,
}

/// Response of `POST /generate-audiobook`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudiobookResponse {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub audio_files: Vec<String>,
}

/// Read-only view of the current attempt handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadSnapshot {
    pub status: UploadStatus,
    pub file: Option<SelectedFile>,
    pub progress_percent: u8,
    pub stage_label: String,
    pub error_message: Option<String>,
    /// Inline message from selection or validation; never changes `status`.
    pub validation_error: Option<String>,
    pub result: Option<UploadResult>,
}

impl Default for UploadSnapshot {
    fn default() -> Self {
        Self {
            status: UploadStatus::Idle,
            file: None,
            progress_percent: 0,
            stage_label: String::new(),
            error_message: None,
            validation_error: None,
            result: None,
        }
    }
}
