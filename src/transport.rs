// src/transport.rs

use crate::config::ClientConfig;
use crate::models::{AudiobookResponse, SelectedFile, SimplifyResponse, UploadEnvelope};
use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

/// Characters escaped when a name is used as a single URL path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

pub fn encode_segment(name: &str) -> String {
    utf8_percent_encode(name, SEGMENT).to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Connection could not be established or broke mid-request.
    Network,
    /// The backend answered with a non-success status.
    Server,
    /// No response within the configured timeout.
    Timeout,
    /// A success status with a body that does not parse.
    Decode,
    /// The local manuscript could not be read.
    File,
    /// The request could not be assembled (bad URL, header or MIME type).
    Request,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportErrorKind::Network => "network",
            TransportErrorKind::Server => "server",
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Decode => "decode",
            TransportErrorKind::File => "file",
            TransportErrorKind::Request => "request",
        };
        f.write_str(name)
    }
}

/// Failure of a single backend call.
#[derive(Debug, Error)]
#[error("{kind} error: {detail}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    /// HTTP status when the backend answered.
    pub status: Option<u16>,
    /// Human-readable reason, shown to the user as-is.
    pub detail: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            detail: detail.into(),
        }
    }

    pub fn server(status: u16, detail: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Server,
            status: Some(status),
            detail: detail.into(),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_builder() {
            TransportErrorKind::Request
        } else if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if err.is_decode() {
            TransportErrorKind::Decode
        } else if err.is_status() {
            TransportErrorKind::Server
        } else {
            TransportErrorKind::Network
        };
        Self {
            kind,
            status: err.status().map(|s| s.as_u16()),
            detail: err.to_string(),
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::new(TransportErrorKind::File, err.to_string())
    }
}

/// Anything that can carry a manuscript to the analysis backend.
#[async_trait]
pub trait UploadTransport: Send + Sync + 'static {
    async fn upload(&self, file: &SelectedFile) -> Result<UploadEnvelope, TransportError>;
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Deserialize)]
struct Greeting {
    message: String,
}

#[derive(Serialize)]
struct TextRequest<'a> {
    text: &'a str,
}

/// HTTP client for the audiobook backend. One request per call, no retries.
#[derive(Debug, Clone)]
pub struct TransportClient {
    client: Client,
    origin: String,
}

impl TransportClient {
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent(concat!("audiobook-client/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            origin: config.origin().to_string(),
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.origin, path)
    }

    /// Where the backend serves a stored manuscript.
    pub fn file_url(&self, name: &str) -> String {
        self.endpoint(&format!("files/{}", encode_segment(name)))
    }

    /// Where the backend serves a generated audio clip.
    pub fn audio_url(&self, name: &str) -> String {
        self.endpoint(&format!("audio/{}", encode_segment(name)))
    }

    /// Health check against the backend root.
    pub async fn ping(&self) -> Result<String, TransportError> {
        let resp = self.client.get(self.endpoint("")).send().await?;
        let greeting: Greeting = Self::parse(Self::check_status(resp).await?).await?;
        Ok(greeting.message)
    }

    pub async fn simplify(&self, text: &str) -> Result<SimplifyResponse, TransportError> {
        self.post_json("simplify", &TextRequest { text }).await
    }

    pub async fn generate_audiobook(&self, text: &str) -> Result<AudiobookResponse, TransportError> {
        self.post_json("generate-audiobook", &TextRequest { text }).await
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, TransportError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        debug!(path, "posting json request");
        let resp = self.client.post(self.endpoint(path)).json(body).send().await?;
        Self::parse(Self::check_status(resp).await?).await
    }

    /// Turns a non-success status into a server error, preferring the backend's `{"error": ...}` text.
    async fn check_status(resp: Response) -> Result<Response, TransportError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .map(|b| b.error)
            .filter(|e| !e.trim().is_empty())
            .or_else(|| status.canonical_reason().map(str::to_string))
            .unwrap_or_else(|| status.as_str().to_string());
        warn!(status = status.as_u16(), %detail, "backend rejected request");
        Err(TransportError::server(status.as_u16(), detail))
    }

    async fn parse<R: DeserializeOwned>(resp: Response) -> Result<R, TransportError> {
        let bytes = resp.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            TransportError::new(TransportErrorKind::Decode, format!("malformed response: {e}"))
        })
    }
}

#[async_trait]
impl UploadTransport for TransportClient {
    async fn upload(&self, file: &SelectedFile) -> Result<UploadEnvelope, TransportError> {
        let handle = tokio::fs::File::open(&file.path).await?;
        let body = Body::wrap_stream(ReaderStream::new(handle));
        let part = Part::stream_with_length(body, file.size)
            .file_name(file.name.clone())
            .mime_str(file.mime_type())?;
        let form = Form::new().part("file", part);

        info!(file = %file.name, size = file.size, "uploading manuscript");
        let resp = self
            .client
            .post(self.endpoint("upload"))
            .multipart(form)
            .send()
            .await?;
        let envelope: UploadEnvelope = Self::parse(Self::check_status(resp).await?).await?;
        info!(
            filename = %envelope.filename,
            analysis = envelope.analysis.is_some(),
            "upload accepted"
        );
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> TransportClient {
        TransportClient::new(&ClientConfig::default().with_base_url("http://localhost:5001/")).unwrap()
    }

    #[test]
    fn urls_are_built_from_the_configured_origin() {
        let client = client();
        assert_eq!(client.origin(), "http://localhost:5001");
        assert_eq!(client.file_url("book.pdf"), "http://localhost:5001/files/book.pdf");
        assert_eq!(
            client.audio_url("line_0_NARRATOR.mp3"),
            "http://localhost:5001/audio/line_0_NARRATOR.mp3"
        );
    }

    #[test]
    fn names_are_escaped_as_one_segment() {
        assert_eq!(encode_segment("a b/c?.pdf"), "a%20b%2Fc%3F.pdf");
        assert_eq!(client().file_url("100%.txt"), "http://localhost:5001/files/100%25.txt");
    }

    #[test]
    fn error_display_carries_kind_and_detail() {
        let err = TransportError::server(500, "Server error");
        assert_eq!(err.to_string(), "server error: Server error");
        assert_eq!(err.status, Some(500));
    }

    #[test]
    fn builder_failures_are_not_network_errors() {
        let err: TransportError = Part::text("x").mime_str("not a mime").unwrap_err().into();
        assert_eq!(err.kind, TransportErrorKind::Request);
        assert_eq!(err.status, None);
    }

    #[tokio::test]
    async fn unparsable_url_is_a_request_error() {
        let client = TransportClient::new(&ClientConfig::default()).unwrap();
        let err: TransportError = client.client.get("not a url").send().await.unwrap_err().into();
        assert_eq!(err.kind, TransportErrorKind::Request);
    }
}
