use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use tapedeck_shared::{
    AddTapeRequest, MoveAction, MoveArgs, OffsetArg, StatusPayload, TapeIdArg, TapeRecord,
};
use tracing::{debug, instrument, warn};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(#[source] BoxError),
    #[error("server returned HTTP {status}{}", message_suffix(.message))]
    Server {
        status: u16,
        message: Option<String>,
    },
    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl ApiError {
    /// The `status` text the backend attached to a failure, if any.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ApiError::Server { message, .. } => message.as_deref(),
            _ => None,
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::Network(_))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Network(Box::new(err))
    }
}

fn message_suffix(message: &Option<String>) -> String {
    message
        .as_deref()
        .map(|m| format!(": {m}"))
        .unwrap_or_default()
}

/// The tape machine's HTTP surface.
#[async_trait]
pub trait TapeBackend: Send + Sync {
    async fn fetch_tapes(&self) -> Result<Vec<TapeRecord>, ApiError>;
    async fn fetch_tags(&self) -> Result<Vec<String>, ApiError>;
    async fn move_hardware(&self, action: MoveAction, x: u8, y: u8)
    -> Result<StatusPayload, ApiError>;
    async fn offset(&self, val: f64) -> Result<StatusPayload, ApiError>;
    async fn dispense(&self, id: u64) -> Result<StatusPayload, ApiError>;
    async fn return_tape(&self, id: u64) -> Result<StatusPayload, ApiError>;
    async fn add(&self, request: &AddTapeRequest) -> Result<serde_json::Value, ApiError>;
    async fn remove(&self, id: u64) -> Result<StatusPayload, ApiError>;
    async fn remove_all(&self) -> Result<StatusPayload, ApiError>;
}

pub struct HttpBackend {
    base_url: String,
    http: reqwest::Client,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed building HTTP client for the tape machine")?;
        Ok(Self {
            base_url: normalize_base_url(base_url),
            http,
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    async fn send<T>(&self, request: reqwest::RequestBuilder) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(status = %status, bytes = body.len(), "tape machine responded");

        if !status.is_success() {
            let message = status_message(&body);
            warn!(status = %status, message = ?message, "tape machine returned non-success status");
            return Err(ApiError::Server {
                status: status.as_u16(),
                message,
            });
        }

        decode_body(status, &body)
    }
}

#[async_trait]
impl TapeBackend for HttpBackend {
    #[instrument(skip(self))]
    async fn fetch_tapes(&self) -> Result<Vec<TapeRecord>, ApiError> {
        self.send(self.http.get(self.url("/api/tapes"))).await
    }

    #[instrument(skip(self))]
    async fn fetch_tags(&self) -> Result<Vec<String>, ApiError> {
        self.send(self.http.get(self.url("/api/tags"))).await
    }

    #[instrument(skip(self))]
    async fn move_hardware(
        &self,
        action: MoveAction,
        x: u8,
        y: u8,
    ) -> Result<StatusPayload, ApiError> {
        let args = MoveArgs { action, x, y };
        self.send(self.http.get(self.url("/api/move")).query(&args))
            .await
    }

    #[instrument(skip(self))]
    async fn offset(&self, val: f64) -> Result<StatusPayload, ApiError> {
        self.send(self.http.get(self.url("/api/offset")).query(&OffsetArg { val }))
            .await
    }

    #[instrument(skip(self))]
    async fn dispense(&self, id: u64) -> Result<StatusPayload, ApiError> {
        self.send(self.http.get(self.url("/api/dispense")).query(&TapeIdArg { id }))
            .await
    }

    #[instrument(skip(self))]
    async fn return_tape(&self, id: u64) -> Result<StatusPayload, ApiError> {
        self.send(self.http.get(self.url("/api/return")).query(&TapeIdArg { id }))
            .await
    }

    #[instrument(skip(self, request), fields(name_len = request.name.len(), slot_x = ?request.slot_x, slot_y = ?request.slot_y))]
    async fn add(&self, request: &AddTapeRequest) -> Result<serde_json::Value, ApiError> {
        self.send(self.http.post(self.url("/api/add")).json(request))
            .await
    }

    #[instrument(skip(self))]
    async fn remove(&self, id: u64) -> Result<StatusPayload, ApiError> {
        self.send(
            self.http
                .request(Method::DELETE, self.url("/api/remove"))
                .query(&TapeIdArg { id }),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn remove_all(&self) -> Result<StatusPayload, ApiError> {
        self.send(
            self.http
                .request(Method::DELETE, self.url("/api/remove_all")),
        )
        .await
    }
}

fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

fn status_message(body: &str) -> Option<String> {
    serde_json::from_str::<StatusPayload>(body)
        .ok()
        .and_then(|payload| payload.status)
        .map(|status| status.trim().to_string())
        .filter(|status| !status.is_empty())
}

fn decode_body<T>(status: StatusCode, body: &str) -> Result<T, ApiError>
where
    T: DeserializeOwned,
{
    // Some endpoints answer 2xx with an empty body.
    let text = if body.trim().is_empty() { "{}" } else { body };
    serde_json::from_str(text)
        .map_err(|err| ApiError::Decode(format!("HTTP {status}: {err}")))
}
