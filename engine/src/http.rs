//! HTTP implementation of [`RemoteTasks`] over a REST task collection.

use crate::remote::{RemoteError, RemoteTasks};
use crate::Task;
use async_trait::async_trait;
use reqwest::{header, Client, Method, RequestBuilder, Response, Url};
use serde_json::Value;
use std::time::Duration;

/// Header carrying the client id on creates, so a retried create is not duplicated.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Talks to `{base}/tasks` and `{base}/tasks/{id}`.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpRemote {
    /// Create a client for the server at `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RemoteError> {
        let base_url =
            Url::parse(base_url).map_err(|e| RemoteError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(RemoteError::InvalidUrl(base_url.to_string()));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(RemoteError::from)?;

        Ok(Self {
            client,
            base_url,
            token: None,
        })
    }

    /// Send `Authorization: Bearer <token>` with every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Whether the server answers its health check.
    pub async fn is_reachable(&self) -> bool {
        let Ok(url) = self.url(&["health"]) else {
            return false;
        };
        match self.request(Method::GET, url).send().await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                tracing::debug!(error = %err, "health check failed");
                false
            }
        }
    }

    fn url(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[async_trait]
impl RemoteTasks for HttpRemote {
    async fn create(&self, payload: &Task, idempotency_key: &str) -> Result<Value, RemoteError> {
        let response = self
            .request(Method::POST, self.url(&["tasks"])?)
            .header(IDEMPOTENCY_HEADER, idempotency_key)
            .json(payload)
            .send()
            .await?;

        let body = read_body(check_status(response).await?).await?;
        body.ok_or_else(|| RemoteError::Decode("empty create response".to_string()))
    }

    async fn update(&self, id: &str, payload: &Task) -> Result<Option<Value>, RemoteError> {
        let response = self
            .request(Method::PUT, self.url(&["tasks", id])?)
            .json(payload)
            .send()
            .await?;

        read_body(check_status(response).await?).await
    }

    async fn delete(&self, id: &str) -> Result<(), RemoteError> {
        let response = self
            .request(Method::DELETE, self.url(&["tasks", id])?)
            .send()
            .await?;

        check_status(response).await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Value>, RemoteError> {
        let response = self
            .request(Method::GET, self.url(&["tasks"])?)
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;

        match read_body(check_status(response).await?).await? {
            Some(Value::Array(items)) => Ok(items),
            Some(other) => Err(RemoteError::Decode(format!(
                "expected a task array, got {}",
                json_kind(&other)
            ))),
            None => Ok(Vec::new()),
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RemoteError::Timeout
        } else if err.is_decode() {
            RemoteError::Decode(err.to_string())
        } else {
            RemoteError::Transport(err.to_string())
        }
    }
}

async fn check_status(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Parse a JSON body; an empty body is `None`.
async fn read_body(response: Response) -> Result<Option<Value>, RemoteError> {
    let bytes = response.bytes().await?;
    parse_body(&bytes)
}

fn parse_body(bytes: &[u8]) -> Result<Option<Value>, RemoteError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(bytes)
        .map(Some)
        .map_err(|e| RemoteError::Decode(e.to_string()))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
