//! Outbound HTTP collaborator used by HTTP and NOTIFICATION nodes.

use std::collections::BTreeMap;

use futures_util::future::BoxFuture;
use nodeflow_types::node::HttpMethod;

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 429 and 5xx are worth retrying.
    pub fn is_transient_failure(&self) -> bool {
        self.status == 429 || self.status >= 500
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum HttpClientError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl HttpClientError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            HttpClientError::Timeout | HttpClientError::Connect(_) | HttpClientError::Transport(_)
        )
    }
}

pub trait HttpClient: Send + Sync {
    /// Send `request`. Non-2xx statuses are returned as responses, not errors.
    fn send<'a>(
        &'a self,
        request: &'a HttpRequest,
    ) -> BoxFuture<'a, Result<HttpResponse, HttpClientError>>;
}
