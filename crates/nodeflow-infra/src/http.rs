//! reqwest-backed HTTP collaborator for HTTP and webhook nodes.

use std::collections::BTreeMap;
use std::time::Duration;

use futures_util::future::BoxFuture;
use nodeflow_core::http::{HttpClient, HttpClientError, HttpRequest, HttpResponse};
use nodeflow_types::node::HttpMethod;

/// Default per-request timeout when the node sets none.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Response bodies beyond this size are rejected.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
    default_timeout: Duration,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            default_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, HttpClientError> {
        let timeout = request
            .timeout_secs
            .map_or(self.default_timeout, Duration::from_secs);

        let mut builder = self
            .client
            .request(method(request.method), &request.url)
            .timeout(timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        if response
            .content_length()
            .is_some_and(|len| len > MAX_BODY_BYTES as u64)
        {
            return Err(HttpClientError::Transport(format!(
                "response body exceeds {MAX_BODY_BYTES} bytes"
            )));
        }
        let body = response.text().await.map_err(map_reqwest_error)?;

        tracing::debug!(url = %request.url, status, bytes = body.len(), "http request finished");
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for ReqwestHttpClient {
    fn send<'a>(
        &'a self,
        request: &'a HttpRequest,
    ) -> BoxFuture<'a, Result<HttpResponse, HttpClientError>> {
        Box::pin(self.execute(request))
    }
}

fn method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

fn map_reqwest_error(err: reqwest::Error) -> HttpClientError {
    if err.is_timeout() {
        HttpClientError::Timeout
    } else if err.is_connect() {
        HttpClientError::Connect(err.to_string())
    } else if err.is_builder() {
        HttpClientError::InvalidRequest(err.to_string())
    } else {
        HttpClientError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn methods_map_one_to_one() {
        assert_eq!(method(HttpMethod::Get), reqwest::Method::GET);
        assert_eq!(method(HttpMethod::Delete), reqwest::Method::DELETE);
    }

    #[tokio::test]
    async fn unparsable_url_is_not_retryable() {
        let client = ReqwestHttpClient::new();
        let request = HttpRequest {
            method: HttpMethod::Get,
            url: "http://".into(),
            headers: BTreeMap::new(),
            body: None,
            timeout_secs: Some(1),
        };
        let err = client.send(&request).await.unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn refused_connection_is_transient() {
        let client = ReqwestHttpClient::new();
        let request = HttpRequest {
            method: HttpMethod::Post,
            url: "http://127.0.0.1:9/unreachable".into(),
            headers: BTreeMap::new(),
            body: Some("{}".into()),
            timeout_secs: Some(2),
        };
        let err = client.send(&request).await.unwrap_err();
        assert!(err.is_transient());
    }
}
