//! HTTP nodes: one outbound request through the HTTP collaborator.

use futures_util::future::BoxFuture;
use nodeflow_types::node::NodeType;
use serde_json::{Map, Value};

use crate::http::HttpRequest;
use crate::workflow::error::ProcessorError;
use crate::workflow::registry::{NodeContext, NodeOutput, NodeProcessor};

/// Longest response body excerpt quoted in an error message.
const ERROR_BODY_EXCERPT: usize = 200;

pub struct HttpProcessor;

impl NodeProcessor for HttpProcessor {
    fn node_type(&self) -> NodeType {
        NodeType::Http
    }

    fn process<'a>(
        &'a self,
        ctx: &'a NodeContext<'a>,
    ) -> BoxFuture<'a, Result<NodeOutput, ProcessorError>> {
        Box::pin(async move {
            let config = payload!(ctx, Http);
            let url = ctx.resolve(&config.url);
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ProcessorError::InvalidConfig(format!(
                    "URL must be http(s), got '{url}'"
                )));
            }
            let client = ctx.services.http()?;

            let request = HttpRequest {
                method: config.method,
                url,
                headers: config
                    .headers
                    .iter()
                    .map(|(k, v)| (k.clone(), ctx.resolve(v)))
                    .collect(),
                body: config.body.as_deref().map(|b| ctx.resolve(b)),
                timeout_secs: config.timeout_seconds,
            };

            tracing::debug!(
                node = %ctx.node.name,
                method = request.method.as_str(),
                url = %request.url,
                "sending HTTP request"
            );
            let response = client.send(&request).await?;

            if !response.is_success() {
                let excerpt: String = response.body.chars().take(ERROR_BODY_EXCERPT).collect();
                let message = format!("HTTP {} from {}: {excerpt}", response.status, request.url);
                return Err(if response.is_transient_failure() {
                    ProcessorError::Transient(message)
                } else {
                    ProcessorError::Fatal(message)
                });
            }

            let body = serde_json::from_str::<Value>(&response.body)
                .unwrap_or_else(|_| Value::String(response.body.clone()));
            let headers: Map<String, Value> = response
                .headers
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect();

            Ok(NodeOutput::with_result(body)
                .insert("status", Value::from(response.status))
                .insert("headers", Value::Object(headers)))
        })
    }
}
