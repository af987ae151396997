//! NOTIFICATION nodes.

use std::collections::BTreeMap;

use futures_util::future::BoxFuture;
use nodeflow_types::node::{HttpMethod, NodeType, NotificationChannel};
use serde_json::{Value, json};

use crate::http::HttpRequest;
use crate::workflow::error::ProcessorError;
use crate::workflow::registry::{NodeContext, NodeOutput, NodeProcessor};

pub struct NotificationProcessor;

impl NodeProcessor for NotificationProcessor {
    fn node_type(&self) -> NodeType {
        NodeType::Notification
    }

    fn process<'a>(
        &'a self,
        ctx: &'a NodeContext<'a>,
    ) -> BoxFuture<'a, Result<NodeOutput, ProcessorError>> {
        Box::pin(async move {
            let config = payload!(ctx, Notification);
            let title = ctx.resolve(&config.title);
            let message = ctx.resolve(&config.message);

            let channel = match config.channel {
                NotificationChannel::Log => {
                    tracing::info!(
                        run_id = %ctx.exec.run_id(),
                        node = %ctx.node.name,
                        title = %title,
                        "{message}"
                    );
                    "log"
                }
                NotificationChannel::Webhook => {
                    let url = config
                        .url
                        .as_deref()
                        .map(|u| ctx.resolve(u))
                        .filter(|u| u.starts_with("http://") || u.starts_with("https://"))
                        .ok_or_else(|| {
                            ProcessorError::InvalidConfig(
                                "webhook notification needs an http(s) url".into(),
                            )
                        })?;
                    let payload = json!({
                        "title": title,
                        "message": message,
                        "runId": ctx.exec.run_id(),
                    });
                    let request = HttpRequest {
                        method: HttpMethod::Post,
                        url,
                        headers: BTreeMap::from([(
                            "content-type".to_string(),
                            "application/json".to_string(),
                        )]),
                        body: Some(payload.to_string()),
                        timeout_secs: None,
                    };
                    let response = ctx.services.http()?.send(&request).await?;
                    if !response.is_success() {
                        let message = format!("webhook returned HTTP {}", response.status);
                        return Err(if response.is_transient_failure() {
                            ProcessorError::Transient(message)
                        } else {
                            ProcessorError::Fatal(message)
                        });
                    }
                    "webhook"
                }
            };

            Ok(NodeOutput::with_result(json!({"delivered": true, "channel": channel}))
                .insert("title", Value::String(title))
                .insert("message", Value::String(message)))
        })
    }
}
