//! OUTPUT nodes: the run's deliverable, optionally stored as a file.

use futures_util::future::BoxFuture;
use nodeflow_types::node::{NodeType, OutputFormat};
use nodeflow_types::storage::{ArtifactMetadata, MAX_ARTIFACT_SIZE_BYTES, OutputFile};
use serde_json::Value;

use crate::workflow::error::ProcessorError;
use crate::workflow::registry::{NodeContext, NodeOutput, NodeProcessor};

pub struct OutputProcessor;

impl NodeProcessor for OutputProcessor {
    fn node_type(&self) -> NodeType {
        NodeType::Output
    }

    fn process<'a>(
        &'a self,
        ctx: &'a NodeContext<'a>,
    ) -> BoxFuture<'a, Result<NodeOutput, ProcessorError>> {
        Box::pin(async move {
            let config = payload!(ctx, Output);
            let content = ctx.resolve(&config.content);

            let mut output = NodeOutput::with_result(Value::String(content.clone()))
                .insert("format", Value::from(config.format.as_str()));

            let Some(file_name) = config.file_name.as_deref().map(|f| ctx.resolve(f)) else {
                return Ok(output);
            };
            let file_name = sanitize_file_name(&file_name, config.format);

            if content.len() as u64 > MAX_ARTIFACT_SIZE_BYTES {
                return Err(ProcessorError::Fatal(format!(
                    "output exceeds the {MAX_ARTIFACT_SIZE_BYTES} byte artifact limit"
                )));
            }

            let store = ctx.services.store()?;
            let metadata = ArtifactMetadata {
                run_id: ctx.exec.run_id(),
                node_id: ctx.node.id.clone(),
                file_name: file_name.clone(),
                mime_type: config.format.mime_type().to_string(),
            };
            let stored = store.store(content.as_bytes(), &metadata).await?;

            tracing::info!(
                node = %ctx.node.name,
                file = %file_name,
                size = stored.size,
                "output artifact stored"
            );

            let file = OutputFile {
                node_id: ctx.node.id.clone(),
                node_name: ctx.node.name.clone(),
                file_name,
                url: stored.url,
                size: stored.size,
                mime_type: metadata.mime_type,
            };
            output = output.insert(
                "file",
                serde_json::to_value(&file).map_err(|e| ProcessorError::Fatal(e.to_string()))?,
            );
            Ok(output.file(file))
        })
    }
}

/// Strip path components and give the file an extension matching its format.
fn sanitize_file_name(name: &str, format: OutputFormat) -> String {
    let base: String = name
        .trim()
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_control())
        .collect();
    let base = if base.is_empty() || base == "." || base == ".." {
        "output".to_string()
    } else {
        base
    };
    if base.contains('.') {
        base
    } else {
        format!("{base}.{}", extension(format))
    }
}

fn extension(format: OutputFormat) -> &'static str {
    match format {
        OutputFormat::Text => "txt",
        OutputFormat::Markdown => "md",
        OutputFormat::Json => "json",
        OutputFormat::Html => "html",
    }
}
