//! DATA nodes: parse resolved text into structured values.

use futures_util::future::BoxFuture;
use nodeflow_types::node::{DataConfig, DataFormat, NodeType};
use serde_json::{Map, Value};

use crate::workflow::error::ProcessorError;
use crate::workflow::registry::{NodeContext, NodeOutput, NodeProcessor};
use crate::workflow::template::humanize;

pub struct DataProcessor;

impl NodeProcessor for DataProcessor {
    fn node_type(&self) -> NodeType {
        NodeType::Data
    }

    fn process<'a>(
        &'a self,
        ctx: &'a NodeContext<'a>,
    ) -> BoxFuture<'a, Result<NodeOutput, ProcessorError>> {
        Box::pin(async move {
            let config = payload!(ctx, Data);
            let source = ctx.resolve_value(&config.source);
            let parsed = parse(config, source)?;

            let count = match &parsed {
                Value::Array(items) => Some(items.len()),
                _ => None,
            };
            let mut output = NodeOutput::with_result(parsed);
            if let Some(count) = count {
                output = output.insert("count", Value::from(count));
            }
            Ok(output)
        })
    }
}

fn parse(config: &DataConfig, source: Value) -> Result<Value, ProcessorError> {
    match (config.format, source) {
        // A single-token template already produced structured data.
        (DataFormat::Json, value @ (Value::Array(_) | Value::Object(_))) => Ok(value),
        (DataFormat::Json, Value::String(text)) => serde_json::from_str(text.trim())
            .map_err(|e| ProcessorError::Fatal(format!("invalid JSON data: {e}"))),
        (DataFormat::Json, value) => Ok(value),
        (DataFormat::Csv, source) => parse_csv(&as_text(source), config.delimiter.as_deref()),
        (DataFormat::Lines, source) => Ok(Value::Array(
            as_text(source)
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(|line| Value::String(line.to_string()))
                .collect(),
        )),
        (DataFormat::Text, source) => Ok(Value::String(as_text(source))),
    }
}

fn as_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => humanize(&other),
    }
}

/// Header-keyed rows; every cell stays a string.
fn parse_csv(text: &str, delimiter: Option<&str>) -> Result<Value, ProcessorError> {
    let delimiter = match delimiter {
        None | Some("") => b',',
        Some("\\t") | Some("\t") => b'\t',
        Some(d) if d.len() == 1 => d.as_bytes()[0],
        Some(d) => {
            return Err(ProcessorError::InvalidConfig(format!(
                "CSV delimiter must be a single byte, got '{d}'"
            )));
        }
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());
    let headers = reader
        .headers()
        .map_err(|e| ProcessorError::Fatal(format!("invalid CSV header: {e}")))?
        .clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ProcessorError::Fatal(format!("invalid CSV row: {e}")))?;
        let row: Map<String, Value> = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.to_string(), Value::String(v.to_string())))
            .collect();
        rows.push(Value::Object(row));
    }
    Ok(Value::Array(rows))
}
