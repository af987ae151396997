//! Workflow definition parsing and file loading.
//!
//! Definitions arrive as JSON (the editor's native format) or YAML
//! (hand-written). Structural validation happens later, in
//! [`super::graph::WorkflowGraph::build`].

use std::path::Path;

use nodeflow_types::workflow::WorkflowDefinition;

use super::error::DefinitionError;

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

pub fn parse_definition_json(json: &str) -> Result<WorkflowDefinition, DefinitionError> {
    Ok(serde_json::from_str(json)?)
}

pub fn parse_definition_yaml(yaml: &str) -> Result<WorkflowDefinition, DefinitionError> {
    Ok(serde_yaml_ng::from_str(yaml)?)
}

/// Serialize a definition to pretty-printed JSON.
pub fn serialize_definition_json(def: &WorkflowDefinition) -> Result<String, DefinitionError> {
    Ok(serde_json::to_string_pretty(def)?)
}

// ---------------------------------------------------------------------------
// Filesystem operations
// ---------------------------------------------------------------------------

/// Load a definition from disk, choosing the parser by file extension.
pub fn load_definition_file(path: &Path) -> Result<WorkflowDefinition, DefinitionError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    let content = std::fs::read_to_string(path)?;
    match extension.as_str() {
        "json" => parse_definition_json(&content),
        "yaml" | "yml" => parse_definition_yaml(&content),
        other => Err(DefinitionError::UnsupportedFormat(format!(
            "'{}' (expected .json, .yaml or .yml)",
            if other.is_empty() { "<none>" } else { other }
        ))),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use nodeflow_types::node::NodeType;
    use nodeflow_types::workflow::ParallelErrorStrategy;

    const YAML: &str = r#"
name: greet
nodes:
  - id: in
    name: 用户需求
    type: INPUT
    config:
      fields:
        - name: 需求描述
          value: hello
  - id: out
    name: result
    type: OUTPUT
    config:
      content: "{{用户需求.需求描述}}"
edges:
  - id: e1
    source: in
    target: out
settings:
  parallelErrorStrategy: continue
"#;

    #[test]
    fn parse_yaml_definition() {
        let def = parse_definition_yaml(YAML).unwrap();
        assert_eq!(def.display_name(), "greet");
        assert_eq!(def.nodes.len(), 2);
        assert_eq!(def.nodes[0].node_type(), NodeType::Input);
        assert_eq!(
            def.settings.parallel_error_strategy,
            ParallelErrorStrategy::Continue
        );
    }

    #[test]
    fn json_round_trip_preserves_definition() {
        let def = parse_definition_yaml(YAML).unwrap();
        let json = serialize_definition_json(&def).unwrap();
        let back = parse_definition_json(&json).unwrap();
        assert_eq!(def, back);
    }

    #[test]
    fn load_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let yaml_path = dir.path().join("flow.yml");
        std::fs::write(&yaml_path, YAML).unwrap();
        assert_eq!(load_definition_file(&yaml_path).unwrap().nodes.len(), 2);

        let txt_path = dir.path().join("flow.txt");
        std::fs::write(&txt_path, YAML).unwrap();
        assert!(matches!(
            load_definition_file(&txt_path),
            Err(DefinitionError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn malformed_json_is_parse_error() {
        assert!(matches!(
            parse_definition_json("{\"nodes\": [}"),
            Err(DefinitionError::Json(_))
        ));
    }
}
