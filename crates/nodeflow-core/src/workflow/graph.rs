//! Graph validation and execution-level planning.
//!
//! Uses `petgraph` to model node dependencies as a directed graph.
//! Topological sort detects cycles, and depth-based grouping produces
//! execution levels whose members have no path between them and may run
//! concurrently.

use std::collections::{HashMap, HashSet};

use nodeflow_types::node::{NodeConfig, NodeDefinition, NodeType};
use nodeflow_types::workflow::{EdgeDefinition, WorkflowDefinition};
use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use serde_json::Value;

use super::error::ValidationError;
use super::template::{is_reserved, references};

/// A validated workflow graph with its execution plan.
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    nodes: Vec<NodeDefinition>,
    edges: Vec<EdgeDefinition>,
    by_id: HashMap<String, usize>,
    /// Edge indices into `edges`, per node index.
    incoming: Vec<Vec<usize>>,
    outgoing: Vec<Vec<usize>>,
    /// Node indices per level, in definition order within a level.
    levels: Vec<Vec<usize>>,
}

impl WorkflowGraph {
    /// Validate `definition` and compute its execution levels.
    ///
    /// Checks, in order: node id and name uniqueness, edge endpoints,
    /// acyclicity, template references, then branch handles.
    pub fn build(definition: &WorkflowDefinition) -> Result<Self, ValidationError> {
        let nodes = &definition.nodes;
        if nodes.is_empty() {
            return Err(ValidationError::Empty);
        }

        // (a) uniqueness
        let mut by_id = HashMap::with_capacity(nodes.len());
        let mut by_name = HashMap::with_capacity(nodes.len());
        for (idx, node) in nodes.iter().enumerate() {
            if by_id.insert(node.id.clone(), idx).is_some() {
                return Err(ValidationError::DuplicateNodeId(node.id.clone()));
            }
            if by_name.insert(node.name.clone(), idx).is_some() {
                return Err(ValidationError::DuplicateNodeName(node.name.clone()));
            }
        }

        // (b) edge endpoints
        let mut graph = DiGraph::<usize, usize>::with_capacity(nodes.len(), definition.edges.len());
        let graph_nodes: Vec<NodeIndex> = (0..nodes.len()).map(|i| graph.add_node(i)).collect();
        let mut incoming = vec![Vec::new(); nodes.len()];
        let mut outgoing = vec![Vec::new(); nodes.len()];
        for (edge_idx, edge) in definition.edges.iter().enumerate() {
            let endpoint = |id: &str| {
                by_id
                    .get(id)
                    .copied()
                    .ok_or_else(|| ValidationError::UnknownEdgeEndpoint {
                        edge_id: edge.id.clone(),
                        endpoint: id.to_string(),
                    })
            };
            let source = endpoint(&edge.source)?;
            let target = endpoint(&edge.target)?;
            graph.add_edge(graph_nodes[source], graph_nodes[target], edge_idx);
            outgoing[source].push(edge_idx);
            incoming[target].push(edge_idx);
        }

        // (c) acyclicity
        let sorted = toposort(&graph, None).map_err(|cycle| {
            let idx = graph[cycle.node_id()];
            ValidationError::CycleDetected(nodes[idx].id.clone())
        })?;

        // (d) references
        for (idx, node) in nodes.iter().enumerate() {
            check_references(node, idx, definition, &by_name, &graph, &graph_nodes)?;
        }

        // (e) branch handles
        for (idx, node) in nodes.iter().enumerate() {
            check_branches(node, &outgoing[idx], &definition.edges)?;
        }

        // Depth = longest path from a root; depth k forms level k.
        let mut depth = vec![0usize; nodes.len()];
        for graph_idx in &sorted {
            let idx = graph[*graph_idx];
            depth[idx] = incoming[idx]
                .iter()
                .map(|e| depth[by_id[&definition.edges[*e].source]] + 1)
                .max()
                .unwrap_or(0);
        }
        let level_count = depth.iter().max().map_or(0, |d| d + 1);
        let mut levels = vec![Vec::new(); level_count];
        for (idx, d) in depth.iter().enumerate() {
            levels[*d].push(idx);
        }

        Ok(Self {
            nodes: nodes.clone(),
            edges: definition.edges.clone(),
            by_id,
            incoming,
            outgoing,
            levels,
        })
    }

    pub fn nodes(&self) -> &[NodeDefinition] {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Execution levels as node references, first level first.
    pub fn levels(&self) -> impl Iterator<Item = Vec<&NodeDefinition>> {
        self.levels
            .iter()
            .map(|level| level.iter().map(|i| &self.nodes[*i]).collect())
    }

    pub fn node(&self, id: &str) -> Option<&NodeDefinition> {
        self.by_id.get(id).map(|i| &self.nodes[*i])
    }

    /// Edges into node `id`, in definition order.
    pub fn incoming_edges(&self, id: &str) -> Vec<&EdgeDefinition> {
        self.by_id
            .get(id)
            .map(|i| self.incoming[*i].iter().map(|e| &self.edges[*e]).collect())
            .unwrap_or_default()
    }

    /// Direct predecessors of node `id`, deduplicated, in edge order.
    pub fn predecessors(&self, id: &str) -> Vec<&NodeDefinition> {
        let mut seen = HashSet::new();
        self.incoming_edges(id)
            .into_iter()
            .filter(|e| seen.insert(e.source.as_str()))
            .filter_map(|e| self.node(&e.source))
            .collect()
    }

    /// Whether node `id` has no outgoing edges.
    pub fn is_sink(&self, id: &str) -> bool {
        self.by_id
            .get(id)
            .is_some_and(|i| self.outgoing[*i].is_empty())
    }

    /// The nodes whose output is the run's output: every OUTPUT node, or
    /// every sink when the graph has no OUTPUT node.
    pub fn terminal_nodes(&self) -> Vec<&NodeDefinition> {
        let outputs: Vec<_> = self
            .nodes
            .iter()
            .filter(|n| n.node_type() == NodeType::Output)
            .collect();
        if !outputs.is_empty() {
            return outputs;
        }
        self.nodes.iter().filter(|n| self.is_sink(&n.id)).collect()
    }
}

// ---------------------------------------------------------------------------
// Reference and branch checks
// ---------------------------------------------------------------------------

fn collect_strings<'v>(value: &'v Value, out: &mut Vec<&'v str>) {
    match value {
        Value::String(s) => out.push(s),
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        _ => {}
    }
}

fn check_references(
    node: &NodeDefinition,
    idx: usize,
    definition: &WorkflowDefinition,
    by_name: &HashMap<String, usize>,
    graph: &DiGraph<usize, usize>,
    graph_nodes: &[NodeIndex],
) -> Result<(), ValidationError> {
    let config = node.config.to_value();
    let mut strings = Vec::new();
    collect_strings(&config, &mut strings);

    for template in strings {
        for reference in references(template) {
            let producer = reference.producer.as_str();
            if reference.path.is_empty() && is_reserved(producer) {
                continue;
            }
            if producer == "loop" && node.node_type() == NodeType::Loop {
                continue;
            }
            if let Some(&producer_idx) = by_name.get(producer) {
                let upstream = producer_idx != idx
                    && has_path_connecting(graph, graph_nodes[producer_idx], graph_nodes[idx], None);
                if !upstream {
                    return Err(ValidationError::ReferenceNotUpstream {
                        node: node.name.clone(),
                        producer: producer.to_string(),
                    });
                }
                continue;
            }
            if definition.global_variables.contains_key(producer) || producer == "input" {
                continue;
            }
            return Err(ValidationError::UnknownReference {
                node: node.name.clone(),
                reference: reference.raw,
            });
        }
    }
    Ok(())
}

fn check_branches(
    node: &NodeDefinition,
    outgoing: &[usize],
    edges: &[EdgeDefinition],
) -> Result<(), ValidationError> {
    let invalid = |message: String| ValidationError::InvalidNodeConfig {
        node: node.name.clone(),
        message,
    };
    let allowed: Vec<&str> = match &node.config {
        NodeConfig::Condition(c) => {
            if c.expression.trim().is_empty() {
                return Err(invalid("condition expression is empty".into()));
            }
            vec!["true", "false"]
        }
        NodeConfig::Switch(c) => {
            if c.expression.trim().is_empty() {
                return Err(invalid("switch expression is empty".into()));
            }
            c.cases
                .iter()
                .map(|case| case.handle.as_str())
                .chain(std::iter::once(c.default_handle.as_str()))
                .collect()
        }
        _ => return Ok(()),
    };
    for edge in outgoing.iter().map(|e| &edges[*e]) {
        if let Some(handle) = edge.source_handle.as_deref() {
            if !allowed.contains(&handle) {
                return Err(invalid(format!(
                    "edge '{}' uses unknown branch handle '{handle}'",
                    edge.id
                )));
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn output(id: &str, content: &str) -> Value {
        json!({"id": id, "name": id, "type": "OUTPUT", "config": {"content": content}})
    }

    fn edge(source: &str, target: &str) -> Value {
        json!({"id": format!("{source}-{target}"), "source": source, "target": target})
    }

    fn definition(nodes: Vec<Value>, edges: Vec<Value>) -> WorkflowDefinition {
        serde_json::from_value(json!({
            "nodes": nodes,
            "edges": edges,
            "globalVariables": {"tone": "formal"}
        }))
        .unwrap()
    }

    fn level_ids(graph: &WorkflowGraph) -> Vec<Vec<String>> {
        graph
            .levels()
            .map(|level| level.iter().map(|n| n.id.clone()).collect())
            .collect()
    }

    #[test]
    fn linear_chain_has_one_node_per_level() {
        let def = definition(
            vec![output("a", "x"), output("b", "x"), output("c", "x")],
            vec![edge("a", "b"), edge("b", "c")],
        );
        let graph = WorkflowGraph::build(&def).unwrap();
        assert_eq!(level_ids(&graph), vec![vec!["a"], vec!["b"], vec!["c"]]);
    }

    #[test]
    fn diamond_groups_siblings() {
        let def = definition(
            vec![output("d", "x"), output("b", "x"), output("a", "x"), output("c", "x")],
            vec![edge("a", "b"), edge("a", "c"), edge("b", "d"), edge("c", "d")],
        );
        let graph = WorkflowGraph::build(&def).unwrap();
        assert_eq!(
            level_ids(&graph),
            vec![vec!["a"], vec!["b", "c"], vec!["d"]]
        );
        assert_eq!(graph.predecessors("d").len(), 2);
        assert!(graph.is_sink("d"));
    }

    #[test]
    fn uneven_paths_use_longest_depth() {
        // a -> b -> c, a -> c: c must wait for b.
        let def = definition(
            vec![output("a", "x"), output("b", "x"), output("c", "x")],
            vec![edge("a", "b"), edge("b", "c"), edge("a", "c")],
        );
        let graph = WorkflowGraph::build(&def).unwrap();
        assert_eq!(graph.level_count(), 3);
    }

    #[test]
    fn independent_nodes_share_first_level() {
        let def = definition(vec![output("a", "x"), output("b", "x")], vec![]);
        let graph = WorkflowGraph::build(&def).unwrap();
        assert_eq!(level_ids(&graph), vec![vec!["a", "b"]]);
    }

    #[test]
    fn cycle_is_rejected() {
        let def = definition(
            vec![output("a", "x"), output("b", "x"), output("c", "x")],
            vec![edge("a", "b"), edge("b", "c"), edge("c", "a")],
        );
        assert!(matches!(
            WorkflowGraph::build(&def),
            Err(ValidationError::CycleDetected(_))
        ));
    }

    #[test]
    fn self_loop_is_rejected() {
        let def = definition(vec![output("a", "x")], vec![edge("a", "a")]);
        assert!(matches!(
            WorkflowGraph::build(&def),
            Err(ValidationError::CycleDetected(id)) if id == "a"
        ));
    }

    #[test]
    fn empty_definition_is_rejected() {
        let def = definition(vec![], vec![]);
        assert_eq!(WorkflowGraph::build(&def).unwrap_err(), ValidationError::Empty);
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let mut second = output("a", "x");
        second["name"] = json!("other");
        let def = definition(vec![output("a", "x"), second], vec![]);
        assert_eq!(
            WorkflowGraph::build(&def).unwrap_err(),
            ValidationError::DuplicateNodeId("a".into())
        );
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let mut second = output("b", "x");
        second["name"] = json!("a");
        let def = definition(vec![output("a", "x"), second], vec![]);
        assert_eq!(
            WorkflowGraph::build(&def).unwrap_err(),
            ValidationError::DuplicateNodeName("a".into())
        );
    }

    #[test]
    fn dangling_edge_is_rejected() {
        let def = definition(vec![output("a", "x")], vec![edge("a", "ghost")]);
        assert!(matches!(
            WorkflowGraph::build(&def),
            Err(ValidationError::UnknownEdgeEndpoint { endpoint, .. }) if endpoint == "ghost"
        ));
    }

    #[test]
    fn reference_to_ancestor_is_accepted() {
        let def = definition(
            vec![output("a", "x"), output("b", "x"), output("c", "{{a.result}} {{b}}")],
            vec![edge("a", "b"), edge("b", "c")],
        );
        assert!(WorkflowGraph::build(&def).is_ok());
    }

    #[test]
    fn reference_to_sibling_is_rejected() {
        let def = definition(
            vec![output("a", "x"), output("b", "x"), output("c", "{{b.result}}")],
            vec![edge("a", "b"), edge("a", "c")],
        );
        assert_eq!(
            WorkflowGraph::build(&def).unwrap_err(),
            ValidationError::ReferenceNotUpstream {
                node: "c".into(),
                producer: "b".into()
            }
        );
    }

    #[test]
    fn reference_to_descendant_or_self_is_rejected() {
        let def = definition(
            vec![output("a", "{{b.result}}"), output("b", "x")],
            vec![edge("a", "b")],
        );
        assert!(matches!(
            WorkflowGraph::build(&def),
            Err(ValidationError::ReferenceNotUpstream { .. })
        ));

        let def = definition(vec![output("a", "{{a.result}}")], vec![]);
        assert!(matches!(
            WorkflowGraph::build(&def),
            Err(ValidationError::ReferenceNotUpstream { .. })
        ));
    }

    #[test]
    fn unknown_reference_is_rejected() {
        let def = definition(vec![output("a", "{{nobody.result}}")], vec![]);
        assert!(matches!(
            WorkflowGraph::build(&def),
            Err(ValidationError::UnknownReference { reference, .. }) if reference == "{{nobody.result}}"
        ));
    }

    #[test]
    fn reserved_global_and_input_references_are_accepted() {
        let def = definition(
            vec![output(
                "a",
                "{{current_date}} {{当前时间}} {{tone}} {{input.topic}} \\{{escaped.x}}",
            )],
            vec![],
        );
        assert!(WorkflowGraph::build(&def).is_ok());
    }

    #[test]
    fn loop_scope_only_inside_loop_nodes() {
        let loop_node = json!({
            "id": "l", "name": "l", "type": "LOOP",
            "config": {"items": "{{tone}}", "itemTemplate": "{{loop.item}}"}
        });
        let def = definition(vec![loop_node], vec![]);
        assert!(WorkflowGraph::build(&def).is_ok());

        let def = definition(vec![output("a", "{{loop.item}}")], vec![]);
        assert!(matches!(
            WorkflowGraph::build(&def),
            Err(ValidationError::UnknownReference { .. })
        ));
    }

    #[test]
    fn condition_handles_are_checked() {
        let condition = json!({
            "id": "c", "name": "c", "type": "CONDITION",
            "config": {"expression": "tone == 'formal'"}
        });
        let mut good = edge("c", "a");
        good["sourceHandle"] = json!("true");
        let def = definition(vec![condition.clone(), output("a", "x")], vec![good]);
        assert!(WorkflowGraph::build(&def).is_ok());

        let mut bad = edge("c", "a");
        bad["sourceHandle"] = json!("maybe");
        let def = definition(vec![condition, output("a", "x")], vec![bad]);
        assert!(matches!(
            WorkflowGraph::build(&def),
            Err(ValidationError::InvalidNodeConfig { .. })
        ));
    }

    #[test]
    fn terminal_nodes_prefer_output_type() {
        let data = json!({
            "id": "d", "name": "d", "type": "DATA", "config": {"source": "x"}
        });
        let def = definition(vec![data.clone(), output("o", "x")], vec![edge("o", "d")]);
        let graph = WorkflowGraph::build(&def).unwrap();
        let terminals: Vec<_> = graph.terminal_nodes().iter().map(|n| n.id.clone()).collect();
        assert_eq!(terminals, vec!["o"]);

        let def = definition(vec![data], vec![]);
        let graph = WorkflowGraph::build(&def).unwrap();
        assert_eq!(graph.terminal_nodes()[0].id, "d");
    }
}
