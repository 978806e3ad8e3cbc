use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::ast::{Attribute, DotGraph, EdgeEndpoint, Id, NodeId, Statement, Subgraph};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphNode {
    pub name: String,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    pub label: Option<String>,
}

/// Flattened node and edge view of a DOT document.
///
/// Nodes are unique and kept in first-appearance order. Edges keep
/// self-loops and parallel edges; chains are expanded pairwise and a
/// subgraph endpoint stands for every node it contains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedGraph {
    pub name: Option<String>,
    pub directed: bool,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub warnings: Vec<String>,
}

impl ParsedGraph {
    #[must_use]
    pub fn from_dot(graph: &DotGraph) -> Self {
        let mut builder = GraphBuilder::default();
        builder.walk(&graph.statements);
        if builder.nodes.is_empty() {
            builder.add_warning("DOT document contains no nodes");
        }
        Self {
            name: graph.id.as_ref().map(node_name),
            directed: graph.directed,
            nodes: builder.nodes,
            edges: builder.edges,
            warnings: builder.warnings,
        }
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edge_pairs(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.edges
            .iter()
            .map(|edge| (edge.from.as_str(), edge.to.as_str()))
    }

    #[must_use]
    pub fn node(&self, name: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|node| node.name == name)
    }
}

impl DotGraph {
    /// Ordered `(source, destination)` pairs for every edge in the document.
    #[must_use]
    pub fn edge_pairs(&self) -> Vec<(String, String)> {
        ParsedGraph::from_dot(self)
            .edges
            .into_iter()
            .map(|edge| (edge.from, edge.to))
            .collect()
    }
}

#[derive(Default)]
struct GraphBuilder {
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
    index_by_name: FxHashMap<String, usize>,
    warnings: Vec<String>,
}

impl GraphBuilder {
    fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Register everything in `statements`, returning the names of the
    /// nodes they mention in first-appearance order.
    fn walk(&mut self, statements: &[Statement]) -> Vec<String> {
        let mut members = Vec::new();
        for statement in statements {
            match statement {
                Statement::Node(node) => {
                    let label = label_of(&node.attributes);
                    if let Some(name) = self.intern(&node.node, label.as_deref()) {
                        push_unique(&mut members, name);
                    }
                }
                Statement::Edge(edge) => {
                    let label = label_of(&edge.attributes);
                    let mut previous = self.endpoint(&edge.head);
                    extend_unique(&mut members, &previous);
                    for (_, endpoint) in &edge.tail {
                        let current = self.endpoint(endpoint);
                        extend_unique(&mut members, &current);
                        for from in &previous {
                            for to in &current {
                                self.edges.push(GraphEdge {
                                    from: from.clone(),
                                    to: to.clone(),
                                    label: label.clone(),
                                });
                            }
                        }
                        previous = current;
                    }
                }
                Statement::Subgraph(subgraph) => {
                    let inner = self.subgraph(subgraph);
                    extend_unique(&mut members, &inner);
                }
                Statement::Attr(_) | Statement::Assign(_) => {}
            }
        }
        members
    }

    fn endpoint(&mut self, endpoint: &EdgeEndpoint) -> Vec<String> {
        match endpoint {
            EdgeEndpoint::Node(node) => self.intern(node, None).into_iter().collect(),
            EdgeEndpoint::Subgraph(subgraph) => self.subgraph(subgraph),
        }
    }

    fn subgraph(&mut self, subgraph: &Subgraph) -> Vec<String> {
        let members = self.walk(&subgraph.statements);
        if members.is_empty() {
            let name = subgraph.id.as_ref().map_or("<anonymous>", Id::text);
            self.add_warning(format!("subgraph {name} has no nodes"));
        }
        members
    }

    fn intern(&mut self, node: &NodeId, label: Option<&str>) -> Option<String> {
        let name = node_name(&node.id);
        if name.trim().is_empty() {
            self.add_warning("encountered empty node identifier; skipped node");
            return None;
        }

        if let Some(&index) = self.index_by_name.get(&name) {
            if let Some(existing) = self.nodes.get_mut(index)
                && existing.label.is_none()
            {
                existing.label = label.map(str::to_string);
            }
            return Some(name);
        }

        self.index_by_name.insert(name.clone(), self.nodes.len());
        self.nodes.push(GraphNode {
            name: name.clone(),
            label: label.map(str::to_string),
        });
        Some(name)
    }
}

fn node_name(id: &Id) -> String {
    id.text().replace("\\\"", "\"").replace('"', "")
}

fn label_of(attributes: &[Attribute]) -> Option<String> {
    attributes
        .iter()
        .rev()
        .find(|attribute| attribute.key.eq_ignore_case("label"))
        .map(|attribute| attribute.value.text().trim().to_string())
        .filter(|label| !label.is_empty())
}

fn push_unique(members: &mut Vec<String>, name: String) {
    if !members.contains(&name) {
        members.push(name);
    }
}

fn extend_unique(members: &mut Vec<String>, names: &[String]) {
    for name in names {
        push_unique(members, name.clone());
    }
}
