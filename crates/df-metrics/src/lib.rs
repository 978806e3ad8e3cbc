#![forbid(unsafe_code)]

//! Structural complexity of validated flow graphs.
//!
//! Nodes are the distinct endpoints of the document's edges; parallel edges
//! collapse into one. The cyclomatic figure `E - N + 2` assumes a single
//! connected component with one entry and one exit. Disconnected documents
//! still get the formula applied; [`analyze`] reports the component count so
//! callers can tell when the number is unreliable.

use df_core::Metrics;
use df_parser::GraphDocument;
use petgraph::algo::connected_components;
use petgraph::graphmap::DiGraphMap;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetricsError {
    #[error("edge {index} has an empty endpoint")]
    EmptyEndpoint { index: usize },
    #[error("count {count} does not fit in a signed 64-bit integer")]
    Overflow { count: usize },
}

/// [`Metrics`] plus the structural facts behind them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsReport {
    pub metrics: Metrics,
    /// Weakly connected components among edge endpoints.
    pub components: usize,
    pub self_loops: usize,
    /// Edge statements folded into an existing `(source, destination)` pair.
    pub collapsed_duplicates: usize,
    /// Declared nodes that never appear on an edge and are not counted.
    pub isolated_nodes: usize,
}

impl MetricsReport {
    /// Whether the cyclomatic figure can be read at face value.
    #[must_use]
    pub fn is_single_component(&self) -> bool {
        self.components <= 1
    }
}

/// Node count, edge count and cyclomatic complexity for a document.
///
/// Never fails: an anomaly yields [`Metrics::zeroed`] and a warning.
#[must_use]
pub fn compute_metrics(document: &GraphDocument) -> Metrics {
    analyze(document).metrics
}

/// Full structural report. Degrades the same way as [`compute_metrics`].
#[must_use]
pub fn analyze(document: &GraphDocument) -> MetricsReport {
    let parsed = document.parsed_graph();
    let pairs: Vec<(&str, &str)> = parsed.edge_pairs().collect();

    let mut report = match report_from_edges(&pairs) {
        Ok(report) => report,
        Err(error) => {
            warn!(%error, digest = %document.digest(), "metrics degraded to zero");
            return MetricsReport {
                metrics: Metrics::zeroed(),
                components: 0,
                self_loops: 0,
                collapsed_duplicates: 0,
                isolated_nodes: 0,
            };
        }
    };

    report.isolated_nodes = parsed
        .nodes
        .iter()
        .filter(|node| {
            !pairs
                .iter()
                .any(|(from, to)| *from == node.name || *to == node.name)
        })
        .count();

    if !report.is_single_component() {
        warn!(
            components = report.components,
            "graph has several components; cyclomatic complexity is unreliable"
        );
    }
    debug!(
        nodes = report.metrics.node_count,
        edges = report.metrics.edge_count,
        cyclomatic = report.metrics.cyclomatic_complexity,
        "computed graph metrics"
    );
    report
}

/// Metrics over raw `(source, destination)` pairs.
pub fn metrics_from_edges(pairs: &[(&str, &str)]) -> Result<Metrics, MetricsError> {
    report_from_edges(pairs).map(|report| report.metrics)
}

fn report_from_edges(pairs: &[(&str, &str)]) -> Result<MetricsReport, MetricsError> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for (index, &(from, to)) in pairs.iter().enumerate() {
        if from.is_empty() || to.is_empty() {
            return Err(MetricsError::EmptyEndpoint { index });
        }
        graph.add_edge(from, to, ());
    }

    let node_count = graph.node_count();
    let edge_count = graph.edge_count();
    for count in [node_count, edge_count] {
        if i64::try_from(count).is_err() {
            return Err(MetricsError::Overflow { count });
        }
    }

    let self_loops = graph.all_edges().filter(|(from, to, _)| from == to).count();
    let components = if node_count == 0 {
        0
    } else {
        connected_components(&graph)
    };

    Ok(MetricsReport {
        metrics: Metrics::from_counts(node_count, edge_count),
        components,
        self_loops,
        collapsed_duplicates: pairs.len() - edge_count,
        isolated_nodes: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::{MetricsError, analyze, compute_metrics, metrics_from_edges};
    use df_core::Metrics;
    use df_parser::validate;
    use proptest::prelude::*;

    #[test]
    fn linear_chain_has_complexity_one() {
        let document = validate("digraph G { a -> b; b -> c; }").expect("valid");
        assert_eq!(compute_metrics(&document), Metrics::from_counts(3, 2));
        assert_eq!(compute_metrics(&document).cyclomatic_complexity, 1);
    }

    #[test]
    fn branch_and_merge_adds_a_path() {
        let document = validate(
            "digraph { start -> check; check -> yes [label=\"ok\"]; check -> no; yes -> end; no -> end; }",
        )
        .expect("valid");
        let metrics = compute_metrics(&document);
        assert_eq!(metrics.node_count, 5);
        assert_eq!(metrics.edge_count, 5);
        assert_eq!(metrics.cyclomatic_complexity, 2);
    }

    #[test]
    fn parallel_edges_collapse_and_quotes_are_ignored() {
        let document = validate("digraph { \"a\" -> b; a -> b; a -> a; }").expect("valid");
        let report = analyze(&document);
        assert_eq!(report.metrics.node_count, 2);
        assert_eq!(report.metrics.edge_count, 2);
        assert_eq!(report.collapsed_duplicates, 1);
        assert_eq!(report.self_loops, 1);
    }

    #[test]
    fn subgraph_edges_are_counted() {
        let document =
            validate("digraph { subgraph cluster_a { a -> b } b -> {c d} }").expect("valid");
        let metrics = compute_metrics(&document);
        assert_eq!(metrics.node_count, 4);
        assert_eq!(metrics.edge_count, 3);
    }

    #[test]
    fn disconnected_graph_is_reported() {
        let document = validate("digraph { a -> b; c -> d; lonely; }").expect("valid");
        let report = analyze(&document);
        assert_eq!(report.components, 2);
        assert!(!report.is_single_component());
        assert_eq!(report.isolated_nodes, 1);
        assert_eq!(report.metrics.cyclomatic_complexity, 0);
    }

    #[test]
    fn graph_without_edges_has_empty_counts() {
        let document = validate("digraph { a; b; }").expect("valid");
        let report = analyze(&document);
        assert_eq!(report.metrics, Metrics::from_counts(0, 0));
        assert_eq!(report.components, 0);
        assert_eq!(report.isolated_nodes, 2);
    }

    #[test]
    fn empty_endpoint_is_an_anomaly() {
        assert_eq!(
            metrics_from_edges(&[("a", "b"), ("", "c")]),
            Err(MetricsError::EmptyEndpoint { index: 1 })
        );
    }

    #[test]
    fn report_serializes_in_camel_case() {
        let document = validate("digraph { a -> b }").expect("valid");
        let json = serde_json::to_string(&analyze(&document)).expect("serialize");
        assert!(json.contains("\"collapsedDuplicates\":0"));
        assert!(json.contains("\"nodeCount\":2"));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_formula_holds_for_edge_lists(edges in prop::collection::vec((0_u8..12, 0_u8..12), 0..40)) {
            let names: Vec<(String, String)> = edges
                .iter()
                .map(|(from, to)| (format!("n{from}"), format!("n{to}")))
                .collect();
            let pairs: Vec<(&str, &str)> = names
                .iter()
                .map(|(from, to)| (from.as_str(), to.as_str()))
                .collect();
            let metrics = metrics_from_edges(&pairs).expect("non-empty names");
            prop_assert_eq!(
                metrics.cyclomatic_complexity,
                metrics.edge_count as i64 - metrics.node_count as i64 + 2
            );
            prop_assert!(metrics.edge_count <= pairs.len());
        }
    }
}
