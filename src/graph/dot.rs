//! GraphViz export

use petgraph::graph::DiGraph;
use petgraph::visit::EdgeRef;

use super::{TransformationEdge, TypeNode};

const ACTIVE_COLOR: &str = "#00BCD4";
const INACTIVE_COLOR: &str = "#607D8B";

pub(super) fn render(graph: &DiGraph<TypeNode, TransformationEdge>) -> String {
    let mut output = String::new();

    output.push_str("digraph TransformationGraph {\n");
    output.push_str("  rankdir=LR;\n");
    output.push_str("  node [shape=box, style=\"filled,rounded\", fontname=\"Helvetica\", fontsize=10, fontcolor=\"white\"];\n");
    output.push_str("  edge [fontname=\"Helvetica\", fontsize=8];\n");
    output.push('\n');

    for idx in graph.node_indices() {
        let node = &graph[idx];
        let color = if node.active { ACTIVE_COLOR } else { INACTIVE_COLOR };
        output.push_str(&format!(
            "  n{} [label=\"{}\", fillcolor=\"{}\"];\n",
            idx.index(),
            escape(&node.type_id),
            color
        ));
    }

    output.push('\n');

    for edge in graph.edge_references() {
        let label = match &edge.weight().file_name {
            Some(file) => format!("{}\\n{}", escape(&edge.weight().id), escape(file)),
            None => escape(&edge.weight().id),
        };
        output.push_str(&format!(
            "  n{} -> n{} [label=\"{}\"];\n",
            edge.source().index(),
            edge.target().index(),
            label
        ));
    }

    output.push_str("}\n");
    output
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::super::TransformationGraph;
    use crate::transformation::TransformationDescription;

    #[test]
    fn test_dot_lists_nodes_and_edges() {
        let graph = TransformationGraph::new();
        graph.add_type("A");
        graph.add_transformation(TransformationDescription::new("A", "B").with_file_name("x.transformation"));
        let dot = graph.to_dot();
        assert!(dot.starts_with("digraph TransformationGraph {"));
        assert!(dot.contains("label=\"A\", fillcolor=\"#00BCD4\""));
        assert!(dot.contains("n0 -> n1 [label=\"internal-1\\nx.transformation\"]"));
    }
}
