//! Graphviz rendering of every pipeline stage, for the graph output
//! formats. Read-only views; nothing downstream parses these back.

use cobolt_common::utils::strings::ellipsize;
use petgraph::{dot::Dot, graph::Graph as PetGraph};
use std::collections::BTreeMap;

use crate::graph::{FlowGraph, Node, ProgramGraph, SectionId};

/// Render a flow graph to Graphviz dot. When `section` is given, only that
/// section's nodes are included (used for the program-wide statement graph
/// stages; the per-section stages pass `None` and an already-cut graph).
pub fn render_dot(graph: &FlowGraph, pg: &ProgramGraph, section: Option<SectionId>) -> String {
    let mut pet = PetGraph::<String, &'static str>::new();
    let mut index_of = BTreeMap::new();

    for (id, node) in graph.nodes() {
        if let Some(filter) = section {
            // synthetic nodes introduced by later stages carry no section
            // and stay visible in every filter
            if pg.node_sections.get(&id).is_some_and(|s| *s != filter) {
                continue;
            }
        }
        index_of.insert(id, pet.add_node(node_label(pg, node)));
    }

    for (origin, kind, target) in graph.edges() {
        if let (Some(&from), Some(&to)) = (index_of.get(&origin), index_of.get(&target)) {
            pet.add_edge(from, to, kind.label());
        }
    }

    format!("{}", Dot::with_config(&pet, &[]))
}

fn node_label(pg: &ProgramGraph, node: &Node) -> String {
    match node {
        Node::Block { stmts } => {
            let mut lines: Vec<String> =
                stmts.iter().map(|s| ellipsize(&pg.stmt(*s).source.text, 40)).collect();
            if let Some(first) = stmts.first() {
                lines.push(format!("(line {})", pg.stmt(*first).source.from_line));
            }
            // literal \l sequences: graphviz left-aligned line breaks
            lines.join("\\l")
        }
        Node::Branch { condition } => format!("if {}", ellipsize(&condition.text, 40)),
        Node::Join => "join".to_string(),
        Node::SectionEntry { section } => {
            format!("entry {}", pg.section(*section).display_name)
        }
        Node::SectionExit { section } => format!("exit {}", pg.section(*section).display_name),
        Node::LoopHeader { loop_id } => format!("{loop_id}"),
        Node::ContinueMarker { loop_id } => format!("continue {loop_id}"),
        Node::BreakMarker { loop_id, exit_id } => format!("break {loop_id}.{exit_id}"),
        Node::GotoMarker { label } => format!("goto {label}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{builder::build_stmt_graph, reachable::prune_unreachable};
    use cobolt_parser::parse;

    #[test]
    fn test_dot_contains_statements_and_edges() {
        let program = parse(
            "procedure division.\n\
             s section.\n\
             if a = 1 move 1 to b else move 2 to b.\n\
             exit program.\n",
            "test.cbl",
        )
        .expect("source parses");
        let pg = prune_unreachable(&build_stmt_graph(&program).expect("graph builds"));

        let dot = render_dot(&pg.graph, &pg, None);
        assert!(dot.starts_with("digraph {"));
        assert!(dot.contains("if a = 1"));
        assert!(dot.contains("move 1 to b"));
        assert!(dot.contains("true"));
        assert!(dot.contains("false"));
    }

    #[test]
    fn test_section_filter_drops_other_sections() {
        let program = parse(
            "procedure division.\n\
             a section.\n\
             perform b.\n\
             exit program.\n\
             b section.\n\
             move 9 to z.\n",
            "test.cbl",
        )
        .expect("source parses");
        let pg = prune_unreachable(&build_stmt_graph(&program).expect("graph builds"));

        let dot = render_dot(&pg.graph, &pg, Some(SectionId(0)));
        assert!(dot.contains("entry a"));
        assert!(!dot.contains("move 9 to z"));
    }
}
