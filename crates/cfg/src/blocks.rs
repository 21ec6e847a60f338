//! Stage 3: the collapsed structure graph.
//!
//! Maximal linear chains of statement nodes become single block nodes, and
//! explicit `Join` nodes canonicalize every merge point, so the interesting
//! nodes left are branches, joins and perform points. This stage also cuts
//! the per-section views the loop stages operate on.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use tracing::debug;

use crate::graph::{EdgeKind, FlowGraph, Node, NodeId, ProgramGraph, SectionId};

/// Collapse linear chains and insert join nodes, producing a fresh graph.
pub fn build_structure_graph(pg: &ProgramGraph) -> ProgramGraph {
    let mut result = pg.clone();
    let graph = &mut result.graph;

    // Canonicalize merges: any statement or branch node with ≥2 in-edges
    // gets an explicit Join in front of it.
    let candidates: Vec<NodeId> = graph
        .node_ids()
        .filter(|id| {
            matches!(graph.node(*id), Node::Block { .. } | Node::Branch { .. }) &&
                graph.in_degree(*id) >= 2
        })
        .collect();
    for id in candidates {
        let preds: Vec<_> = graph.predecessors(id).collect();
        let join = graph.add_node(Node::Join);
        if let Some(section) = result.node_sections.get(&id).copied() {
            result.node_sections.insert(join, section);
        }
        for (origin, kind) in preds {
            graph.add_edge(origin, kind, join);
        }
        graph.add_edge(join, EdgeKind::Fall, id);
        // a paragraph entry that gained a join keeps its label on the join
        if let Some(name) = result.para_entries.remove(&id) {
            result.para_entries.insert(join, name);
        }
    }

    // Collapse chains: block → (Fall) → block with a single in-edge and a
    // single Fall out-edge. Branch, join, section and perform boundaries
    // all fail the criteria and stop the chain.
    let ids: Vec<NodeId> = graph.node_ids().collect();
    for id in ids {
        if !graph.contains(id) || !matches!(graph.node(id), Node::Block { .. }) {
            continue;
        }
        loop {
            let Some((EdgeKind::Fall, succ)) = graph.single_successor(id) else { break };
            if succ == id || graph.in_degree(succ) != 1 {
                break;
            }
            let Node::Block { stmts: succ_stmts } = graph.node(succ).clone() else { break };
            let Some((EdgeKind::Fall, succ_target)) = graph.single_successor(succ) else {
                break;
            };
            if succ_target == succ {
                break;
            }

            graph.remove_node(succ);
            result.node_sections.remove(&succ);
            match graph.node_mut(id) {
                Node::Block { stmts } => stmts.extend(succ_stmts),
                _ => unreachable!("chain head is a block"),
            }
            graph.add_edge(id, EdgeKind::Fall, succ_target);
        }
    }

    debug!(nodes = result.graph.len(), "structure graph built");
    result
}

/// One section's slice of the structure graph, rooted at its entry. Perform
/// call edges are not part of the view (a perform is an opaque sequential
/// node within its section); jumps leaving the section degrade to terminal
/// [`Node::GotoMarker`]s.
#[derive(Debug, Clone)]
pub struct SectionGraph {
    pub section: SectionId,
    pub graph: FlowGraph,
    pub entry: NodeId,
    /// The section's exit node id; only present in the graph when some path
    /// actually reaches it.
    pub exit: NodeId,
}

/// Cut per-section views from the structure graph, in section order.
/// Sections whose entry was pruned (never reached) yield no view.
pub fn section_views(pg: &ProgramGraph) -> Vec<SectionGraph> {
    let mut views = Vec::new();

    for info in &pg.sections {
        if !pg.graph.contains(info.entry) {
            continue;
        }

        let mut in_view = BTreeSet::new();
        let mut foreign_jumps: Vec<(NodeId, EdgeKind, NodeId)> = Vec::new();
        let mut queue = VecDeque::new();
        queue.push_back(info.entry);

        while let Some(node) = queue.pop_front() {
            if !in_view.insert(node) {
                continue;
            }
            for (kind, target) in pg.graph.successors(node) {
                if kind == EdgeKind::PerformCall {
                    continue;
                }
                let same_section = pg.node_sections.get(&target) == Some(&info.id);
                if same_section {
                    if !in_view.contains(&target) {
                        queue.push_back(target);
                    }
                } else {
                    foreign_jumps.push((node, kind, target));
                }
            }
        }

        let mut graph = pg.graph.restricted_to(&in_view);

        // perform nodes keep only their return edge inside the view
        let calls: Vec<(NodeId, EdgeKind)> = graph
            .edges()
            .filter(|(_, kind, _)| *kind == EdgeKind::PerformCall)
            .map(|(origin, kind, _)| (origin, kind))
            .collect();
        for (origin, kind) in calls {
            graph.remove_edge(origin, kind);
        }

        let mut markers: BTreeMap<NodeId, NodeId> = BTreeMap::new();
        for (origin, kind, target) in foreign_jumps {
            let marker = *markers.entry(target).or_insert_with(|| {
                graph.add_node(Node::GotoMarker { label: pg.label_for(&pg.graph, target) })
            });
            graph.add_edge(origin, kind, marker);
        }

        views.push(SectionGraph { section: info.id, graph, entry: info.entry, exit: info.exit });
    }

    views
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{builder::build_stmt_graph, reachable::prune_unreachable};
    use cobolt_parser::parse;

    fn structure(source: &str) -> ProgramGraph {
        let program = parse(source, "test.cbl").expect("source parses");
        let pg = build_stmt_graph(&program).expect("graph builds");
        build_structure_graph(&prune_unreachable(&pg))
    }

    #[test]
    fn test_linear_run_collapses_to_one_block() {
        let pg = structure(
            "procedure division.\n\
             s section.\n\
             move 1 to a.\n\
             move 2 to b.\n\
             display a.\n\
             exit program.\n",
        );

        let entry = pg.sections[0].entry;
        let (_, block) = pg.graph.single_successor(entry).expect("entry edge");
        let Node::Block { stmts } = pg.graph.node(block) else { panic!("collapsed block") };
        // the three sequential statements merged; `exit program` is terminal
        // and stays its own node
        assert_eq!(stmts.len(), 3);
    }

    #[test]
    fn test_chains_stop_at_perform_boundaries() {
        let pg = structure(
            "procedure division.\n\
             s section.\n\
             move 1 to a.\n\
             perform helper.\n\
             move 2 to b.\n\
             exit program.\n\
             helper section.\n\
             move 9 to z.\n",
        );

        let entry = pg.sections[0].entry;
        let (_, first) = pg.graph.single_successor(entry).expect("entry edge");
        let Node::Block { stmts } = pg.graph.node(first) else { panic!("block") };
        assert_eq!(stmts.len(), 1, "collapse must not swallow the perform");
    }

    #[test]
    fn test_join_inserted_at_merge_point() {
        let pg = structure(
            "procedure division.\n\
             s section.\n\
             if a = 1 move 1 to b else move 2 to b.\n\
             move 3 to c.\n\
             exit program.\n",
        );

        let joins: Vec<NodeId> = pg
            .graph
            .node_ids()
            .filter(|id| matches!(pg.graph.node(*id), Node::Join))
            .collect();
        assert_eq!(joins.len(), 1);
        assert_eq!(pg.graph.in_degree(joins[0]), 2);
        assert_eq!(pg.graph.out_degree(joins[0]), 1);
    }

    #[test]
    fn test_section_view_replaces_foreign_jump_with_marker() {
        let pg = structure(
            "procedure division.\n\
             a section.\n\
             if x = 1 go to elsewhere.\n\
             exit program.\n\
             b section.\n\
             elsewhere.\n\
             move 1 to y.\n\
             exit program.\n",
        );

        let views = section_views(&pg);
        assert_eq!(views.len(), 2);

        let a = &views[0];
        let markers: Vec<NodeId> = a
            .graph
            .node_ids()
            .filter(|id| matches!(a.graph.node(*id), Node::GotoMarker { .. }))
            .collect();
        assert_eq!(markers.len(), 1);
        let Node::GotoMarker { label } = a.graph.node(markers[0]) else { panic!() };
        assert_eq!(label, "elsewhere");
    }

    #[test]
    fn test_section_view_has_no_perform_call_edges() {
        let pg = structure(
            "procedure division.\n\
             s section.\n\
             perform helper.\n\
             exit program.\n\
             helper section.\n\
             move 9 to z.\n",
        );

        let views = section_views(&pg);
        for view in &views {
            assert!(view
                .graph
                .edges()
                .all(|(_, kind, _)| kind != EdgeKind::PerformCall));
        }
    }
}
