//! Stage 5: loop scopes and exits.
//!
//! Works innermost-first so an inner loop's markers are already part of the
//! enclosing scope when the outer loop is examined. Every edge leaving a
//! scope is rewritten to a terminal break marker; the original targets are
//! kept on the loop as its continuation points. A loop whose single exit
//! sits on a header-adjacent branch is marked as a `while` candidate.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::{
    graph::{EdgeKind, FlowGraph, Node, NodeId, ProgramGraph},
    loops::{AcyclicGraph, LoopExit, WhileInfo},
};

/// Compute scopes, rewrite exit edges to break markers, and detect `while`
/// candidates. Produces a fresh graph; the input stays untouched.
pub fn build_scopes(acyclic: &AcyclicGraph, pg: &ProgramGraph) -> AcyclicGraph {
    let mut out = acyclic.clone();

    // Innermost first: smaller scopes before the loops containing them.
    let mut order: Vec<usize> = (0..out.loops.len()).collect();
    order.sort_by_key(|&i| (out.loops[i].body.len(), out.loops[i].id));

    for idx in order {
        let scope = out.loops[idx].body.clone();
        let loop_id = out.loops[idx].id;

        // Edges leaving the scope. Markers are terminal, so edges already
        // rewritten by inner loops never show up here.
        let exit_edges: Vec<(NodeId, EdgeKind, NodeId)> = out
            .graph
            .edges()
            .filter(|(u, _, t)| scope.contains(u) && !scope.contains(t))
            .collect();

        // Distinct targets in textual order become the exit list.
        let mut targets: Vec<NodeId> =
            exit_edges.iter().map(|(_, _, t)| *t).collect::<BTreeSet<_>>().into_iter().collect();
        targets.sort_by_key(|t| (pg.node_line(&out.graph, *t), *t));

        let mut markers: BTreeMap<NodeId, NodeId> = BTreeMap::new();
        for (exit_id, target) in targets.iter().enumerate() {
            let marker = out
                .graph
                .add_node(Node::BreakMarker { loop_id, exit_id: exit_id as u32 });
            markers.insert(*target, marker);
            out.loops[idx].exits.push(LoopExit {
                exit_id: exit_id as u32,
                marker,
                target: *target,
            });

            // The marker belongs to this scope and every enclosing one.
            let original_header = out.loops[idx].original_header;
            out.loops[idx].body.insert(marker);
            for other in 0..out.loops.len() {
                if other != idx && out.loops[other].body.contains(&original_header) {
                    out.loops[other].body.insert(marker);
                }
            }
        }

        for (origin, kind, target) in &exit_edges {
            out.graph.add_edge(*origin, *kind, markers[target]);
        }

        // `while` candidate: one exit edge, sitting on the branch adjacent
        // to the header, with the other arm staying in scope.
        if let [(origin, kind, _)] = exit_edges.as_slice() {
            let original_header = out.loops[idx].original_header;
            if header_adjacent_branch(&out.graph, original_header) == Some(*origin) {
                let other_kind = match kind {
                    EdgeKind::True => Some(EdgeKind::False),
                    EdgeKind::False => Some(EdgeKind::True),
                    _ => None,
                };
                if let Some(other_kind) = other_kind {
                    let body_entry = out
                        .graph
                        .successor(*origin, other_kind)
                        .filter(|t| out.loops[idx].body.contains(t));
                    if let Some(body_entry) = body_entry {
                        let Node::Branch { condition } = out.graph.node(*origin) else {
                            unreachable!("header-adjacent node is a branch");
                        };
                        let condition = condition.clone();
                        out.loops[idx].while_info = Some(WhileInfo {
                            condition,
                            invert: *kind == EdgeKind::True,
                            body_entry,
                        });
                    }
                }
            }
        }
    }

    debug!(
        section = out.section.0,
        loops = out.loops.len(),
        whiles = out.loops.iter().filter(|l| l.while_info.is_some()).count(),
        "scope graph built"
    );

    out
}

/// The branch reached from the loop header through joins alone, with no
/// statements in between; its condition can become a `while` test.
fn header_adjacent_branch(graph: &FlowGraph, header: NodeId) -> Option<NodeId> {
    let mut cur = header;
    let mut seen = BTreeSet::new();
    loop {
        if !seen.insert(cur) {
            return None;
        }
        match graph.node(cur) {
            Node::Branch { .. } => return Some(cur),
            Node::Join => {
                let (kind, next) = graph.single_successor(cur)?;
                if kind != EdgeKind::Fall {
                    return None;
                }
                cur = next;
            }
            Node::Block { stmts } if stmts.is_empty() => {
                let (_, next) = graph.single_successor(cur)?;
                cur = next;
            }
            _ => return None,
        }
    }
}
