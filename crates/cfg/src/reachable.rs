//! Stage 2: forward reachability from the program entry.
//!
//! Everything reachable survives into a fresh graph; unreachable statements
//! are kept in a side list and reported, never silently dropped. The
//! `PerformReturn` edge of a perform node is traversed like any other edge:
//! reaching the perform node is what "entering the call" means here, so the
//! return site becomes reachable exactly when the call does.

use std::collections::{BTreeSet, VecDeque};

use cobolt_common::diagnostics::DiagnosticKind;
use tracing::debug;

use crate::graph::{Node, ProgramGraph, SectionId, StmtId};

/// Produce the subgraph reachable from the program entry. Unreachable
/// statement ids are recorded on the result and reported per section.
pub fn prune_unreachable(pg: &ProgramGraph) -> ProgramGraph {
    let mut reachable = BTreeSet::new();
    let mut queue = VecDeque::new();
    queue.push_back(pg.entry);

    while let Some(node) = queue.pop_front() {
        if !reachable.insert(node) {
            continue;
        }
        for (_, target) in pg.graph.successors(node) {
            if !reachable.contains(&target) {
                queue.push_back(target);
            }
        }
    }

    let mut unreachable_stmts: Vec<StmtId> = Vec::new();
    for (id, node) in pg.graph.nodes() {
        if reachable.contains(&id) {
            continue;
        }
        if let Node::Block { stmts } = node {
            unreachable_stmts.extend(stmts.iter().copied());
        }
    }
    unreachable_stmts
        .sort_by_key(|s| (pg.stmt(*s).source.from_line, pg.stmt(*s).source.from_col));

    let mut result = pg.clone();
    result.graph = pg.graph.restricted_to(&reachable);
    result.node_sections.retain(|id, _| reachable.contains(id));
    result.para_entries.retain(|id, _| reachable.contains(id));
    result.unreachable = unreachable_stmts;

    // one report per section that lost statements
    let mut by_section: Vec<(SectionId, usize, u32)> = Vec::new();
    for stmt_id in &result.unreachable {
        let stmt = pg.stmt(*stmt_id);
        match by_section.iter_mut().find(|(s, _, _)| *s == stmt.section) {
            Some((_, count, _)) => *count += 1,
            None => by_section.push((stmt.section, 1, stmt.source.from_line)),
        }
    }
    for (section, count, line) in by_section {
        result.diagnostics.report(
            DiagnosticKind::UnreachableCode,
            line,
            format!(
                "{} unreachable statement{} in section {}",
                count,
                if count == 1 { "" } else { "s" },
                pg.section(section).display_name
            ),
        );
    }

    debug!(
        reachable = result.graph.len(),
        pruned = pg.graph.len() - result.graph.len(),
        "reachability pruning done"
    );

    result
}
