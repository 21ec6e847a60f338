//! Stage 4: find natural loops and rewrite each section into a DAG.
//!
//! Back edges are found with a dominator analysis, natural loops collected
//! by backward reachability, and every back edge replaced by a terminal
//! continue marker behind a synthetic loop header. Cycles that are not
//! natural loops degrade to goto-only regions instead of failing.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use cobolt_common::diagnostics::{DiagnosticKind, Diagnostics};
use cobolt_parser::syntax::Source;
use petgraph::{
    algo::{dominators, tarjan_scc},
    graph::{Graph as PetGraph, NodeIndex},
};
use tracing::debug;

use crate::{
    blocks::SectionGraph,
    graph::{EdgeKind, FlowGraph, LoopId, Node, NodeId, ProgramGraph, SectionId},
};

/// A loop whose sole exit sits on a header-adjacent branch, rendered as
/// `while` instead of `forever`.
#[derive(Debug, Clone)]
pub struct WhileInfo {
    pub condition: Source,
    /// True when the loop continues on the branch's false arm.
    pub invert: bool,
    pub body_entry: NodeId,
}

/// One distinct target outside a loop's scope, reached from inside it.
#[derive(Debug, Clone)]
pub struct LoopExit {
    pub exit_id: u32,
    pub marker: NodeId,
    /// The continuation point the marker stands in for.
    pub target: NodeId,
}

/// A recovered natural loop.
#[derive(Debug, Clone)]
pub struct Loop {
    pub id: LoopId,
    /// The synthetic [`Node::LoopHeader`] guarding the loop.
    pub header: NodeId,
    pub original_header: NodeId,
    /// Loop scope: every node the loop owns, synthetic markers included.
    pub body: BTreeSet<NodeId>,
    /// Back-edge origins, earliest textual position first.
    pub back_edge_origins: Vec<NodeId>,
    pub continue_marker: NodeId,
    pub parent: Option<LoopId>,
    /// Filled by the scope stage.
    pub exits: Vec<LoopExit>,
    /// Filled by the scope stage.
    pub while_info: Option<WhileInfo>,
}

/// A per-section acyclic graph with its recovered loops.
#[derive(Debug, Clone)]
pub struct AcyclicGraph {
    pub section: SectionId,
    pub graph: FlowGraph,
    pub entry: NodeId,
    pub exit: NodeId,
    /// Loops indexed by position; ids are program-wide.
    pub loops: Vec<Loop>,
    /// Nodes of irreducible regions, flattened as labeled gotos.
    pub goto_only: BTreeSet<NodeId>,
}

impl AcyclicGraph {
    pub fn loop_by_id(&self, id: LoopId) -> Option<&Loop> {
        self.loops.iter().find(|l| l.id == id)
    }

    pub fn loop_at_header(&self, node: NodeId) -> Option<&Loop> {
        self.loops.iter().find(|l| l.header == node)
    }
}

/// Recover loops in one section view. `next_loop_id` is shared across
/// sections so loop ids are unique program-wide.
pub fn build_acyclic(
    view: &SectionGraph,
    pg: &ProgramGraph,
    next_loop_id: &mut u32,
    diagnostics: &mut Diagnostics,
) -> AcyclicGraph {
    let pet = view.graph.petgraph_view();
    let entry_idx = pet.index_of[&view.entry];
    let doms = dominators::simple_fast(&pet.graph, entry_idx);

    let dominates = |a: NodeId, b: NodeId| -> bool {
        let (a, b) = (pet.index_of[&a], pet.index_of[&b]);
        doms.dominators(b).map(|mut chain| chain.any(|d| d == a)).unwrap_or(false)
    };

    // Back edge: u → v where v dominates u.
    let back_edges: Vec<(NodeId, EdgeKind, NodeId)> =
        view.graph.edges().filter(|(u, _, v)| dominates(*v, *u)).collect();

    // Natural loop per back-edge target: the target plus everything that
    // reaches an origin without passing through the target.
    let mut natural: BTreeMap<NodeId, (BTreeSet<NodeId>, Vec<NodeId>)> = BTreeMap::new();
    for (u, _, v) in &back_edges {
        let (body, origins) = natural.entry(*v).or_default();
        body.insert(*v);
        origins.push(*u);
        if u != v {
            let mut queue = VecDeque::new();
            body.insert(*u);
            queue.push_back(*u);
            while let Some(cur) = queue.pop_front() {
                for (pred, _) in view.graph.predecessors(cur) {
                    if body.insert(pred) && pred != *v {
                        queue.push_back(pred);
                    }
                }
            }
        }
    }

    let mut goto_only: BTreeSet<NodeId> = BTreeSet::new();

    // Overlapping loops where neither header dominates the other are
    // irreducible; both degrade.
    let headers: Vec<NodeId> = natural.keys().copied().collect();
    let mut degraded: BTreeSet<NodeId> = BTreeSet::new();
    for (i, &h1) in headers.iter().enumerate() {
        for &h2 in &headers[i + 1..] {
            let (b1, _) = &natural[&h1];
            let (b2, _) = &natural[&h2];
            if b1.intersection(b2).next().is_some() && !dominates(h1, h2) && !dominates(h2, h1) {
                degraded.insert(h1);
                degraded.insert(h2);
            }
        }
    }
    for header in &degraded {
        let (body, _) = &natural[header];
        report_irreducible(pg, &view.graph, body, diagnostics);
        goto_only.extend(body.iter().copied());
    }
    natural.retain(|header, _| !degraded.contains(header));

    // Residual cycles that survive back-edge deletion are irreducible too
    // (multi-entry cycles have no back edge at all).
    let back_edge_set: BTreeSet<(NodeId, EdgeKind)> =
        back_edges.iter().map(|(u, k, _)| (*u, *k)).collect();
    for component in residual_sccs(&view.graph, &back_edge_set) {
        if component.iter().any(|n| !goto_only.contains(n)) {
            report_irreducible(pg, &view.graph, &component, diagnostics);
        }
        goto_only.extend(component.iter().copied());
    }

    // A loop tangled with an irreducible region degrades with it.
    let tangled: Vec<NodeId> = natural
        .iter()
        .filter(|(_, (body, _))| body.intersection(&goto_only).next().is_some())
        .map(|(header, _)| *header)
        .collect();
    for header in tangled {
        let (body, _) = natural.remove(&header).expect("header was just found");
        report_irreducible(pg, &view.graph, &body, diagnostics);
        goto_only.extend(body);
    }

    // Assign ids in deterministic preorder of headers.
    let preorder = dfs_preorder(&view.graph, view.entry);
    let mut ordered_headers: Vec<NodeId> = natural.keys().copied().collect();
    ordered_headers.sort_by_key(|h| (preorder.get(h).copied().unwrap_or(usize::MAX), *h));

    let mut loops: Vec<Loop> = Vec::new();
    let mut graph = view.graph.clone();
    let mut entry = view.entry;

    for header in ordered_headers {
        let (body, mut origins) = natural.remove(&header).expect("header is pending");
        origins.sort_by_key(|n| (pg.node_line(&view.graph, *n), *n));
        origins.dedup();
        let id = LoopId(*next_loop_id);
        *next_loop_id += 1;
        loops.push(Loop {
            id,
            header: NodeId(u32::MAX), // patched during the rewrite below
            original_header: header,
            body,
            back_edge_origins: origins,
            continue_marker: NodeId(u32::MAX),
            parent: None,
            exits: Vec::new(),
            while_info: None,
        });
    }

    // Rewrite outermost-first so synthetic nodes land in enclosing bodies.
    let mut rewrite_order: Vec<usize> = (0..loops.len()).collect();
    rewrite_order.sort_by_key(|&i| (std::cmp::Reverse(loops[i].body.len()), loops[i].id));

    for idx in rewrite_order {
        let original_header = loops[idx].original_header;
        let body = loops[idx].body.clone();

        let header = graph.add_node(Node::LoopHeader { loop_id: loops[idx].id });
        let marker = graph.add_node(Node::ContinueMarker { loop_id: loops[idx].id });

        // Redirect outside entries to the new header.
        let preds: Vec<(NodeId, EdgeKind)> = graph.predecessors(original_header).collect();
        for (pred, kind) in preds {
            if !body.contains(&pred) {
                graph.add_edge(pred, kind, header);
            }
        }
        graph.add_edge(header, EdgeKind::Fall, original_header);
        if entry == original_header {
            entry = header;
        }

        // Replace back edges with continue markers.
        for origin in loops[idx].back_edge_origins.clone() {
            let kinds: Vec<EdgeKind> = graph
                .successors(origin)
                .filter(|(_, t)| *t == original_header)
                .map(|(k, _)| k)
                .collect();
            for kind in kinds {
                graph.add_edge(origin, kind, marker);
            }
        }

        loops[idx].header = header;
        loops[idx].continue_marker = marker;
        loops[idx].body.insert(header);
        loops[idx].body.insert(marker);
        for other in 0..loops.len() {
            if other != idx && loops[other].body.contains(&original_header) {
                loops[other].body.insert(header);
                loops[other].body.insert(marker);
            }
        }
    }

    // Nesting parents: the smallest enclosing body wins.
    for i in 0..loops.len() {
        let mut parent: Option<(usize, LoopId)> = None;
        for j in 0..loops.len() {
            if i == j || !loops[j].body.contains(&loops[i].original_header) {
                continue;
            }
            if loops[j].body.contains(&loops[i].header) || loops[j].body.len() > loops[i].body.len()
            {
                match parent {
                    Some((size, _)) if loops[j].body.len() >= size => {}
                    _ => parent = Some((loops[j].body.len(), loops[j].id)),
                }
            }
        }
        loops[i].parent = parent.map(|(_, id)| id);
    }

    debug!(
        section = view.section.0,
        loops = loops.len(),
        goto_only = goto_only.len(),
        "loop recovery done"
    );

    AcyclicGraph { section: view.section, graph, entry, exit: view.exit, loops, goto_only }
}

fn report_irreducible(
    pg: &ProgramGraph,
    graph: &FlowGraph,
    nodes: &BTreeSet<NodeId>,
    diagnostics: &mut Diagnostics,
) {
    let line = nodes.iter().map(|n| pg.node_line(graph, *n)).filter(|l| *l > 0).min().unwrap_or(0);
    diagnostics.report(
        DiagnosticKind::IrreducibleControlFlow,
        line,
        format!("irreducible control flow over {} nodes; emitting labeled gotos", nodes.len()),
    );
}

/// Strongly connected components of the graph with `skip_edges` removed,
/// keeping only genuine cycles (≥2 nodes, or a self-edge).
fn residual_sccs(
    graph: &FlowGraph,
    skip_edges: &BTreeSet<(NodeId, EdgeKind)>,
) -> Vec<BTreeSet<NodeId>> {
    let mut pet = PetGraph::<NodeId, ()>::new();
    let mut index_of: BTreeMap<NodeId, NodeIndex> = BTreeMap::new();
    for id in graph.node_ids() {
        index_of.insert(id, pet.add_node(id));
    }
    let mut self_edges: BTreeSet<NodeId> = BTreeSet::new();
    for (origin, kind, target) in graph.edges() {
        if skip_edges.contains(&(origin, kind)) {
            continue;
        }
        if origin == target {
            self_edges.insert(origin);
        }
        pet.add_edge(index_of[&origin], index_of[&target], ());
    }

    tarjan_scc(&pet)
        .into_iter()
        .filter(|scc| scc.len() > 1 || self_edges.contains(&pet[scc[0]]))
        .map(|scc| scc.into_iter().map(|idx| pet[idx]).collect())
        .collect()
}

/// DFS preorder numbering with successors visited in edge-kind order.
fn dfs_preorder(graph: &FlowGraph, entry: NodeId) -> BTreeMap<NodeId, usize> {
    let mut order = BTreeMap::new();
    let mut stack = vec![entry];
    while let Some(node) = stack.pop() {
        if order.contains_key(&node) {
            continue;
        }
        order.insert(node, order.len());
        let succs: Vec<NodeId> = graph.successors(node).map(|(_, t)| t).collect();
        for target in succs.into_iter().rev() {
            if !order.contains_key(&target) {
                stack.push(target);
            }
        }
    }
    order
}
