//! The arena flow graph shared by every pipeline stage.
//!
//! Nodes live in an id-indexed arena and edges store ids, never ownership
//! handles, so cyclic graphs need no special treatment. A node has at most
//! one outgoing edge per kind; an edge is identified by `(origin, kind)`.
//! Stages clone into fresh graphs instead of mutating earlier ones, and a
//! node keeps its id through every stage.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use cobolt_common::diagnostics::Diagnostics;
use cobolt_parser::syntax::Source;
use petgraph::graph::{Graph as PetGraph, NodeIndex};
use serde::Serialize;

/// Stable identifier of a graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Identifier of a leaf statement in the program arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct StmtId(pub u32);

/// Identifier of a recovered loop; assigned in deterministic preorder of
/// headers across the whole program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct LoopId(pub u32);

impl fmt::Display for LoopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loop{}", self.0)
    }
}

/// Index of a section in program order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SectionId(pub u32);

/// The leaf shape of one COBOL statement after graph construction. `If`
/// statements do not appear here: their condition lives on a `Branch` node
/// and their bodies become graph structure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum LeafKind {
    Move,
    Other { verb: String },
    Perform { target: String },
    GoTo { target: String },
    NextSentence,
    ExitSection,
    ExitProgram,
}

impl LeafKind {
    /// A statement that transfers control rather than doing work; these are
    /// absorbed into structure and suppressed from code output.
    pub fn is_transfer(&self) -> bool {
        !matches!(self, LeafKind::Move | LeafKind::Other { .. } | LeafKind::Perform { .. })
    }
}

/// One leaf statement in the per-program arena.
#[derive(Debug, Clone, Serialize)]
pub struct StmtInfo {
    pub kind: LeafKind,
    pub source: Source,
    pub section: SectionId,
}

/// Graph node variants.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// One statement, or a collapsed linear run of statements.
    Block { stmts: Vec<StmtId> },
    /// A two-way conditional carrying its opaque condition text.
    Branch { condition: Source },
    /// Explicit merge point: ≥2 in-edges, exactly one out-edge.
    Join,
    /// Synthetic section start; one outgoing edge.
    SectionEntry { section: SectionId },
    /// Synthetic section end; terminal.
    SectionExit { section: SectionId },
    /// Single entry of a recovered loop.
    LoopHeader { loop_id: LoopId },
    /// Terminal stand-in for a back edge.
    ContinueMarker { loop_id: LoopId },
    /// Terminal stand-in for an edge leaving a loop scope.
    BreakMarker { loop_id: LoopId, exit_id: u32 },
    /// Residual unstructured jump.
    GotoMarker { label: String },
}

impl Node {
    /// Terminal nodes have no outgoing edges by construction.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Node::SectionExit { .. } |
                Node::ContinueMarker { .. } |
                Node::BreakMarker { .. } |
                Node::GotoMarker { .. }
        )
    }
}

/// Edge kinds. A node has at most one outgoing edge of each kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum EdgeKind {
    /// Sequential fallthrough.
    Fall,
    /// Branch taken.
    True,
    /// Branch not taken.
    False,
    /// `go to` / `next sentence` transfer.
    Jump,
    /// `perform` into the callee entry.
    PerformCall,
    /// Return to the statement following the `perform`. Kept on the perform
    /// node itself so returns from different call sites never mix.
    PerformReturn,
}

impl EdgeKind {
    pub fn label(&self) -> &'static str {
        match self {
            EdgeKind::Fall => "",
            EdgeKind::True => "true",
            EdgeKind::False => "false",
            EdgeKind::Jump => "jump",
            EdgeKind::PerformCall => "perform",
            EdgeKind::PerformReturn => "return",
        }
    }
}

/// The arena graph. Iteration orders are deterministic everywhere: node ids
/// ascend, edges sort by `(origin, kind)`.
#[derive(Debug, Clone, Default)]
pub struct FlowGraph {
    nodes: BTreeMap<NodeId, Node>,
    succs: BTreeMap<NodeId, BTreeMap<EdgeKind, NodeId>>,
    preds: BTreeMap<NodeId, BTreeSet<(NodeId, EdgeKind)>>,
    next_id: u32,
}

impl FlowGraph {
    pub fn new() -> Self {
        FlowGraph::default()
    }

    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, node);
        id
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        self.nodes.get(&id).unwrap_or_else(|| panic!("node {id} not in graph"))
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes.get_mut(&id).unwrap_or_else(|| panic!("node {id} not in graph"))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().map(|(id, node)| (*id, node))
    }

    /// Add or replace the `(origin, kind)` edge.
    pub fn add_edge(&mut self, origin: NodeId, kind: EdgeKind, target: NodeId) {
        if let Some(old) = self.succs.entry(origin).or_default().insert(kind, target) {
            if let Some(preds) = self.preds.get_mut(&old) {
                preds.remove(&(origin, kind));
            }
        }
        self.preds.entry(target).or_default().insert((origin, kind));
    }

    pub fn remove_edge(&mut self, origin: NodeId, kind: EdgeKind) {
        if let Some(target) = self.succs.get_mut(&origin).and_then(|m| m.remove(&kind)) {
            if let Some(preds) = self.preds.get_mut(&target) {
                preds.remove(&(origin, kind));
            }
        }
    }

    /// Remove a node together with every edge touching it.
    pub fn remove_node(&mut self, id: NodeId) {
        let out: Vec<EdgeKind> =
            self.succs.get(&id).map(|m| m.keys().copied().collect()).unwrap_or_default();
        for kind in out {
            self.remove_edge(id, kind);
        }
        let inc: Vec<(NodeId, EdgeKind)> =
            self.preds.get(&id).map(|s| s.iter().copied().collect()).unwrap_or_default();
        for (origin, kind) in inc {
            self.remove_edge(origin, kind);
        }
        self.succs.remove(&id);
        self.preds.remove(&id);
        self.nodes.remove(&id);
    }

    pub fn successors(&self, id: NodeId) -> impl Iterator<Item = (EdgeKind, NodeId)> + '_ {
        self.succs.get(&id).into_iter().flat_map(|m| m.iter().map(|(k, t)| (*k, *t)))
    }

    pub fn successor(&self, id: NodeId, kind: EdgeKind) -> Option<NodeId> {
        self.succs.get(&id).and_then(|m| m.get(&kind)).copied()
    }

    /// The single outgoing edge, if the node has exactly one.
    pub fn single_successor(&self, id: NodeId) -> Option<(EdgeKind, NodeId)> {
        let mut iter = self.successors(id);
        let first = iter.next()?;
        if iter.next().is_some() {
            return None;
        }
        Some(first)
    }

    pub fn predecessors(&self, id: NodeId) -> impl Iterator<Item = (NodeId, EdgeKind)> + '_ {
        self.preds.get(&id).into_iter().flat_map(|s| s.iter().copied())
    }

    pub fn out_degree(&self, id: NodeId) -> usize {
        self.succs.get(&id).map(|m| m.len()).unwrap_or(0)
    }

    pub fn in_degree(&self, id: NodeId) -> usize {
        self.preds.get(&id).map(|s| s.len()).unwrap_or(0)
    }

    /// All edges, sorted by `(origin, kind)`.
    pub fn edges(&self) -> impl Iterator<Item = (NodeId, EdgeKind, NodeId)> + '_ {
        self.succs.iter().flat_map(|(o, m)| m.iter().map(|(k, t)| (*o, *k, *t)))
    }

    /// A fresh graph holding the nodes in `keep`, with every edge whose two
    /// endpoints survive. Node ids are preserved.
    pub fn restricted_to(&self, keep: &BTreeSet<NodeId>) -> FlowGraph {
        let mut out = FlowGraph { next_id: self.next_id, ..FlowGraph::default() };
        for (id, node) in &self.nodes {
            if keep.contains(id) {
                out.nodes.insert(*id, node.clone());
            }
        }
        for (origin, kind, target) in self.edges() {
            if keep.contains(&origin) && keep.contains(&target) {
                out.add_edge(origin, kind, target);
            }
        }
        out
    }

    /// Convert to a petgraph view for dominator and SCC analysis. Nodes are
    /// inserted in ascending id order so indices are deterministic.
    pub fn petgraph_view(&self) -> PetView {
        let mut graph = PetGraph::<NodeId, EdgeKind>::new();
        let mut index_of = BTreeMap::new();
        for id in self.node_ids() {
            index_of.insert(id, graph.add_node(id));
        }
        for (origin, kind, target) in self.edges() {
            graph.add_edge(index_of[&origin], index_of[&target], kind);
        }
        PetView { graph, index_of }
    }
}

/// A petgraph rendering of a [`FlowGraph`], node weights being the stable
/// node ids.
pub struct PetView {
    pub graph: PetGraph<NodeId, EdgeKind>,
    pub index_of: BTreeMap<NodeId, NodeIndex>,
}

/// One section of the program as seen by the graph stages.
#[derive(Debug, Clone)]
pub struct SectionInfo {
    pub id: SectionId,
    pub name: Option<String>,
    pub display_name: String,
    pub entry: NodeId,
    pub exit: NodeId,
    pub source: Source,
}

/// The statement graph plus the arenas every later stage references.
#[derive(Debug, Clone)]
pub struct ProgramGraph {
    pub graph: FlowGraph,
    /// Leaf statement arena; graph nodes reference statements by [`StmtId`].
    pub stmts: Vec<StmtInfo>,
    pub sections: Vec<SectionInfo>,
    /// Owning section of every node.
    pub node_sections: BTreeMap<NodeId, SectionId>,
    /// Entry nodes of named paragraphs, for goto-label naming. Maps the
    /// node id to the first paragraph name that starts there.
    pub para_entries: BTreeMap<NodeId, String>,
    /// Program entry: the first section's `SectionEntry`.
    pub entry: NodeId,
    /// Statements pruned as unreachable, kept aside for reporting.
    pub unreachable: Vec<StmtId>,
    pub diagnostics: Diagnostics,
}

impl ProgramGraph {
    pub fn stmt(&self, id: StmtId) -> &StmtInfo {
        &self.stmts[id.0 as usize]
    }

    pub fn section(&self, id: SectionId) -> &SectionInfo {
        &self.sections[id.0 as usize]
    }

    /// The goto-label name for a node: the paragraph starting there, the
    /// section name for entry nodes, `__exit` for a section exit, or a
    /// synthetic `__l<n>` label.
    pub fn label_for(&self, graph: &FlowGraph, id: NodeId) -> String {
        if let Some(name) = self.para_entries.get(&id) {
            return name.clone();
        }
        if graph.contains(id) {
            match graph.node(id) {
                Node::SectionEntry { section } => {
                    return self.section(*section).display_name.clone()
                }
                Node::SectionExit { .. } => return "__exit".to_string(),
                _ => {}
            }
        }
        format!("__l{}", id.0)
    }

    /// Earliest source line of a node, for deterministic ordering and
    /// diagnostics. Joins and loop headers take the line of what they
    /// guard.
    pub fn node_line(&self, graph: &FlowGraph, id: NodeId) -> u32 {
        match graph.node(id) {
            Node::Block { stmts } => {
                stmts.iter().map(|s| self.stmt(*s).source.from_line).min().unwrap_or(0)
            }
            Node::Branch { condition } => condition.from_line,
            Node::SectionEntry { section } | Node::SectionExit { section } => {
                self.section(*section).source.from_line
            }
            Node::Join | Node::LoopHeader { .. } => graph
                .single_successor(id)
                .map(|(_, next)| self.node_line(graph, next))
                .unwrap_or(0),
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block() -> Node {
        Node::Block { stmts: vec![] }
    }

    #[test]
    fn test_edge_identity_is_origin_and_kind() {
        let mut g = FlowGraph::new();
        let a = g.add_node(block());
        let b = g.add_node(block());
        let c = g.add_node(block());

        g.add_edge(a, EdgeKind::Fall, b);
        // replacing the Fall edge moves it; b loses the predecessor
        g.add_edge(a, EdgeKind::Fall, c);

        assert_eq!(g.successor(a, EdgeKind::Fall), Some(c));
        assert_eq!(g.in_degree(b), 0);
        assert_eq!(g.in_degree(c), 1);
    }

    #[test]
    fn test_restricted_preserves_ids() {
        let mut g = FlowGraph::new();
        let a = g.add_node(block());
        let b = g.add_node(block());
        let c = g.add_node(block());
        g.add_edge(a, EdgeKind::Fall, b);
        g.add_edge(b, EdgeKind::Fall, c);

        let keep: BTreeSet<NodeId> = [a, b].into_iter().collect();
        let sub = g.restricted_to(&keep);

        assert!(sub.contains(a));
        assert!(sub.contains(b));
        assert!(!sub.contains(c));
        assert_eq!(sub.successor(a, EdgeKind::Fall), Some(b));
        assert_eq!(sub.successor(b, EdgeKind::Fall), None);

        // new nodes in the restricted graph never reuse old ids
        let mut sub = sub;
        let d = sub.add_node(block());
        assert!(d > c);
    }

    #[test]
    fn test_remove_node_clears_edges() {
        let mut g = FlowGraph::new();
        let a = g.add_node(block());
        let b = g.add_node(block());
        let c = g.add_node(block());
        g.add_edge(a, EdgeKind::Fall, b);
        g.add_edge(b, EdgeKind::Jump, c);

        g.remove_node(b);

        assert_eq!(g.out_degree(a), 0);
        assert_eq!(g.in_degree(c), 0);
        assert!(!g.contains(b));
    }

    #[test]
    fn test_single_successor() {
        let mut g = FlowGraph::new();
        let a = g.add_node(Node::Branch {
            condition: cobolt_parser::syntax::Source {
                text: "a = 1".into(),
                from_line: 1,
                from_col: 0,
                to_line: 1,
                to_col: 5,
            },
        });
        let b = g.add_node(block());
        let c = g.add_node(block());
        g.add_edge(a, EdgeKind::True, b);
        assert_eq!(g.single_successor(a), Some((EdgeKind::True, b)));
        g.add_edge(a, EdgeKind::False, c);
        assert_eq!(g.single_successor(a), None);
    }
}
