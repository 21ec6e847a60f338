//! Stage 6: flatten the scoped per-section DAGs into structured trees.
//!
//! The walk reduces chains of blocks, absorbs branches whose arms reconverge
//! (local join accounting), turns recovered loops into `while`/`forever`
//! blocks with explicit break/continue, and leaves a label/goto pair behind
//! at every join it cannot absorb. A final cost pass inlines the label
//! bodies that are cheaper to duplicate than to jump to. The flattener
//! never fails; irreducible regions come out as flat labeled blocks.

use std::collections::{BTreeMap, BTreeSet};

use cobolt_cfg::{
    AcyclicGraph, EdgeKind, FlowGraph, LeafKind, LoopId, Node, NodeId, ProgramGraph, StmtId,
};
use tracing::debug;

use crate::{
    config::StructureConfig,
    tree::{StructuredProgram, StructuredSection, Tree},
};

/// Flatten every structured section of a program.
pub fn flatten_program(
    scoped: &[AcyclicGraph],
    pg: &ProgramGraph,
    path: impl Into<String>,
    config: &StructureConfig,
) -> StructuredProgram {
    let mut sections = Vec::new();

    for acyclic in scoped {
        let info = pg.section(acyclic.section);
        let mut flattener = SectionFlattener {
            graph: &acyclic.graph,
            pg,
            acyclic,
            config,
            scope_stack: Vec::new(),
        };
        let mut body = flattener.reduce_scope(acyclic.entry, None);
        apply_cost_rule(&mut body, config);

        debug!(section = info.display_name.as_str(), nodes = body.len(), "section flattened");
        sections.push(StructuredSection {
            name: info.display_name.clone(),
            section: info.id,
            body,
            source: info.source.clone(),
        });
    }

    StructuredProgram {
        path: path.into(),
        sections,
        stmts: pg.stmts.clone(),
        unreachable: pg.unreachable.clone(),
        diagnostics: pg.diagnostics.clone(),
    }
}

/// Where a reduced chain ended up.
enum Dest {
    /// The chain emitted a terminator.
    Done,
    /// The chain stopped at a node it may not absorb yet.
    Stuck(NodeId),
}

struct Chain {
    block: Vec<Tree>,
    dest: Dest,
}

/// One active reduction scope: the whole section, or a loop body.
struct Frame {
    scope: Option<BTreeSet<NodeId>>,
    /// Unresolved nodes discovered in this scope, with goto refcounts.
    tails: BTreeMap<NodeId, usize>,
}

struct SectionFlattener<'a> {
    graph: &'a FlowGraph,
    pg: &'a ProgramGraph,
    acyclic: &'a AcyclicGraph,
    config: &'a StructureConfig,
    scope_stack: Vec<Frame>,
}

impl<'a> SectionFlattener<'a> {
    /// Reduce a region (the section, or one loop body) and resolve the
    /// tails that belong to it as labeled blocks in source order.
    fn reduce_scope(&mut self, entry: NodeId, scope: Option<BTreeSet<NodeId>>) -> Vec<Tree> {
        self.scope_stack.push(Frame { scope, tails: BTreeMap::new() });

        let mut joins = BTreeMap::new();
        let chain = self.reduce_chain(entry, true, &mut joins);
        let mut block = self.finish_chain(chain);

        let mut resolved: Vec<(NodeId, Vec<Tree>)> = Vec::new();
        let mut done: BTreeSet<NodeId> = BTreeSet::new();
        loop {
            let frame = self.scope_stack.last().expect("frame pushed above");
            let next = frame.tails.keys().copied().find(|n| !done.contains(n));
            let Some(node) = next else { break };
            done.insert(node);

            let body = if self.acyclic.goto_only.contains(&node) {
                self.reduce_goto_only(node)
            } else {
                let mut tail_joins = BTreeMap::new();
                let chain = self.reduce_chain(node, true, &mut tail_joins);
                self.finish_chain(chain)
            };
            resolved.push((node, body));
        }
        self.scope_stack.pop();

        resolved.sort_by_key(|(node, _)| (self.pg.node_line(self.graph, *node), *node));
        for (node, body) in resolved {
            block.push(Tree::Label { name: self.label(node), body });
        }
        block
    }

    fn finish_chain(&mut self, chain: Chain) -> Vec<Tree> {
        let mut block = chain.block;
        if let Dest::Stuck(node) = chain.dest {
            self.register_tail(node);
            block.push(Tree::Goto(self.label(node)));
        }
        block
    }

    fn reduce_chain(
        &mut self,
        start: NodeId,
        mut skip_join_check: bool,
        joins: &mut BTreeMap<NodeId, usize>,
    ) -> Chain {
        let mut block: Vec<Tree> = Vec::new();
        let mut dest = start;

        loop {
            // Irreducible nodes are never absorbed into structure.
            if self.acyclic.goto_only.contains(&dest) {
                self.register_tail(dest);
                block.push(Tree::Goto(self.label(dest)));
                return Chain { block, dest: Dest::Done };
            }

            let node = self.graph.node(dest).clone();

            match &node {
                Node::SectionExit { .. } => {
                    block.push(Tree::Return);
                    return Chain { block, dest: Dest::Done };
                }
                Node::ContinueMarker { loop_id } => {
                    block.push(Tree::Continue(*loop_id));
                    return Chain { block, dest: Dest::Done };
                }
                Node::BreakMarker { loop_id, exit_id } => {
                    if *exit_id == 0 {
                        block.push(Tree::Break(*loop_id));
                    } else {
                        // a secondary exit cannot ride the break; jump to
                        // its continuation point instead
                        let target = self
                            .acyclic
                            .loop_by_id(*loop_id)
                            .and_then(|l| l.exits.iter().find(|e| e.exit_id == *exit_id))
                            .map(|e| e.target);
                        match target {
                            Some(target) => {
                                self.register_tail(target);
                                block.push(Tree::Goto(self.label(target)));
                            }
                            None => block.push(Tree::Break(*loop_id)),
                        }
                    }
                    return Chain { block, dest: Dest::Done };
                }
                Node::GotoMarker { label } => {
                    block.push(Tree::Goto(label.clone()));
                    return Chain { block, dest: Dest::Done };
                }
                _ => {}
            }

            if !self.in_current_scope(dest) {
                return Chain { block, dest: Dest::Stuck(dest) };
            }

            if skip_join_check {
                skip_join_check = false;
            } else if !self.exits_through(dest) && !self.join_accounted(dest, joins) {
                return Chain { block, dest: Dest::Stuck(dest) };
            }

            match node {
                Node::LoopHeader { loop_id } => {
                    if self.config.annotate {
                        block.push(Tree::Comment(self.describe_loop(loop_id)));
                    }
                    let tree = self.reduce_loop(loop_id);
                    block.push(tree);
                    let continuation = self
                        .acyclic
                        .loop_by_id(loop_id)
                        .and_then(|l| l.exits.first())
                        .map(|e| e.target);
                    match continuation {
                        Some(target) => dest = target,
                        None => return Chain { block, dest: Dest::Done },
                    }
                }
                Node::Block { stmts } => {
                    self.emit_stmts(&stmts, &mut block);
                    match self.graph.single_successor(dest) {
                        Some((_, next)) => dest = next,
                        None => {
                            // a terminal block is an `exit program`
                            block.push(Tree::Return);
                            return Chain { block, dest: Dest::Done };
                        }
                    }
                }
                Node::SectionEntry { .. } | Node::Join => {
                    match self.graph.single_successor(dest) {
                        Some((_, next)) => dest = next,
                        None => return Chain { block, dest: Dest::Done },
                    }
                }
                Node::Branch { condition } => {
                    match self.reduce_if(dest, condition.clone(), joins) {
                        IfOutcome::Continue { trees, next } => {
                            block.extend(trees);
                            dest = next;
                        }
                        IfOutcome::Done(trees) => {
                            block.extend(trees);
                            return Chain { block, dest: Dest::Done };
                        }
                    }
                }
                Node::SectionExit { .. } |
                Node::ContinueMarker { .. } |
                Node::BreakMarker { .. } |
                Node::GotoMarker { .. } => {
                    unreachable!("terminal nodes returned above");
                }
            }
        }
    }

    fn reduce_if(
        &mut self,
        branch: NodeId,
        condition: cobolt_parser::syntax::Source,
        joins: &mut BTreeMap<NodeId, usize>,
    ) -> IfOutcome {
        let true_target = self.graph.successor(branch, EdgeKind::True).expect("branch true arm");
        let false_target =
            self.graph.successor(branch, EdgeKind::False).expect("branch false arm");

        let then_chain = self.reduce_chain(true_target, false, joins);
        let else_chain = self.reduce_chain(false_target, false, joins);

        // Both arms stopped at the same join: it is now fully accounted in
        // this scope and the chain continues there.
        if let (Dest::Stuck(a), Dest::Stuck(b)) = (&then_chain.dest, &else_chain.dest) {
            if a == b && self.in_current_scope(*a) {
                let join = *a;
                *joins.entry(join).or_insert(0) += 1;
                let tree = Tree::If {
                    condition,
                    invert: false,
                    then_branch: then_chain.block,
                    else_branch: else_chain.block,
                };
                return IfOutcome::Continue { trees: vec![tree], next: join };
            }
        }

        // If only the else arm terminates, flip the condition so the
        // terminating arm comes first and the else branch can be dropped.
        let (then_chain, else_chain, invert) =
            if matches!(else_chain.dest, Dest::Done) && !matches!(then_chain.dest, Dest::Done) {
                (else_chain, then_chain, true)
            } else {
                (then_chain, else_chain, false)
            };

        if matches!(then_chain.dest, Dest::Done) {
            // The then arm ends control; hoist the else arm inline after
            // the if and keep reducing from wherever it stopped.
            let mut trees = vec![Tree::If {
                condition,
                invert,
                then_branch: then_chain.block,
                else_branch: Vec::new(),
            }];
            trees.extend(else_chain.block);
            return match else_chain.dest {
                Dest::Done => IfOutcome::Done(trees),
                Dest::Stuck(next) => IfOutcome::Continue { trees, next },
            };
        }

        // Paths diverge and neither terminates: both arms leave through
        // labeled jumps resolved later.
        let then_branch = self.finish_chain(then_chain);
        let else_branch = self.finish_chain(else_chain);
        IfOutcome::Done(vec![Tree::If { condition, invert: false, then_branch, else_branch }])
    }

    fn reduce_loop(&mut self, loop_id: LoopId) -> Tree {
        let l = self.acyclic.loop_by_id(loop_id).expect("loop header names a loop").clone();

        if let Some(info) = &l.while_info {
            let body = self.reduce_scope(info.body_entry, Some(l.body.clone()));
            Tree::While {
                loop_id,
                condition: info.condition.clone(),
                invert: info.invert,
                body,
            }
        } else {
            let body = self.reduce_scope(l.original_header, Some(l.body.clone()));
            Tree::Forever { loop_id, body }
        }
    }

    /// Flat labeled rendering of one irreducible-region node.
    fn reduce_goto_only(&mut self, node: NodeId) -> Vec<Tree> {
        let mut block = Vec::new();
        match self.graph.node(node).clone() {
            Node::Block { stmts } => {
                self.emit_stmts(&stmts, &mut block);
                match self.graph.single_successor(node) {
                    Some((_, next)) => self.push_region_goto(&mut block, next),
                    None => block.push(Tree::Return),
                }
            }
            Node::Join => match self.graph.single_successor(node) {
                Some((_, next)) => self.push_region_goto(&mut block, next),
                None => block.push(Tree::Return),
            },
            Node::Branch { condition } => {
                let mut then_branch = Vec::new();
                if let Some(t) = self.graph.successor(node, EdgeKind::True) {
                    self.push_region_goto(&mut then_branch, t);
                }
                let mut else_branch = Vec::new();
                if let Some(f) = self.graph.successor(node, EdgeKind::False) {
                    self.push_region_goto(&mut else_branch, f);
                }
                block.push(Tree::If { condition, invert: false, then_branch, else_branch });
            }
            _ => block.push(Tree::Return),
        }
        block
    }

    fn push_region_goto(&mut self, block: &mut Vec<Tree>, target: NodeId) {
        if matches!(self.graph.node(target), Node::SectionExit { .. }) {
            block.push(Tree::Return);
            return;
        }
        self.register_tail(target);
        block.push(Tree::Goto(self.label(target)));
    }

    fn emit_stmts(&mut self, stmts: &[StmtId], block: &mut Vec<Tree>) {
        for &id in stmts {
            let info = self.pg.stmt(id);
            match &info.kind {
                LeafKind::Perform { target } => {
                    block.push(Tree::PerformCall { target: target.clone(), stmt: id });
                }
                kind if kind.is_transfer() && !self.config.keep_all_stmts => {}
                _ => match block.last_mut() {
                    Some(Tree::Leaf { stmts }) => stmts.push(id),
                    _ => block.push(Tree::Leaf { stmts: vec![id] }),
                },
            }
        }
    }

    /// Register an unresolved node with the innermost frame whose scope
    /// contains it; the section-level frame takes everything else.
    fn register_tail(&mut self, node: NodeId) {
        for frame in self.scope_stack.iter_mut().rev() {
            let in_scope = frame.scope.as_ref().map_or(true, |s| s.contains(&node));
            if in_scope {
                *frame.tails.entry(node).or_insert(0) += 1;
                return;
            }
        }
    }

    fn in_current_scope(&self, node: NodeId) -> bool {
        match self.scope_stack.last().and_then(|f| f.scope.as_ref()) {
            Some(scope) => scope.contains(&node),
            None => true,
        }
    }

    fn join_accounted(&self, node: NodeId, joins: &BTreeMap<NodeId, usize>) -> bool {
        let accounted = joins.get(&node).copied().unwrap_or(0);
        self.graph.in_degree(node).saturating_sub(accounted) <= 1
    }

    /// A path that runs straight to the section exit through joins and
    /// transfer statements carries no code; every predecessor can simply
    /// return early instead of sharing a join.
    fn exits_through(&self, start: NodeId) -> bool {
        let mut cur = start;
        let mut seen = BTreeSet::new();
        loop {
            if !seen.insert(cur) || self.acyclic.goto_only.contains(&cur) {
                return false;
            }
            match self.graph.node(cur) {
                Node::SectionExit { .. } => return true,
                Node::Join => match self.graph.single_successor(cur) {
                    Some((_, next)) => cur = next,
                    None => return false,
                },
                Node::Block { stmts } => {
                    let all_transfers =
                        stmts.iter().all(|s| self.pg.stmt(*s).kind.is_transfer());
                    if !all_transfers || (self.config.keep_all_stmts && !stmts.is_empty()) {
                        return false;
                    }
                    match self.graph.single_successor(cur) {
                        Some((_, next)) => cur = next,
                        // a terminal transfer block is an `exit program`
                        None => return true,
                    }
                }
                _ => return false,
            }
        }
    }

    fn label(&self, node: NodeId) -> String {
        self.pg.label_for(self.graph, node)
    }

    fn describe_loop(&self, loop_id: LoopId) -> String {
        match self.acyclic.loop_by_id(loop_id) {
            Some(l) if l.while_info.is_some() => {
                format!("{loop_id}: while candidate, exit on the header branch")
            }
            Some(l) => format!("{loop_id}: forever with {} exit(s)", l.exits.len()),
            None => format!("{loop_id}"),
        }
    }
}

enum IfOutcome {
    Continue { trees: Vec<Tree>, next: NodeId },
    Done(Vec<Tree>),
}

// ---------------------------------------------------------------------
// Duplication-vs-goto cost pass
// ---------------------------------------------------------------------

/// Inline the label bodies that are cheaper to duplicate than to keep as a
/// label/goto pair, then drop labels nobody jumps to anymore. Ties keep
/// the goto. Only labels whose bodies contain no further gotos are inlined,
/// which keeps the expansion finite on irreducible regions.
fn apply_cost_rule(body: &mut Vec<Tree>, config: &StructureConfig) {
    let mut refs = BTreeMap::new();
    count_gotos(body, &mut refs);
    let mut labels = BTreeMap::new();
    collect_labels(body, &mut labels);

    let mut inline: BTreeMap<String, Vec<Tree>> = BTreeMap::new();
    for (name, label_body) in &labels {
        let k = refs.get(name).copied().unwrap_or(0);
        if k == 0 || label_body.iter().any(contains_goto) {
            continue;
        }
        let size: usize = label_body.iter().map(Tree::size).sum();
        let cost_dup = k * size * config.dup_cost as usize;
        let cost_goto = config.goto_overhead as usize + k;
        if cost_dup < cost_goto {
            inline.insert(name.clone(), label_body.clone());
        }
    }

    if !inline.is_empty() {
        inline_gotos(body, &inline, config);
    }

    let mut live = BTreeMap::new();
    count_gotos(body, &mut live);
    drop_dead_labels(body, &live);
}

fn count_gotos(trees: &[Tree], refs: &mut BTreeMap<String, usize>) {
    for tree in trees {
        match tree {
            Tree::Goto(name) => *refs.entry(name.clone()).or_insert(0) += 1,
            Tree::Seq(children) |
            Tree::Forever { body: children, .. } |
            Tree::While { body: children, .. } |
            Tree::Label { body: children, .. } => count_gotos(children, refs),
            Tree::If { then_branch, else_branch, .. } => {
                count_gotos(then_branch, refs);
                count_gotos(else_branch, refs);
            }
            _ => {}
        }
    }
}

fn collect_labels(trees: &[Tree], labels: &mut BTreeMap<String, Vec<Tree>>) {
    for tree in trees {
        match tree {
            Tree::Label { name, body } => {
                labels.entry(name.clone()).or_insert_with(|| body.clone());
                collect_labels(body, labels);
            }
            Tree::Seq(children) |
            Tree::Forever { body: children, .. } |
            Tree::While { body: children, .. } => collect_labels(children, labels),
            Tree::If { then_branch, else_branch, .. } => {
                collect_labels(then_branch, labels);
                collect_labels(else_branch, labels);
            }
            _ => {}
        }
    }
}

fn contains_goto(tree: &Tree) -> bool {
    match tree {
        Tree::Goto(_) => true,
        Tree::Seq(children) |
        Tree::Forever { body: children, .. } |
        Tree::While { body: children, .. } |
        Tree::Label { body: children, .. } => children.iter().any(contains_goto),
        Tree::If { then_branch, else_branch, .. } => {
            then_branch.iter().any(contains_goto) || else_branch.iter().any(contains_goto)
        }
        _ => false,
    }
}

fn inline_gotos(trees: &mut Vec<Tree>, inline: &BTreeMap<String, Vec<Tree>>, config: &StructureConfig) {
    let mut i = 0;
    while i < trees.len() {
        let replacement = match &trees[i] {
            Tree::Goto(name) => inline.get(name).map(|body| (name.clone(), body.clone())),
            _ => None,
        };
        if let Some((name, body)) = replacement {
            let mut spliced = Vec::new();
            if config.annotate {
                spliced.push(Tree::Comment(format!("inlined {name}")));
            }
            spliced.extend(body);
            let count = spliced.len();
            trees.splice(i..=i, spliced);
            i += count;
            continue;
        }
        match &mut trees[i] {
            Tree::Seq(children) |
            Tree::Forever { body: children, .. } |
            Tree::While { body: children, .. } |
            Tree::Label { body: children, .. } => inline_gotos(children, inline, config),
            Tree::If { then_branch, else_branch, .. } => {
                inline_gotos(then_branch, inline, config);
                inline_gotos(else_branch, inline, config);
            }
            _ => {}
        }
        i += 1;
    }
}

fn drop_dead_labels(trees: &mut Vec<Tree>, live: &BTreeMap<String, usize>) {
    trees.retain(|tree| match tree {
        Tree::Label { name, .. } => live.get(name).copied().unwrap_or(0) > 0,
        _ => true,
    });
    for tree in trees.iter_mut() {
        match tree {
            Tree::Seq(children) |
            Tree::Forever { body: children, .. } |
            Tree::While { body: children, .. } |
            Tree::Label { body: children, .. } => drop_dead_labels(children, live),
            Tree::If { then_branch, else_branch, .. } => {
                drop_dead_labels(then_branch, live);
                drop_dead_labels(else_branch, live);
            }
            _ => {}
        }
    }
}
