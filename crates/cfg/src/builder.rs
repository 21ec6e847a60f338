//! Stage 1: build the statement graph from the typed tree.
//!
//! Statements are laid out back-to-front so every statement knows its
//! successor when its node is created; `go to` and `perform` targets are
//! resolved in a second pass once every paragraph entry is known.

use std::collections::BTreeMap;

use cobolt_common::diagnostics::{DiagnosticKind, Diagnostics};
use cobolt_parser::syntax::{Program, Section, Statement, StatementKind};
use tracing::debug;

use crate::{
    error::Error,
    graph::{
        EdgeKind, FlowGraph, LeafKind, Node, NodeId, ProgramGraph, SectionId, SectionInfo, StmtId,
        StmtInfo,
    },
};

/// Build the full statement graph for a parsed program.
pub fn build_stmt_graph(program: &Program) -> Result<ProgramGraph, Error> {
    let mut builder = Builder {
        graph: FlowGraph::new(),
        stmts: Vec::new(),
        sections: Vec::new(),
        node_sections: BTreeMap::new(),
        para_entries: Vec::new(),
        pending_gotos: Vec::new(),
        pending_performs: Vec::new(),
        diagnostics: Diagnostics::new(),
    };

    for (idx, section) in program.procedure.sections.iter().enumerate() {
        let id = SectionId(idx as u32);
        let entry = builder.graph.add_node(Node::SectionEntry { section: id });
        let exit = builder.graph.add_node(Node::SectionExit { section: id });
        builder.node_sections.insert(entry, id);
        builder.node_sections.insert(exit, id);
        builder.sections.push(SectionInfo {
            id,
            name: section.name.clone(),
            display_name: section.display_name().to_string(),
            entry,
            exit,
            source: section.source.clone(),
        });
    }

    for (idx, section) in program.procedure.sections.iter().enumerate() {
        builder.emit_section(section, SectionId(idx as u32))?;
    }

    builder.resolve_jumps()?;

    debug!(
        nodes = builder.graph.len(),
        stmts = builder.stmts.len(),
        sections = builder.sections.len(),
        "statement graph built"
    );

    let entry = builder.sections.first().map(|s| s.entry).expect("parser yields ≥1 section");

    let mut para_entry_names = BTreeMap::new();
    for entry in &builder.para_entries {
        if let Some(name) = &entry.name {
            para_entry_names.entry(entry.node).or_insert_with(|| name.clone());
        }
    }

    Ok(ProgramGraph {
        graph: builder.graph,
        stmts: builder.stmts,
        sections: builder.sections,
        node_sections: builder.node_sections,
        para_entries: para_entry_names,
        entry,
        unreachable: Vec::new(),
        diagnostics: builder.diagnostics,
    })
}

/// A `go to` or `perform` waiting for target resolution.
struct PendingJump {
    origin: NodeId,
    target: String,
    section: SectionId,
    line: u32,
}

/// Entry node of one paragraph, in textual order.
struct ParaEntry {
    section: SectionId,
    name: Option<String>,
    node: NodeId,
    line: u32,
}

struct Builder {
    graph: FlowGraph,
    stmts: Vec<StmtInfo>,
    sections: Vec<SectionInfo>,
    node_sections: BTreeMap<NodeId, SectionId>,
    para_entries: Vec<ParaEntry>,
    pending_gotos: Vec<PendingJump>,
    pending_performs: Vec<PendingJump>,
    diagnostics: Diagnostics,
}

impl Builder {
    fn emit_section(&mut self, section: &Section, id: SectionId) -> Result<(), Error> {
        let exit = self.sections[id.0 as usize].exit;
        let entry = self.sections[id.0 as usize].entry;

        let mut cursor = exit;
        let mut section_paras = Vec::new();

        for para in section.paragraphs.iter().rev() {
            // `next sentence` inside the last sentence of a paragraph jumps
            // to the section exit.
            let mut next_sentence = exit;
            for sentence in para.sentences.iter().rev() {
                let sentence_entry =
                    self.emit_stmts(&sentence.statements, cursor, next_sentence, id, exit)?;
                cursor = sentence_entry;
                next_sentence = sentence_entry;
            }
            section_paras.push(ParaEntry {
                section: id,
                name: para.name.clone(),
                node: cursor,
                line: para.source.from_line,
            });
        }

        self.graph.add_edge(entry, EdgeKind::Fall, cursor);

        section_paras.reverse();
        self.para_entries.extend(section_paras);
        Ok(())
    }

    /// Emit a statement list, returning its entry node. `next` is where
    /// control continues after the list.
    fn emit_stmts(
        &mut self,
        stmts: &[Statement],
        next: NodeId,
        next_sentence: NodeId,
        section: SectionId,
        exit: NodeId,
    ) -> Result<NodeId, Error> {
        let mut cursor = next;
        for stmt in stmts.iter().rev() {
            cursor = self.emit_stmt(stmt, cursor, next_sentence, section, exit)?;
        }
        Ok(cursor)
    }

    fn emit_stmt(
        &mut self,
        stmt: &Statement,
        next: NodeId,
        next_sentence: NodeId,
        section: SectionId,
        exit: NodeId,
    ) -> Result<NodeId, Error> {
        let node = match &stmt.kind {
            StatementKind::Move => {
                let node = self.add_leaf(LeafKind::Move, stmt, section);
                self.graph.add_edge(node, EdgeKind::Fall, next);
                node
            }
            StatementKind::Other { verb } => {
                let node = self.add_leaf(LeafKind::Other { verb: verb.clone() }, stmt, section);
                self.graph.add_edge(node, EdgeKind::Fall, next);
                node
            }
            StatementKind::Perform { target } => {
                let node =
                    self.add_leaf(LeafKind::Perform { target: target.clone() }, stmt, section);
                self.graph.add_edge(node, EdgeKind::PerformReturn, next);
                self.pending_performs.push(PendingJump {
                    origin: node,
                    target: target.clone(),
                    section,
                    line: stmt.source.from_line,
                });
                node
            }
            StatementKind::PerformRange { from, thru } => {
                return Err(Error::UnsupportedPerformRange {
                    from: from.clone(),
                    thru: thru.clone(),
                    line: stmt.source.from_line,
                });
            }
            StatementKind::PerformInline { body } => {
                return self.emit_stmts(body, next, next_sentence, section, exit);
            }
            StatementKind::GoTo { target } => {
                let node = self.add_leaf(LeafKind::GoTo { target: target.clone() }, stmt, section);
                self.pending_gotos.push(PendingJump {
                    origin: node,
                    target: target.clone(),
                    section,
                    line: stmt.source.from_line,
                });
                node
            }
            StatementKind::NextSentence => {
                let node = self.add_leaf(LeafKind::NextSentence, stmt, section);
                self.graph.add_edge(node, EdgeKind::Jump, next_sentence);
                node
            }
            StatementKind::ExitSection => {
                let node = self.add_leaf(LeafKind::ExitSection, stmt, section);
                self.graph.add_edge(node, EdgeKind::Fall, exit);
                node
            }
            StatementKind::ExitProgram => self.add_leaf(LeafKind::ExitProgram, stmt, section),
            StatementKind::If { condition, then_branch, else_branch } => {
                let then_entry =
                    self.emit_stmts(then_branch, next, next_sentence, section, exit)?;
                let else_entry = match else_branch {
                    Some(body) => self.emit_stmts(body, next, next_sentence, section, exit)?,
                    None => next,
                };
                let node = self.graph.add_node(Node::Branch { condition: condition.clone() });
                self.node_sections.insert(node, section);
                self.graph.add_edge(node, EdgeKind::True, then_entry);
                self.graph.add_edge(node, EdgeKind::False, else_entry);
                node
            }
        };
        Ok(node)
    }

    fn add_leaf(&mut self, kind: LeafKind, stmt: &Statement, section: SectionId) -> NodeId {
        let stmt_id = StmtId(self.stmts.len() as u32);
        self.stmts.push(StmtInfo { kind, source: stmt.source.clone(), section });
        let node = self.graph.add_node(Node::Block { stmts: vec![stmt_id] });
        self.node_sections.insert(node, section);
        node
    }

    // -----------------------------------------------------------------
    // Target resolution
    // -----------------------------------------------------------------

    fn resolve_jumps(&mut self) -> Result<(), Error> {
        let mut sections_by_name: BTreeMap<String, SectionId> = BTreeMap::new();
        for info in &self.sections {
            if let Some(name) = &info.name {
                if let Some(first) = sections_by_name.get(name) {
                    self.diagnostics.report(
                        DiagnosticKind::DuplicateName,
                        info.source.from_line,
                        format!(
                            "section {} defined again; first definition at line {} wins",
                            name,
                            self.sections[first.0 as usize].source.from_line
                        ),
                    );
                } else {
                    sections_by_name.insert(name.clone(), info.id);
                }
            }
        }

        let mut paras_local: BTreeMap<(SectionId, String), NodeId> = BTreeMap::new();
        let mut paras_global: BTreeMap<String, (SectionId, NodeId)> = BTreeMap::new();
        let mut first_lines: BTreeMap<(SectionId, String), u32> = BTreeMap::new();
        for entry in &self.para_entries {
            let Some(name) = &entry.name else { continue };
            let key = (entry.section, name.clone());
            if let Some(first_line) = first_lines.get(&key) {
                self.diagnostics.report(
                    DiagnosticKind::DuplicateName,
                    entry.line,
                    format!(
                        "paragraph {} defined again; first definition at line {} wins",
                        name, first_line
                    ),
                );
            } else {
                first_lines.insert(key.clone(), entry.line);
                paras_local.insert(key, entry.node);
                paras_global.entry(name.clone()).or_insert((entry.section, entry.node));
            }
        }

        let gotos = std::mem::take(&mut self.pending_gotos);
        for jump in gotos {
            let target = self.resolve_goto(&jump, &paras_local, &paras_global, &sections_by_name)?;
            self.graph.add_edge(jump.origin, EdgeKind::Jump, target);
        }

        let performs = std::mem::take(&mut self.pending_performs);
        for call in performs {
            let target =
                self.resolve_perform(&call, &paras_local, &paras_global, &sections_by_name)?;
            self.graph.add_edge(call.origin, EdgeKind::PerformCall, target);
        }

        Ok(())
    }

    fn resolve_goto(
        &mut self,
        jump: &PendingJump,
        paras_local: &BTreeMap<(SectionId, String), NodeId>,
        paras_global: &BTreeMap<String, (SectionId, NodeId)>,
        sections_by_name: &BTreeMap<String, SectionId>,
    ) -> Result<NodeId, Error> {
        if let Some(node) = paras_local.get(&(jump.section, jump.target.clone())) {
            return Ok(*node);
        }
        if let Some((section, node)) = paras_global.get(&jump.target) {
            self.diagnostics.report(
                DiagnosticKind::CrossSectionGoto,
                jump.line,
                format!(
                    "go to {} targets a paragraph in section {}",
                    jump.target,
                    self.sections[section.0 as usize].display_name
                ),
            );
            return Ok(*node);
        }
        if let Some(section) = sections_by_name.get(&jump.target) {
            self.diagnostics.report(
                DiagnosticKind::CrossSectionGoto,
                jump.line,
                format!("go to {} targets another section", jump.target),
            );
            return Ok(self.sections[section.0 as usize].entry);
        }
        Err(Error::UnresolvedLabel { name: jump.target.clone(), line: jump.line })
    }

    fn resolve_perform(
        &mut self,
        call: &PendingJump,
        paras_local: &BTreeMap<(SectionId, String), NodeId>,
        paras_global: &BTreeMap<String, (SectionId, NodeId)>,
        sections_by_name: &BTreeMap<String, SectionId>,
    ) -> Result<NodeId, Error> {
        if let Some(section) = sections_by_name.get(&call.target) {
            return Ok(self.sections[section.0 as usize].entry);
        }
        if let Some(node) = paras_local.get(&(call.section, call.target.clone())) {
            return Ok(*node);
        }
        if let Some((_, node)) = paras_global.get(&call.target) {
            return Ok(*node);
        }
        Err(Error::UnresolvedLabel { name: call.target.clone(), line: call.line })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cobolt_parser::parse;

    fn build(source: &str) -> ProgramGraph {
        let program = parse(source, "test.cbl").expect("source parses");
        build_stmt_graph(&program).expect("graph builds")
    }

    #[test]
    fn test_straight_line_section() {
        let pg = build(
            "procedure division.\n\
             sub section.\n\
             move 'x' to a.\n\
             perform helper.\n\
             exit program.\n\
             helper section.\n\
             move 1 to b.\n",
        );

        let entry = pg.sections[0].entry;
        let (kind, first) = pg.graph.single_successor(entry).expect("entry has an edge");
        assert_eq!(kind, EdgeKind::Fall);

        // move falls into the perform node
        let (kind, perform) = pg.graph.single_successor(first).expect("move falls through");
        assert_eq!(kind, EdgeKind::Fall);

        // the perform node carries both a call and a matched return
        let call = pg.graph.successor(perform, EdgeKind::PerformCall).expect("call edge");
        assert_eq!(call, pg.sections[1].entry);
        let ret = pg.graph.successor(perform, EdgeKind::PerformReturn).expect("return edge");

        // the return lands on `exit program`, which is terminal
        assert_eq!(pg.graph.out_degree(ret), 0);
        assert!(matches!(pg.graph.node(ret), Node::Block { .. }));
    }

    #[test]
    fn test_if_arms_reunite_on_fallthrough() {
        let pg = build(
            "procedure division.\n\
             s section.\n\
             if a = 1 move 1 to b else move 2 to b.\n\
             move 3 to c.\n",
        );

        let entry = pg.sections[0].entry;
        let (_, branch) = pg.graph.single_successor(entry).expect("entry edge");
        assert!(matches!(pg.graph.node(branch), Node::Branch { .. }));

        let t = pg.graph.successor(branch, EdgeKind::True).expect("true edge");
        let f = pg.graph.successor(branch, EdgeKind::False).expect("false edge");
        let (_, after_t) = pg.graph.single_successor(t).expect("then falls");
        let (_, after_f) = pg.graph.single_successor(f).expect("else falls");
        assert_eq!(after_t, after_f, "both arms reunite at the following statement");
    }

    #[test]
    fn test_goto_resolves_to_first_duplicate() {
        let pg = build(
            "procedure division.\n\
             s section.\n\
             go to p.\n\
             p.\n\
             move 1 to a.\n\
             p.\n\
             move 2 to a.\n",
        );

        assert!(pg.diagnostics.has_warnings(), "duplicate paragraph reported");

        let entry = pg.sections[0].entry;
        let (_, goto) = pg.graph.single_successor(entry).expect("entry edge");
        let target = pg.graph.successor(goto, EdgeKind::Jump).expect("jump edge");
        let Node::Block { stmts } = pg.graph.node(target) else { panic!("block target") };
        assert_eq!(pg.stmt(stmts[0]).source.text, "move 1 to a");
    }

    #[test]
    fn test_cross_section_goto_is_warned_but_linked() {
        let pg = build(
            "procedure division.\n\
             a section.\n\
             go to elsewhere.\n\
             b section.\n\
             elsewhere.\n\
             move 1 to x.\n",
        );

        let warned = pg
            .diagnostics
            .iter()
            .any(|d| matches!(d.kind, DiagnosticKind::CrossSectionGoto));
        assert!(warned);

        let entry = pg.sections[0].entry;
        let (_, goto) = pg.graph.single_successor(entry).expect("entry edge");
        assert!(pg.graph.successor(goto, EdgeKind::Jump).is_some());
    }

    #[test]
    fn test_unresolved_label_is_fatal() {
        let program =
            parse("procedure division.\ns section.\ngo to nowhere.\n", "test.cbl")
                .expect("source parses");
        let err = build_stmt_graph(&program).expect_err("unresolved target");
        assert!(matches!(err, Error::UnresolvedLabel { ref name, line: 3 } if name == "nowhere"));
    }

    #[test]
    fn test_perform_range_is_rejected() {
        let program = parse(
            "procedure division.\ns section.\nperform a thru b.\na.\nmove 1 to x.\nb.\nexit.\n",
            "test.cbl",
        )
        .expect("source parses");
        let err = build_stmt_graph(&program).expect_err("perform range rejected");
        assert!(matches!(err, Error::UnsupportedPerformRange { .. }));
    }

    #[test]
    fn test_next_sentence_jumps_past_sentence_end() {
        let pg = build(
            "procedure division.\n\
             s section.\n\
             if a = 1 next sentence else move 1 to b.\n\
             move 2 to c.\n",
        );

        let entry = pg.sections[0].entry;
        let (_, branch) = pg.graph.single_successor(entry).expect("entry edge");
        let ns = pg.graph.successor(branch, EdgeKind::True).expect("true edge");
        let target = pg.graph.successor(ns, EdgeKind::Jump).expect("next sentence jumps");
        let Node::Block { stmts } = pg.graph.node(target) else { panic!("block target") };
        assert_eq!(pg.stmt(stmts[0]).source.text, "move 2 to c");
    }

    #[test]
    fn test_empty_paragraph_entry_falls_through() {
        let pg = build(
            "procedure division.\n\
             s section.\n\
             go to empty-p.\n\
             empty-p.\n\
             after-p.\n\
             move 1 to a.\n",
        );

        let entry = pg.sections[0].entry;
        let (_, goto) = pg.graph.single_successor(entry).expect("entry edge");
        let target = pg.graph.successor(goto, EdgeKind::Jump).expect("jump edge");
        let Node::Block { stmts } = pg.graph.node(target) else { panic!("block target") };
        assert_eq!(pg.stmt(stmts[0]).source.text, "move 1 to a");
        // the shared entry node is labeled after the first paragraph
        assert_eq!(pg.para_entries.get(&target).map(String::as_str), Some("empty-p"));
    }
}
