//! The emitter-facing structured tree. Every node can be traced back to a
//! contiguous range of original source lines for renderer cross-linking.

use cobolt_common::diagnostics::Diagnostics;
use cobolt_cfg::{LoopId, SectionId, StmtId, StmtInfo};
use cobolt_parser::syntax::Source;
use serde::Serialize;

/// A structured block. Child sequences are plain vectors; `Seq` exists for
/// places that need a single node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Tree {
    Seq(Vec<Tree>),
    If {
        condition: Source,
        /// Render as `if not <condition>`.
        invert: bool,
        then_branch: Vec<Tree>,
        else_branch: Vec<Tree>,
    },
    While {
        loop_id: LoopId,
        condition: Source,
        invert: bool,
        body: Vec<Tree>,
    },
    Forever {
        loop_id: LoopId,
        body: Vec<Tree>,
    },
    Break(LoopId),
    Continue(LoopId),
    Label {
        name: String,
        body: Vec<Tree>,
    },
    Goto(String),
    /// A run of sequential statements.
    Leaf {
        stmts: Vec<StmtId>,
    },
    PerformCall {
        target: String,
        stmt: StmtId,
    },
    Return,
    Comment(String),
}

impl Tree {
    /// Rendered-line weight, the unit of the duplication-vs-goto cost rule.
    pub fn size(&self) -> usize {
        match self {
            Tree::Seq(children) => children.iter().map(Tree::size).sum(),
            Tree::If { then_branch, else_branch, .. } => {
                1 + then_branch.iter().map(Tree::size).sum::<usize>() +
                    else_branch.iter().map(Tree::size).sum::<usize>()
            }
            Tree::While { body, .. } | Tree::Forever { body, .. } => {
                1 + body.iter().map(Tree::size).sum::<usize>()
            }
            Tree::Label { body, .. } => 1 + body.iter().map(Tree::size).sum::<usize>(),
            Tree::Leaf { stmts } => stmts.len(),
            Tree::Break(_) |
            Tree::Continue(_) |
            Tree::Goto(_) |
            Tree::PerformCall { .. } |
            Tree::Return => 1,
            Tree::Comment(_) => 0,
        }
    }
}

/// One section, function-shaped.
#[derive(Debug, Clone, Serialize)]
pub struct StructuredSection {
    pub name: String,
    pub section: SectionId,
    pub body: Vec<Tree>,
    pub source: Source,
}

/// The final IR handed to renderers: the structured sections plus the
/// statement arena they reference, the unreachable-code side list, and the
/// accumulated diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct StructuredProgram {
    pub path: String,
    pub sections: Vec<StructuredSection>,
    pub stmts: Vec<StmtInfo>,
    pub unreachable: Vec<StmtId>,
    pub diagnostics: Diagnostics,
}

impl StructuredProgram {
    pub fn stmt(&self, id: StmtId) -> &StmtInfo {
        &self.stmts[id.0 as usize]
    }

    /// The contiguous original line range a tree node covers, if any of its
    /// leaves carry source.
    pub fn line_range(&self, tree: &Tree) -> Option<(u32, u32)> {
        let mut range: Option<(u32, u32)> = None;
        self.collect_lines(tree, &mut range);
        range
    }

    fn collect_lines(&self, tree: &Tree, range: &mut Option<(u32, u32)>) {
        let mut cover = |from: u32, to: u32| {
            *range = Some(match *range {
                Some((lo, hi)) => (lo.min(from), hi.max(to)),
                None => (from, to),
            });
        };
        match tree {
            Tree::Leaf { stmts } => {
                for id in stmts {
                    let source = &self.stmt(*id).source;
                    cover(source.from_line, source.to_line);
                }
            }
            Tree::PerformCall { stmt, .. } => {
                let source = &self.stmt(*stmt).source;
                cover(source.from_line, source.to_line);
            }
            Tree::If { condition, then_branch, else_branch, .. } => {
                cover(condition.from_line, condition.to_line);
                for child in then_branch.iter().chain(else_branch) {
                    self.collect_lines(child, range);
                }
            }
            Tree::While { condition, body, .. } => {
                cover(condition.from_line, condition.to_line);
                for child in body {
                    self.collect_lines(child, range);
                }
            }
            Tree::Forever { body, .. } | Tree::Label { body, .. } | Tree::Seq(body) => {
                for child in body {
                    self.collect_lines(child, range);
                }
            }
            Tree::Break(_) |
            Tree::Continue(_) |
            Tree::Goto(_) |
            Tree::Return |
            Tree::Comment(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_source(line: u32) -> Source {
        Source { text: "move 1 to a".into(), from_line: line, from_col: 0, to_line: line, to_col: 11 }
    }

    #[test]
    fn test_size_counts_rendered_lines() {
        let tree = Tree::If {
            condition: leaf_source(1),
            invert: false,
            then_branch: vec![Tree::Leaf { stmts: vec![StmtId(0), StmtId(1)] }, Tree::Return],
            else_branch: vec![Tree::Goto("x".into())],
        };
        // if-line + two leaf statements + return + goto
        assert_eq!(tree.size(), 5);
        assert_eq!(Tree::Comment("note".into()).size(), 0);
    }
}
