//! Pythonish rendering of the structured tree: one `def` per section,
//! indented blocks, Ada-style `<<label>>` markers for residual gotos, and
//! `[line]` cross-references back to the COBOL listing.

use cobolt_cfg::LoopId;

use crate::tree::{StructuredProgram, Tree};

/// One rendered output line, kept structured so the HTML renderer can
/// cross-link it.
#[derive(Debug, Clone)]
pub struct Line {
    pub indent: usize,
    pub text: String,
    /// Source line this output line came from.
    pub link: Option<u32>,
}

/// Render the whole program as plain text.
pub fn render_code(program: &StructuredProgram) -> String {
    let mut out = String::new();
    let mut last_blank = true;

    for line in render_lines(program) {
        if line.text.is_empty() {
            if last_blank {
                continue;
            }
            last_blank = true;
            out.push('\n');
            continue;
        }
        last_blank = false;
        for _ in 0..line.indent {
            out.push_str("    ");
        }
        out.push_str(&line.text);
        if let Some(link) = line.link {
            out.push_str(&format!("    [{}]", link));
        }
        out.push('\n');
    }

    out
}

/// Render to structured lines; shared between the text and HTML output.
pub fn render_lines(program: &StructuredProgram) -> Vec<Line> {
    let mut renderer = Renderer { program, lines: Vec::new(), indent: 0, loop_stack: Vec::new() };

    for section in &program.sections {
        renderer.blank();
        renderer.push(
            format!("def {}:", section.name),
            Some(section.source.from_line),
        );
        renderer.indent += 1;
        if section.body.is_empty() {
            renderer.push("pass".to_string(), None);
        } else {
            renderer.render_block(&section.body);
        }
        renderer.indent -= 1;
        renderer.blank();
    }

    renderer.lines
}

struct Renderer<'a> {
    program: &'a StructuredProgram,
    lines: Vec<Line>,
    indent: usize,
    loop_stack: Vec<LoopId>,
}

impl<'a> Renderer<'a> {
    fn push(&mut self, text: String, link: Option<u32>) {
        self.lines.push(Line { indent: self.indent, text, link });
    }

    fn blank(&mut self) {
        self.lines.push(Line { indent: 0, text: String::new(), link: None });
    }

    fn render_block(&mut self, block: &[Tree]) {
        if block.is_empty() {
            self.push("pass".to_string(), None);
            return;
        }
        for tree in block {
            self.render_tree(tree);
        }
    }

    fn render_tree(&mut self, tree: &Tree) {
        match tree {
            Tree::Seq(children) => {
                for child in children {
                    self.render_tree(child);
                }
            }
            Tree::Leaf { stmts } => {
                for id in stmts {
                    let stmt = self.program.stmt(*id);
                    self.push(stmt.source.text.clone(), Some(stmt.source.from_line));
                }
            }
            Tree::PerformCall { stmt, .. } => {
                let stmt = self.program.stmt(*stmt);
                self.push(stmt.source.text.clone(), Some(stmt.source.from_line));
            }
            Tree::If { condition, invert, then_branch, else_branch } => {
                self.blank();
                self.push(
                    format!("if {}{}:", if *invert { "not " } else { "" }, condition.text),
                    Some(condition.from_line),
                );
                self.indent += 1;
                self.render_block(then_branch);
                self.indent -= 1;
                if !else_branch.is_empty() {
                    self.push("else:".to_string(), None);
                    self.indent += 1;
                    self.render_block(else_branch);
                    self.indent -= 1;
                }
                self.blank();
            }
            Tree::While { loop_id, condition, invert, body } => {
                self.blank();
                self.push(
                    format!("while {}{}:", if *invert { "not " } else { "" }, condition.text),
                    Some(condition.from_line),
                );
                self.loop_stack.push(*loop_id);
                self.indent += 1;
                self.render_block(body);
                self.indent -= 1;
                self.loop_stack.pop();
                self.blank();
            }
            Tree::Forever { loop_id, body } => {
                self.blank();
                self.push("while True:".to_string(), None);
                self.loop_stack.push(*loop_id);
                self.indent += 1;
                self.render_block(body);
                self.indent -= 1;
                self.loop_stack.pop();
                self.blank();
            }
            Tree::Break(loop_id) => {
                let text = if self.loop_stack.last() == Some(loop_id) {
                    "break".to_string()
                } else {
                    format!("break {loop_id}")
                };
                self.push(text, None);
            }
            Tree::Continue(loop_id) => {
                let text = if self.loop_stack.last() == Some(loop_id) {
                    "continue".to_string()
                } else {
                    format!("continue {loop_id}")
                };
                self.push(text, None);
            }
            Tree::Label { name, body } => {
                self.blank();
                self.push(format!("<<{}>>", name), None);
                self.render_block(body);
            }
            Tree::Goto(name) => {
                self.push(format!("goto {}", name), None);
                self.blank();
            }
            Tree::Return => {
                self.push("return".to_string(), None);
                self.blank();
            }
            Tree::Comment(text) => {
                self.push(format!("# {}", text), None);
            }
        }
    }
}
