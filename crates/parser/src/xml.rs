//! Renders the typed tree back to a position-annotated XML document, the
//! interchange format of the legacy parser toolchain. Read-only view; no
//! consumer inside this repository parses it back.

use std::fmt::Write;

use cobolt_common::utils::strings::escape_html;

use crate::syntax::{Program, Sentence, Source, Statement, StatementKind};

/// Serialize a program's procedure division to XML.
pub fn program_to_xml(program: &Program) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str("<compilationGroup>\n");
    let _ = writeln!(out, "  <procedureDivision{}>", position_attrs(&program.procedure.source));

    for section in &program.procedure.sections {
        let _ = writeln!(
            out,
            "    <section{}{}>",
            name_attr(section.name.as_deref()),
            position_attrs(&section.source)
        );
        for paragraph in &section.paragraphs {
            let _ = writeln!(
                out,
                "      <paragraph{}{}>",
                name_attr(paragraph.name.as_deref()),
                position_attrs(&paragraph.source)
            );
            for sentence in &paragraph.sentences {
                write_sentence(&mut out, sentence, 8);
            }
            out.push_str("      </paragraph>\n");
        }
        out.push_str("    </section>\n");
    }

    out.push_str("  </procedureDivision>\n");
    out.push_str("</compilationGroup>\n");
    out
}

fn write_sentence(out: &mut String, sentence: &Sentence, indent: usize) {
    let pad = " ".repeat(indent);
    let _ = writeln!(out, "{}<sentence{}>", pad, position_attrs(&sentence.source));
    for statement in &sentence.statements {
        write_statement(out, statement, indent + 2);
    }
    let _ = writeln!(out, "{}</sentence>", pad);
}

fn write_statement(out: &mut String, statement: &Statement, indent: usize) {
    let pad = " ".repeat(indent);
    let verb = statement.kind.verb();

    match &statement.kind {
        StatementKind::If { condition, then_branch, else_branch } => {
            let _ = writeln!(
                out,
                "{}<statement kind=\"if\"{}>",
                pad,
                position_attrs(&statement.source)
            );
            let _ = writeln!(
                out,
                "{}  <condition{}>{}</condition>",
                pad,
                position_attrs(condition),
                escape_html(&condition.text)
            );
            let _ = writeln!(out, "{}  <thenBranch>", pad);
            for inner in then_branch {
                write_statement(out, inner, indent + 4);
            }
            let _ = writeln!(out, "{}  </thenBranch>", pad);
            if let Some(else_branch) = else_branch {
                let _ = writeln!(out, "{}  <elseBranch>", pad);
                for inner in else_branch {
                    write_statement(out, inner, indent + 4);
                }
                let _ = writeln!(out, "{}  </elseBranch>", pad);
            }
            let _ = writeln!(out, "{}</statement>", pad);
        }
        StatementKind::PerformInline { body } => {
            let _ = writeln!(
                out,
                "{}<statement kind=\"perform-inline\"{}>",
                pad,
                position_attrs(&statement.source)
            );
            for inner in body {
                write_statement(out, inner, indent + 2);
            }
            let _ = writeln!(out, "{}</statement>", pad);
        }
        _ => {
            let _ = writeln!(
                out,
                "{}<statement kind=\"{}\"{}>{}</statement>",
                pad,
                escape_html(verb),
                position_attrs(&statement.source),
                escape_html(&statement.source.text)
            );
        }
    }
}

fn name_attr(name: Option<&str>) -> String {
    match name {
        Some(name) => format!(" name=\"{}\"", escape_html(name)),
        None => String::new(),
    }
}

fn position_attrs(source: &Source) -> String {
    format!(
        " from-line=\"{}\" from-column=\"{}\" to-line=\"{}\" to-column=\"{}\"",
        source.from_line, source.from_col, source.to_line, source.to_col
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;

    #[test]
    fn test_xml_shape() {
        let program = parse(
            "procedure division.\nsub section.\nif a = 'x' move 1 to b.\n",
            "test.cbl",
        )
        .expect("source parses");
        let xml = program_to_xml(&program);

        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("<section name=\"sub\""));
        assert!(xml.contains("<condition"));
        assert!(xml.contains("a = &#39;x&#39;"));
        assert!(xml.contains("<statement kind=\"move\""));
        assert!(xml.ends_with("</compilationGroup>\n"));
    }
}
