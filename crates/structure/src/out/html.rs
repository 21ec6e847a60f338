//! Self-contained HTML report: the structured rendering on the left, the
//! original COBOL listing on the right, cross-linked line by line, with a
//! small embedded folding script and the diagnostics up top.

use std::fmt::Write;

use cobolt_common::{diagnostics::Severity, utils::strings::escape_html};

use crate::{
    error::Error,
    out::text::render_lines,
    tree::StructuredProgram,
};

const STYLE: &str = "\
body { font-family: sans-serif; margin: 0; }\n\
header { padding: 0.5em 1em; background: #23324d; color: #fff; }\n\
header h1 { font-size: 1.1em; margin: 0.2em 0; }\n\
.diagnostics { margin: 0; padding: 0.3em 1em; background: #fff5e0; list-style: none; }\n\
.diagnostics .warning::before { content: 'warning: '; color: #a15c00; font-weight: bold; }\n\
.diagnostics .info::before { content: 'info: '; color: #23557d; font-weight: bold; }\n\
.panes { display: flex; }\n\
.pane { flex: 1; overflow: auto; height: calc(100vh - 7em); }\n\
pre { margin: 0; padding: 0.5em 1em; font-size: 13px; line-height: 1.45; }\n\
.code .line a { color: inherit; text-decoration: none; }\n\
.code .line a:hover { text-decoration: underline; }\n\
.code .fold { cursor: pointer; }\n\
.code .folded { opacity: 0.5; }\n\
.cobol { border-left: 1px solid #ccc; }\n\
.cobol .ln { color: #999; user-select: none; }\n\
.cobol .hl { background: #fdf3a6; }\n";

const FOLDING_SCRIPT: &str = "\
document.querySelectorAll('.code .fold').forEach(function (line) {\n\
  line.addEventListener('click', function () {\n\
    var indent = parseInt(line.dataset.indent, 10);\n\
    var hidden = line.classList.toggle('folded');\n\
    var next = line.nextElementSibling;\n\
    while (next && parseInt(next.dataset.indent, 10) > indent) {\n\
      next.style.display = hidden ? 'none' : '';\n\
      next = next.nextElementSibling;\n\
    }\n\
  });\n\
});\n\
document.querySelectorAll('.code .line a').forEach(function (link) {\n\
  link.addEventListener('click', function () {\n\
    var target = document.getElementById(link.getAttribute('href').slice(1));\n\
    if (target) { target.classList.add('hl'); setTimeout(function () { target.classList.remove('hl'); }, 1500); }\n\
  });\n\
});\n";

/// Render the report. `source` is the original (tab-expanded) listing.
pub fn render_html(program: &StructuredProgram, source: &str) -> Result<String, Error> {
    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    let _ = writeln!(out, "<title>{}</title>", escape_html(&program.path));
    let _ = writeln!(out, "<style>\n{}</style>", STYLE);
    out.push_str("</head>\n<body>\n");

    let _ = writeln!(out, "<header><h1>{}</h1></header>", escape_html(&program.path));

    if !program.diagnostics.is_empty() {
        out.push_str("<ul class=\"diagnostics\">\n");
        for diagnostic in program.diagnostics.iter() {
            let class = match diagnostic.severity {
                Severity::Warning => "warning",
                Severity::Info => "info",
            };
            let _ = writeln!(
                out,
                "<li class=\"{}\">line {}: {}</li>",
                class,
                diagnostic.line,
                escape_html(&diagnostic.message)
            );
        }
        out.push_str("</ul>\n");
    }

    out.push_str("<div class=\"panes\">\n<div class=\"pane code\"><pre>\n");

    // map from rendered line index to source line, serialized for tooling
    let lines = render_lines(program);
    let mut line_map: Vec<(usize, u32)> = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        if line.text.is_empty() {
            out.push('\n');
            continue;
        }
        let folds = line.text.ends_with(':') && !line.text.starts_with("def");
        let _ = write!(
            out,
            "<div class=\"line{}\" data-indent=\"{}\">{}",
            if folds { " fold" } else { "" },
            line.indent,
            "&nbsp;&nbsp;&nbsp;&nbsp;".repeat(line.indent)
        );
        match line.link {
            Some(source_line) => {
                line_map.push((idx, source_line));
                let _ = write!(
                    out,
                    "<a href=\"#cob-{}\">{}</a>",
                    source_line,
                    escape_html(&line.text)
                );
            }
            None => out.push_str(&escape_html(&line.text)),
        }
        out.push_str("</div>\n");
    }

    out.push_str("</pre></div>\n<div class=\"pane cobol\"><pre>\n");
    for (idx, text) in source.lines().enumerate() {
        let number = idx + 1;
        let _ = writeln!(
            out,
            "<span id=\"cob-{}\"><span class=\"ln\">{:>6} </span>{}</span>",
            number,
            number,
            escape_html(text)
        );
    }
    out.push_str("</pre></div>\n</div>\n");

    let _ = writeln!(out, "<script>\nconst LINE_MAP = {};", serde_json::to_string(&line_map)?);
    out.push_str(FOLDING_SCRIPT);
    out.push_str("</script>\n</body>\n</html>\n");

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{flatten_program, StructureConfig};
    use cobolt_cfg::{
        build_acyclic, build_scopes, build_stmt_graph, build_structure_graph, prune_unreachable,
        section_views, AcyclicGraph,
    };
    use cobolt_common::diagnostics::Diagnostics;
    use cobolt_parser::parse;

    #[test]
    fn test_html_report_shape() {
        let source = "procedure division.\n\
             s section.\n\
             if a = 1 move 1 to b.\n\
             exit program.\n";
        let program = parse(source, "test.cbl").expect("source parses");
        let pg = build_stmt_graph(&program).expect("graph builds");
        let pg = build_structure_graph(&prune_unreachable(&pg));
        let views = section_views(&pg);
        let mut diags = Diagnostics::new();
        let mut counter = 0;
        let scoped: Vec<AcyclicGraph> = views
            .iter()
            .map(|view| build_scopes(&build_acyclic(view, &pg, &mut counter, &mut diags), &pg))
            .collect();
        let structured =
            flatten_program(&scoped, &pg, "test.cbl", &StructureConfig::default());

        let html = render_html(&structured, source).expect("report renders");
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("def s:"));
        assert!(html.contains("id=\"cob-3\""));
        assert!(html.contains("href=\"#cob-3\""));
        assert!(html.contains("const LINE_MAP"));
        assert!(html.contains("exit program."));
    }
}
