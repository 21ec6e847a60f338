//! Non-fatal findings accumulated while a program moves through the
//! pipeline. Fatal conditions are crate-level `Error`s instead; everything
//! here survives to the final IR so renderers can surface it.

use colored::Colorize;
use serde::Serialize;

/// How serious a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    /// Informational finding, e.g. unreachable code.
    Info,
    /// The output degrades but processing continues.
    Warning,
}

/// The closed set of non-fatal findings the pipeline can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiagnosticKind {
    /// A paragraph or section name is defined more than once.
    DuplicateName,
    /// A `go to` targets a paragraph in a different section.
    CrossSectionGoto,
    /// A cycle that is not a natural loop; emitted as labeled gotos.
    IrreducibleControlFlow,
    /// Statements not reachable from the program entry.
    UnreachableCode,
}

impl DiagnosticKind {
    /// The default severity for this kind.
    pub fn severity(&self) -> Severity {
        match self {
            DiagnosticKind::UnreachableCode => Severity::Info,
            _ => Severity::Warning,
        }
    }

    fn tag(&self) -> &'static str {
        match self {
            DiagnosticKind::DuplicateName => "duplicate-name",
            DiagnosticKind::CrossSectionGoto => "cross-section-goto",
            DiagnosticKind::IrreducibleControlFlow => "irreducible-control-flow",
            DiagnosticKind::UnreachableCode => "unreachable-code",
        }
    }
}

/// One finding, anchored to a source line.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub severity: Severity,
    pub line: u32,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, line: u32, message: impl Into<String>) -> Self {
        Diagnostic { kind, severity: kind.severity(), line, message: message.into() }
    }
}

/// The per-program diagnostic list. Order of insertion is preserved so
/// identical inputs produce identical reports.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }

    pub fn report(&mut self, kind: DiagnosticKind, line: u32, message: impl Into<String>) {
        self.push(Diagnostic::new(kind, line, message));
    }

    pub fn append(&mut self, other: &mut Diagnostics) {
        self.entries.append(&mut other.entries);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        self.entries.iter().any(|d| d.severity == Severity::Warning)
    }

    /// Print the accumulated findings to the console, colored by severity.
    pub fn display(&self) {
        for diagnostic in &self.entries {
            let label = match diagnostic.severity {
                Severity::Warning => "warning".yellow().bold(),
                Severity::Info => "info".cyan().bold(),
            };
            println!(
                "{}: line {}: [{}] {}",
                label,
                diagnostic.line,
                diagnostic.kind.tag(),
                diagnostic.message
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_defaults() {
        assert_eq!(DiagnosticKind::UnreachableCode.severity(), Severity::Info);
        assert_eq!(DiagnosticKind::DuplicateName.severity(), Severity::Warning);
        assert_eq!(DiagnosticKind::CrossSectionGoto.severity(), Severity::Warning);
    }

    #[test]
    fn test_accumulation_preserves_order() {
        let mut diags = Diagnostics::new();
        diags.report(DiagnosticKind::DuplicateName, 10, "para defined twice");
        diags.report(DiagnosticKind::UnreachableCode, 22, "3 statements unreachable");

        let lines: Vec<u32> = diags.iter().map(|d| d.line).collect();
        assert_eq!(lines, vec![10, 22]);
        assert!(diags.has_warnings());
    }

    #[test]
    fn test_append_drains_other() {
        let mut a = Diagnostics::new();
        let mut b = Diagnostics::new();
        b.report(DiagnosticKind::IrreducibleControlFlow, 5, "crossed branches");
        a.append(&mut b);
        assert_eq!(a.len(), 1);
        assert!(b.is_empty());
    }
}
