//! The typed procedure-division tree: sections own paragraphs, paragraphs
//! own sentences, sentences own statements. Every entity carries its source
//! range. Names are not required to be unique; resolution happens in the
//! graph builder, not here.

use serde::Serialize;

/// A source range. Lines are 1-based, columns 0-based. The text is the
/// token-normalized rendering of the range (single spaces between tokens).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Source {
    pub text: String,
    pub from_line: u32,
    pub from_col: u32,
    pub to_line: u32,
    pub to_col: u32,
}

impl Source {
    /// The smallest range covering both `self` and `other`.
    pub fn cover(&self, other: &Source) -> Source {
        let (from_line, from_col) =
            if (self.from_line, self.from_col) <= (other.from_line, other.from_col) {
                (self.from_line, self.from_col)
            } else {
                (other.from_line, other.from_col)
            };
        let (to_line, to_col) = if (self.to_line, self.to_col) >= (other.to_line, other.to_col) {
            (self.to_line, self.to_col)
        } else {
            (other.to_line, other.to_col)
        };
        Source { text: self.text.clone(), from_line, from_col, to_line, to_col }
    }
}

/// A parsed COBOL program: the original listing plus its procedure division.
#[derive(Debug, Clone, Serialize)]
pub struct Program {
    /// Path of the source file, for renderer cross-links.
    pub path: String,
    /// The full (tab-expanded) source text.
    pub source: String,
    pub procedure: ProcedureDivision,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcedureDivision {
    /// Sections in textual order. Loose paragraphs or sentences before the
    /// first named section live in a synthetic unnamed section at index 0.
    pub sections: Vec<Section>,
    pub source: Source,
}

#[derive(Debug, Clone, Serialize)]
pub struct Section {
    /// `None` for the synthetic initial section.
    pub name: Option<String>,
    pub paragraphs: Vec<Paragraph>,
    pub source: Source,
}

impl Section {
    /// The name used for rendering; the synthetic initial section is `main`.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("main")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Paragraph {
    /// `None` for the synthetic paragraph holding loose initial sentences.
    pub name: Option<String>,
    pub sentences: Vec<Sentence>,
    pub source: Source,
}

/// A run of statements terminated by `.`
#[derive(Debug, Clone, Serialize)]
pub struct Sentence {
    pub statements: Vec<Statement>,
    pub source: Source,
}

/// One COBOL statement. Immutable after construction.
#[derive(Debug, Clone, Serialize)]
pub struct Statement {
    pub kind: StatementKind,
    pub source: Source,
}

/// The closed set of statement shapes the pipeline distinguishes. Anything
/// sequential and opaque lands in `Move` or `Other`.
#[derive(Debug, Clone, Serialize)]
pub enum StatementKind {
    Move,
    Other {
        verb: String,
    },
    If {
        condition: Source,
        then_branch: Vec<Statement>,
        else_branch: Option<Vec<Statement>>,
    },
    GoTo {
        target: String,
    },
    Perform {
        target: String,
    },
    /// `perform a thru b`, carried through so the graph builder can reject
    /// it with a precise error instead of miscompiling.
    PerformRange {
        from: String,
        thru: String,
    },
    /// `perform ... end-perform` with no until/varying clause; the body is
    /// laid out inline by the graph builder.
    PerformInline {
        body: Vec<Statement>,
    },
    NextSentence,
    ExitSection,
    ExitProgram,
}

impl StatementKind {
    /// Verb used in graph labels and the XML dump.
    pub fn verb(&self) -> &str {
        match self {
            StatementKind::Move => "move",
            StatementKind::Other { verb } => verb,
            StatementKind::If { .. } => "if",
            StatementKind::GoTo { .. } => "go to",
            StatementKind::Perform { .. } |
            StatementKind::PerformRange { .. } |
            StatementKind::PerformInline { .. } => "perform",
            StatementKind::NextSentence => "next sentence",
            StatementKind::ExitSection => "exit",
            StatementKind::ExitProgram => "exit program",
        }
    }
}
