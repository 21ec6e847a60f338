//! Recursive-descent parser from the token stream to the typed tree.
//!
//! The grammar is the `goto`-heavy mid-80s subset: sections, paragraphs,
//! sentences, and the statement shapes the flow pipeline distinguishes.
//! Conditions and operands are collected as opaque source ranges.

use std::collections::HashSet;

use lazy_static::lazy_static;

use crate::{
    error::Error,
    syntax::{
        Paragraph, ProcedureDivision, Program, Section, Sentence, Source, Statement, StatementKind,
    },
    tokenizer::{Token, TokenKind, Tokenizer},
};

lazy_static! {
    /// Verbs that can start a statement in the supported subset.
    static ref STATEMENT_VERBS: HashSet<&'static str> = [
        "accept", "add", "call", "cancel", "close", "compute", "continue", "delete", "display",
        "divide", "exit", "go", "goback", "if", "initialize", "inspect", "merge", "move",
        "multiply", "next", "open", "perform", "read", "release", "rewrite", "search", "set",
        "sort", "stop", "string", "subtract", "unstring", "write",
    ]
    .into_iter()
    .collect();

    /// Verbs that are recognized COBOL but outside the supported subset.
    static ref UNSUPPORTED_VERBS: HashSet<&'static str> =
        ["alter", "evaluate", "use"].into_iter().collect();
}

/// Words that terminate a nested statement list.
const IF_STOPS: &[&str] = &["else", "end-if"];
const ELSE_STOPS: &[&str] = &["end-if"];
const INLINE_PERFORM_STOPS: &[&str] = &["end-perform"];

/// Parse COBOL source into a [`Program`]. `path` is carried through for
/// renderer cross-links only.
pub fn parse(source: &str, path: impl Into<String>) -> Result<Program, Error> {
    let tokens = Tokenizer::tokenize(source);
    let mut parser = Parser { tokens, position: 0 };
    let procedure = parser.parse_procedure_division()?;
    Ok(Program { path: path.into(), source: source.to_string(), procedure })
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

/// Accumulates one section while its paragraphs stream in.
struct SectionAcc {
    name: Option<String>,
    source: Source,
    paragraphs: Vec<Paragraph>,
}

/// Accumulates one paragraph while its sentences stream in.
struct ParaAcc {
    name: Option<String>,
    source: Source,
    sentences: Vec<Sentence>,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.position + offset)
    }

    fn bump(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.position);
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn peek_is_word(&self, keyword: &str) -> bool {
        self.peek().is_some_and(|t| t.is_word(keyword))
    }

    fn last_line(&self) -> u32 {
        self.tokens.last().map(|t| t.line).unwrap_or(1)
    }

    /// The source range covering tokens `[from, to]`, text joined with
    /// single spaces.
    fn source_range(&self, from: usize, to: usize) -> Source {
        let slice = &self.tokens[from..=to.min(self.tokens.len().saturating_sub(1))];
        let first = &slice[0];
        let last = &slice[slice.len() - 1];
        Source {
            text: slice.iter().map(|t| t.text.as_str()).collect::<Vec<_>>().join(" "),
            from_line: first.line,
            from_col: first.col,
            to_line: last.line,
            to_col: last.end_col(),
        }
    }

    fn unexpected(&self, token: &Token) -> Error {
        Error::UnexpectedToken { token: token.text.clone(), line: token.line }
    }

    // ---------------------------------------------------------------------
    // Division structure
    // ---------------------------------------------------------------------

    fn parse_procedure_division(&mut self) -> Result<ProcedureDivision, Error> {
        // Skip the preamble divisions: scan for `procedure division`.
        let mut found = None;
        for i in 0..self.tokens.len() {
            if self.tokens[i].is_word("procedure") &&
                self.tokens.get(i + 1).is_some_and(|t| t.is_word("division"))
            {
                found = Some(i);
                break;
            }
        }
        let header = found.ok_or(Error::MissingProcedureDivision)?;

        // Consume the header sentence (`using ...` clauses included).
        self.position = header + 2;
        while let Some(token) = self.bump() {
            if token.kind == TokenKind::Period {
                break;
            }
        }

        let mut sections: Vec<Section> = Vec::new();
        let mut section: Option<SectionAcc> = None;
        let mut para: Option<ParaAcc> = None;

        while let Some(token) = self.peek().cloned() {
            match token.kind {
                // A stray period is an empty sentence; skip it.
                TokenKind::Period => {
                    self.bump();
                }
                TokenKind::Literal => return Err(self.unexpected(&token)),
                TokenKind::Word => {
                    let word = token.folded();

                    // `end program x.` terminates the unit.
                    if word == "end" && self.peek_at(1).is_some_and(|t| t.is_word("program")) {
                        break;
                    }

                    if UNSUPPORTED_VERBS.contains(word.as_str()) {
                        return Err(Error::UnsupportedStatement { verb: word, line: token.line });
                    }

                    if STATEMENT_VERBS.contains(word.as_str()) {
                        let sentence = self.parse_sentence()?;
                        let acc = para.get_or_insert_with(|| ParaAcc {
                            name: None,
                            source: sentence.source.clone(),
                            sentences: Vec::new(),
                        });
                        acc.source = acc.source.cover(&sentence.source);
                        acc.sentences.push(sentence);
                        continue;
                    }

                    if !is_name(&token.text) {
                        return Err(self.unexpected(&token));
                    }

                    // Header: `<name> section.` or `<name>.`
                    if self.peek_at(1).is_some_and(|t| t.is_word("section")) &&
                        self.peek_at(2).map(|t| t.kind) == Some(TokenKind::Period)
                    {
                        let header_source = self.source_range(self.position, self.position + 2);
                        self.position += 3;
                        flush_para(&mut section, &mut para);
                        flush_section(&mut sections, &mut section);
                        section = Some(SectionAcc {
                            name: Some(word),
                            source: header_source,
                            paragraphs: Vec::new(),
                        });
                    } else if self.peek_at(1).map(|t| t.kind) == Some(TokenKind::Period) {
                        let header_source = self.source_range(self.position, self.position + 1);
                        self.position += 2;
                        flush_para(&mut section, &mut para);
                        para = Some(ParaAcc {
                            name: Some(word),
                            source: header_source,
                            sentences: Vec::new(),
                        });
                    } else {
                        return Err(self.unexpected(&token));
                    }
                }
            }
        }

        flush_para(&mut section, &mut para);
        flush_section(&mut sections, &mut section);

        if sections.is_empty() {
            return Err(Error::Unterminated { what: "procedure division", line: self.last_line() });
        }

        let source = sections
            .iter()
            .map(|s| s.source.clone())
            .reduce(|a, b| a.cover(&b))
            .expect("sections is non-empty");

        Ok(ProcedureDivision { sections, source })
    }

    fn parse_sentence(&mut self) -> Result<Sentence, Error> {
        let start = self.position;
        let statements = self.parse_statements(&[])?;

        match self.peek().map(|t| t.kind) {
            Some(TokenKind::Period) => {
                let end = self.position;
                self.bump();
                Ok(Sentence { statements, source: self.source_range(start, end) })
            }
            _ => Err(Error::Unterminated { what: "sentence", line: self.last_line() }),
        }
    }

    // ---------------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------------

    /// Parse statements until a period, one of `stops`, or end of input.
    fn parse_statements(&mut self, stops: &[&str]) -> Result<Vec<Statement>, Error> {
        let mut statements = Vec::new();

        while let Some(token) = self.peek() {
            if token.kind == TokenKind::Period {
                break;
            }
            if token.kind == TokenKind::Word {
                let folded = token.folded();
                if stops.contains(&folded.as_str()) {
                    break;
                }
            }
            statements.push(self.parse_statement(stops)?);
        }

        Ok(statements)
    }

    fn parse_statement(&mut self, stops: &[&str]) -> Result<Statement, Error> {
        let token = self.peek().cloned().expect("caller checked for a token");
        if token.kind != TokenKind::Word {
            return Err(self.unexpected(&token));
        }
        let verb = token.folded();
        let start = self.position;

        let kind = match verb.as_str() {
            "if" => self.parse_if()?,
            "go" => {
                self.bump();
                if self.peek_is_word("to") {
                    self.bump();
                }
                StatementKind::GoTo { target: self.expect_name()? }
            }
            "perform" => self.parse_perform()?,
            "next" => {
                self.bump();
                if !self.peek_is_word("sentence") {
                    let line = token.line;
                    return Err(Error::UnexpectedToken { token: "next".to_string(), line });
                }
                self.bump();
                StatementKind::NextSentence
            }
            "exit" => {
                self.bump();
                if self.peek_is_word("program") {
                    self.bump();
                    StatementKind::ExitProgram
                } else {
                    if self.peek_is_word("section") {
                        self.bump();
                    }
                    StatementKind::ExitSection
                }
            }
            "goback" => {
                self.bump();
                StatementKind::ExitProgram
            }
            "stop" => {
                self.bump();
                if self.peek_is_word("run") {
                    self.bump();
                    StatementKind::ExitProgram
                } else {
                    self.consume_operands(stops);
                    StatementKind::Other { verb }
                }
            }
            "move" => {
                self.bump();
                self.consume_operands(stops);
                StatementKind::Move
            }
            v if STATEMENT_VERBS.contains(v) => {
                self.bump();
                self.consume_operands(stops);
                StatementKind::Other { verb }
            }
            v if UNSUPPORTED_VERBS.contains(v) => {
                return Err(Error::UnsupportedStatement { verb: verb.clone(), line: token.line });
            }
            _ => return Err(self.unexpected(&token)),
        };

        let end = self.position.saturating_sub(1).max(start);
        Ok(Statement { kind, source: self.source_range(start, end) })
    }

    /// Consume operand tokens of a plain statement: everything up to the
    /// period, a stop word, or the next statement verb.
    fn consume_operands(&mut self, stops: &[&str]) {
        while let Some(token) = self.peek() {
            match token.kind {
                TokenKind::Period => break,
                TokenKind::Word => {
                    let folded = token.folded();
                    if stops.contains(&folded.as_str()) ||
                        STATEMENT_VERBS.contains(folded.as_str()) ||
                        folded == "else" ||
                        folded.starts_with("end-")
                    {
                        break;
                    }
                    self.bump();
                }
                TokenKind::Literal => {
                    self.bump();
                }
            }
        }
    }

    fn parse_if(&mut self) -> Result<StatementKind, Error> {
        let if_token = self.peek().cloned().expect("caller checked for a token");
        self.bump();

        // Condition: opaque tokens until `then`, a statement verb, or a
        // construct boundary.
        let cond_start = self.position;
        while let Some(token) = self.peek() {
            if token.kind == TokenKind::Period {
                break;
            }
            if token.kind == TokenKind::Word {
                let folded = token.folded();
                if folded == "then" || folded == "else" || folded == "end-if" {
                    break;
                }
                if STATEMENT_VERBS.contains(folded.as_str()) && self.position > cond_start {
                    break;
                }
            }
            self.bump();
        }
        if self.position == cond_start {
            return Err(self.unexpected(&if_token));
        }
        let condition = self.source_range(cond_start, self.position - 1);

        if self.peek_is_word("then") {
            self.bump();
        }

        let then_branch = self.parse_statements(IF_STOPS)?;

        let else_branch = if self.peek_is_word("else") {
            self.bump();
            Some(self.parse_statements(ELSE_STOPS)?)
        } else {
            None
        };

        if self.peek_is_word("end-if") {
            self.bump();
        }

        Ok(StatementKind::If { condition, then_branch, else_branch })
    }

    fn parse_perform(&mut self) -> Result<StatementKind, Error> {
        let perform_token = self.peek().cloned().expect("caller checked for a token");
        self.bump();

        let next = match self.peek() {
            Some(token) => token.clone(),
            None => {
                return Err(Error::Unterminated { what: "perform", line: perform_token.line });
            }
        };

        if next.kind != TokenKind::Word {
            return Err(Error::UnsupportedPerform { line: perform_token.line });
        }
        let folded = next.folded();

        // `perform until ...` / `perform varying ...` / `perform with test ...`
        if matches!(folded.as_str(), "until" | "varying" | "with" | "test" | "times") {
            return Err(Error::UnsupportedPerform { line: perform_token.line });
        }

        // Inline perform: `perform <statements> end-perform`.
        if STATEMENT_VERBS.contains(folded.as_str()) || folded == "end-perform" {
            let body = self.parse_statements(INLINE_PERFORM_STOPS)?;
            if !self.peek_is_word("end-perform") {
                return Err(Error::Unterminated {
                    what: "inline perform",
                    line: perform_token.line,
                });
            }
            self.bump();
            return Ok(StatementKind::PerformInline { body });
        }

        if !is_name(&next.text) {
            return Err(self.unexpected(&next));
        }
        self.bump();
        let target = folded;

        if self.peek_is_word("thru") || self.peek_is_word("through") {
            self.bump();
            let thru = self.expect_name()?;
            return Ok(StatementKind::PerformRange { from: target, thru });
        }

        // A repetition clause after the target is the unsupported form.
        if let Some(token) = self.peek() {
            if token.kind == TokenKind::Word {
                let folded = token.folded();
                if matches!(folded.as_str(), "until" | "varying" | "times") ||
                    folded.chars().all(|c| c.is_ascii_digit())
                {
                    return Err(Error::UnsupportedPerform { line: perform_token.line });
                }
            }
        }

        Ok(StatementKind::Perform { target })
    }

    fn expect_name(&mut self) -> Result<String, Error> {
        match self.peek().cloned() {
            Some(token) if token.kind == TokenKind::Word && is_name(&token.text) => {
                self.bump();
                Ok(token.folded())
            }
            Some(token) => Err(self.unexpected(&token)),
            None => Err(Error::Unterminated { what: "name", line: self.last_line() }),
        }
    }
}

/// A COBOL word usable as a paragraph or section name.
fn is_name(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    text.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') &&
        text.chars().any(|c| c.is_ascii_alphabetic())
}

fn flush_para(section: &mut Option<SectionAcc>, para: &mut Option<ParaAcc>) {
    if let Some(acc) = para.take() {
        let section = section.get_or_insert_with(|| SectionAcc {
            name: None,
            source: acc.source.clone(),
            paragraphs: Vec::new(),
        });
        section.source = section.source.cover(&acc.source);
        section.paragraphs.push(Paragraph {
            name: acc.name,
            sentences: acc.sentences,
            source: acc.source,
        });
    }
}

fn flush_section(sections: &mut Vec<Section>, section: &mut Option<SectionAcc>) {
    if let Some(acc) = section.take() {
        let source = acc
            .paragraphs
            .iter()
            .map(|p| p.source.clone())
            .fold(acc.source.clone(), |a, b| a.cover(&b));
        sections.push(Section { name: acc.name, paragraphs: acc.paragraphs, source });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Program {
        parse(source, "test.cbl").expect("source parses")
    }

    #[test]
    fn test_simple_section() {
        let program = parse_ok(
            "procedure division.\n\
             sub section.\n\
             move 'x' to a.\n\
             perform helper.\n\
             exit program.\n",
        );

        let sections = &program.procedure.sections;
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].display_name(), "sub");

        let para = &sections[0].paragraphs[0];
        assert_eq!(para.name, None);
        assert_eq!(para.sentences.len(), 3);
        assert!(matches!(para.sentences[0].statements[0].kind, StatementKind::Move));
        assert!(matches!(
            &para.sentences[1].statements[0].kind,
            StatementKind::Perform { target } if target == "helper"
        ));
        assert!(matches!(para.sentences[2].statements[0].kind, StatementKind::ExitProgram));
    }

    #[test]
    fn test_loose_sentences_make_virtual_section() {
        let program = parse_ok(
            "procedure division.\n\
             move 1 to a.\n\
             sub section.\n\
             p1.\n\
             move 2 to a.\n",
        );

        let sections = &program.procedure.sections;
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].name, None);
        assert_eq!(sections[0].display_name(), "main");
        assert_eq!(sections[1].paragraphs[0].name.as_deref(), Some("p1"));
    }

    #[test]
    fn test_if_else_nesting() {
        let program = parse_ok(
            "procedure division.\n\
             s section.\n\
             if a not = 'x'\n\
                if a = 'y' move 0 to b\n\
                else next sentence\n\
             else\n\
                move 1 to b.\n",
        );

        let stmt = &program.procedure.sections[0].paragraphs[0].sentences[0].statements[0];
        let StatementKind::If { condition, then_branch, else_branch } = &stmt.kind else {
            panic!("expected if, got {:?}", stmt.kind);
        };
        assert_eq!(condition.text, "a not = 'x'");

        let StatementKind::If { condition: inner, then_branch: inner_then, else_branch: inner_else } =
            &then_branch[0].kind
        else {
            panic!("expected nested if");
        };
        assert_eq!(inner.text, "a = 'y'");
        assert!(matches!(inner_then[0].kind, StatementKind::Move));
        assert!(matches!(
            inner_else.as_ref().expect("has else")[0].kind,
            StatementKind::NextSentence
        ));

        assert!(matches!(
            else_branch.as_ref().expect("has else")[0].kind,
            StatementKind::Move
        ));
    }

    #[test]
    fn test_goto_and_exit() {
        let program = parse_ok(
            "procedure division.\n\
             sub section.\n\
             start-it.\n\
             go to sub-exit.\n\
             sub-exit.\n\
             exit.\n",
        );

        let paras = &program.procedure.sections[0].paragraphs;
        assert_eq!(paras.len(), 2);
        assert!(matches!(
            &paras[0].sentences[0].statements[0].kind,
            StatementKind::GoTo { target } if target == "sub-exit"
        ));
        assert!(matches!(paras[1].sentences[0].statements[0].kind, StatementKind::ExitSection));
    }

    #[test]
    fn test_perform_thru_is_represented() {
        let program = parse_ok(
            "procedure division.\n\
             s section.\n\
             perform p-1 thru p-9.\n\
             p-1.\n\
             move 1 to a.\n\
             p-9.\n\
             exit.\n",
        );

        let stmt = &program.procedure.sections[0].paragraphs[0].sentences[0].statements[0];
        assert!(matches!(
            &stmt.kind,
            StatementKind::PerformRange { from, thru } if from == "p-1" && thru == "p-9"
        ));
    }

    #[test]
    fn test_perform_until_is_rejected() {
        let err = parse(
            "procedure division.\ns section.\nperform sub until a = 1.\n",
            "test.cbl",
        )
        .expect_err("until clause is unsupported");
        assert!(matches!(err, Error::UnsupportedPerform { line: 3 }));
    }

    #[test]
    fn test_inline_perform() {
        let program = parse_ok(
            "procedure division.\n\
             s section.\n\
             perform move 1 to a move 2 to b end-perform.\n",
        );

        let stmt = &program.procedure.sections[0].paragraphs[0].sentences[0].statements[0];
        let StatementKind::PerformInline { body } = &stmt.kind else {
            panic!("expected inline perform");
        };
        assert_eq!(body.len(), 2);
    }

    #[test]
    fn test_missing_procedure_division() {
        let err = parse("identification division.\n", "test.cbl")
            .expect_err("no procedure division");
        assert!(matches!(err, Error::MissingProcedureDivision));
    }

    #[test]
    fn test_statement_source_text() {
        let program = parse_ok("procedure division.\ns section.\nmove 'x' to a.\n");
        let stmt = &program.procedure.sections[0].paragraphs[0].sentences[0].statements[0];
        assert_eq!(stmt.source.text, "move 'x' to a");
        assert_eq!(stmt.source.from_line, 3);
    }
}
