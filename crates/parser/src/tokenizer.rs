//! Line-oriented tokenizer for COBOL source. Handles both fixed-format
//! listings (sequence area in columns 1-6, indicator in column 7) and the
//! looser free-ish format test fixtures are written in.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// A COBOL word: name, verb, operator or number.
    Word,
    /// A quoted literal, quotes included.
    Literal,
    /// A sentence-terminating period.
    Period,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// 1-based line.
    pub line: u32,
    /// 0-based column of the first character.
    pub col: u32,
}

impl Token {
    /// 0-based column one past the last character.
    pub fn end_col(&self) -> u32 {
        self.col + self.text.chars().count() as u32
    }

    /// Case-folded text for keyword comparison.
    pub fn folded(&self) -> String {
        self.text.to_lowercase()
    }

    pub fn is_word(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.text.eq_ignore_ascii_case(keyword)
    }
}

pub struct Tokenizer;

impl Tokenizer {
    pub fn tokenize(source: &str) -> Vec<Token> {
        let mut tokens = Vec::new();

        for (idx, line) in source.lines().enumerate() {
            let line_no = idx as u32 + 1;
            if is_comment_line(line) {
                continue;
            }
            Self::tokenize_line(line, line_no, &mut tokens);
        }

        tokens
    }

    fn tokenize_line(line: &str, line_no: u32, tokens: &mut Vec<Token>) {
        let chars: Vec<char> = line.chars().collect();
        let mut i = skip_sequence_area(&chars);

        while i < chars.len() {
            let ch = chars[i];

            // Separators: whitespace, and the comma/semicolon noise words.
            if ch.is_whitespace() || ch == ',' || ch == ';' {
                i += 1;
                continue;
            }

            if ch == '\'' || ch == '"' {
                let start = i;
                let quote = ch;
                i += 1;
                while i < chars.len() && chars[i] != quote {
                    i += 1;
                }
                // include the closing quote when present
                if i < chars.len() {
                    i += 1;
                }
                tokens.push(Token {
                    kind: TokenKind::Literal,
                    text: chars[start..i].iter().collect(),
                    line: line_no,
                    col: start as u32,
                });
                continue;
            }

            if ch == '.' {
                tokens.push(Token {
                    kind: TokenKind::Period,
                    text: ".".to_string(),
                    line: line_no,
                    col: i as u32,
                });
                i += 1;
                continue;
            }

            // A word runs until a separator, quote, or period. A period
            // between two digits is a decimal point and stays in the word.
            let start = i;
            while i < chars.len() {
                let c = chars[i];
                if c.is_whitespace() || c == ',' || c == ';' || c == '\'' || c == '"' {
                    break;
                }
                if c == '.' {
                    let prev_digit = i > start && chars[i - 1].is_ascii_digit();
                    let next_digit = i + 1 < chars.len() && chars[i + 1].is_ascii_digit();
                    if !(prev_digit && next_digit) {
                        break;
                    }
                }
                i += 1;
            }
            tokens.push(Token {
                kind: TokenKind::Word,
                text: chars[start..i].iter().collect(),
                line: line_no,
                col: start as u32,
            });
        }
    }
}

/// Fixed-format sources carry a numeric sequence area in columns 1-6;
/// skip it so it never tokenizes as words.
fn skip_sequence_area(chars: &[char]) -> usize {
    if chars.len() > 6 && chars[..6].iter().all(|c| c.is_ascii_digit()) {
        // column 7 is the indicator column; a blank one is skipped too
        if chars[6] == ' ' {
            return 7;
        }
        return 6;
    }
    0
}

fn is_comment_line(line: &str) -> bool {
    // Fixed format: '*' or '/' in the indicator column after a sequence area.
    let chars: Vec<char> = line.chars().collect();
    if chars.len() > 6 &&
        chars[..6].iter().all(|c| c.is_ascii_digit() || *c == ' ') &&
        (chars[6] == '*' || chars[6] == '/')
    {
        return true;
    }
    // Free-ish format: a line whose first non-blank character is '*'.
    line.trim_start().starts_with('*')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(source: &str) -> Vec<String> {
        Tokenizer::tokenize(source).into_iter().map(|t| t.text).collect()
    }

    #[test]
    fn test_words_and_period() {
        assert_eq!(words("move 'x' to a."), vec!["move", "'x'", "to", "a", "."]);
    }

    #[test]
    fn test_decimal_point_stays_in_word() {
        assert_eq!(words("move 3.14 to pi."), vec!["move", "3.14", "to", "pi", "."]);
    }

    #[test]
    fn test_comment_lines_skipped() {
        let source = "      * a comment\n       move 1 to a.\n";
        assert_eq!(words(source), vec!["move", "1", "to", "a", "."]);
    }

    #[test]
    fn test_sequence_area_skipped() {
        let source = "000100 move 1 to a.\n000200* comment\n";
        assert_eq!(words(source), vec!["move", "1", "to", "a", "."]);
    }

    #[test]
    fn test_positions() {
        let tokens = Tokenizer::tokenize("  if a = 'x'\n    move 1 to b.");
        assert_eq!(tokens[0].line, 1);
        assert_eq!(tokens[0].col, 2);
        assert_eq!(tokens[3].text, "'x'");
        assert_eq!(tokens[4].line, 2);
        let period = tokens.last().expect("has tokens");
        assert_eq!(period.kind, TokenKind::Period);
    }

    #[test]
    fn test_comma_is_separator() {
        assert_eq!(words("add 1, 2 to a."), vec!["add", "1", "2", "to", "a", "."]);
    }
}
