//! The Parser module reads a COBOL source listing and produces the typed
//! procedure-division tree consumed by the flow-graph pipeline.
//!
//! Only the procedure division is analyzed; the identification, environment
//! and data divisions are skipped as opaque preamble. Expressions are not
//! interpreted: conditions and operands are carried as opaque source ranges.

/// Error types for the parser module
mod error;

mod parser;
mod tokenizer;

pub mod syntax;
pub mod xml;

// re-export the public interface
pub use error::Error;
pub use parser::parse;
pub use tokenizer::{Token, TokenKind, Tokenizer};
