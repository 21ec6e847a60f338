//! The Structure module flattens the scoped per-section DAGs into nested
//! block trees and renders them for people: Pythonish text, a self-contained
//! HTML report, or the raw IR.
//!
//! The flattener never fails. Where structure cannot be recovered it emits
//! labeled gotos, guided by a local duplication-vs-goto cost rule whose
//! knobs live on [`StructureConfig`].

/// Error types for the structure module
mod error;

mod config;
mod flatten;
mod tree;

pub mod out;

// re-export the public interface
pub use config::{StructureConfig, StructureConfigBuilder};
pub use error::Error;
pub use flatten::flatten_program;
pub use tree::{StructuredProgram, StructuredSection, Tree};
