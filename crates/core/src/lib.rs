//! Umbrella crate for the cobolt toolkit: re-exports the pipeline crates
//! and provides the one-call front door used by the CLI and by tests.

/// Error types for the core module
mod error;

pub mod pipeline;

pub use cobolt_cfg as cfg;
pub use cobolt_common as common;
pub use cobolt_parser as parser;
pub use cobolt_structure as structure;

// re-export the public interface
pub use error::Error;
pub use pipeline::{
    recover_acyclic_graphs, recover_scoped_graphs, structure_parsed, structure_source,
};
