//! Shared functionality for the cobolt toolkit: the per-program diagnostic
//! list threaded through the pipeline, and small io/string helpers used by
//! the pipeline crates and the CLI.

pub mod diagnostics;
pub mod utils;
