//! The Cfg module turns the typed procedure-division tree into statement
//! flow graphs and recovers loop structure from them.
//!
//! The pipeline runs in stages, each producing a fresh graph so every
//! intermediate result can be inspected (and rendered to `.dot`):
//! statement graph, reachable subgraph, collapsed structure graph, acyclic
//! per-section graphs with recovered loops, and scoped graphs with explicit
//! loop exits. Node ids are stable across stages.

/// Error types for the cfg module
mod error;

pub mod blocks;
pub mod builder;
pub mod dot;
pub mod graph;
pub mod loops;
pub mod reachable;
pub mod scope;

// re-export the public interface
pub use blocks::{build_structure_graph, section_views, SectionGraph};
pub use builder::build_stmt_graph;
pub use error::Error;
pub use graph::{
    EdgeKind, FlowGraph, LeafKind, LoopId, Node, NodeId, ProgramGraph, SectionId, SectionInfo,
    StmtId, StmtInfo,
};
pub use loops::{build_acyclic, AcyclicGraph, Loop, LoopExit, WhileInfo};
pub use reachable::prune_unreachable;
pub use scope::build_scopes;
