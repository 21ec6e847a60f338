//! The end-to-end pipeline: parse tree → statement graph → reachable
//! subgraph → structure graph → per-section acyclic graphs → scoped graphs
//! → structured tree. Each stage yields a fresh value, so callers can stop
//! at any stage for inspection.

use std::time::Instant;

use cobolt_cfg::{
    build_acyclic, build_scopes, build_stmt_graph, build_structure_graph, prune_unreachable,
    section_views, AcyclicGraph, ProgramGraph,
};
use cobolt_common::diagnostics::Diagnostics;
use cobolt_parser::syntax::Program;
use cobolt_structure::{flatten_program, StructureConfig, StructuredProgram};
use tracing::{debug, info};

use crate::error::Error;

/// Parse COBOL source and recover its structured form.
pub fn structure_source(
    source: &str,
    path: &str,
    config: &StructureConfig,
) -> Result<StructuredProgram, Error> {
    let program = cobolt_parser::parse(source, path)?;
    structure_parsed(&program, config)
}

/// Recover the structured form of an already-parsed program.
pub fn structure_parsed(
    program: &Program,
    config: &StructureConfig,
) -> Result<StructuredProgram, Error> {
    let start_time = Instant::now();

    let pg = build_stmt_graph(program)?;
    let (pg, scoped) = recover_scoped_graphs(pg);
    let structured = flatten_program(&scoped, &pg, program.path.clone(), config);

    debug!("structure recovery took {:?}", start_time.elapsed());
    info!(
        sections = structured.sections.len(),
        diagnostics = structured.diagnostics.len(),
        "structured {}",
        program.path
    );
    Ok(structured)
}

/// Run the graph stages up to loop recovery: pruning, collapsing, and the
/// per-section acyclic rewrite. Returns the (pruned, collapsed) program
/// graph and one acyclic graph per reachable section.
pub fn recover_acyclic_graphs(pg: ProgramGraph) -> (ProgramGraph, Vec<AcyclicGraph>) {
    let mut pg = build_structure_graph(&prune_unreachable(&pg));

    let views = section_views(&pg);
    let mut diagnostics = Diagnostics::new();
    let mut loop_counter = 0;
    let acyclic: Vec<AcyclicGraph> = views
        .iter()
        .map(|view| build_acyclic(view, &pg, &mut loop_counter, &mut diagnostics))
        .collect();
    pg.diagnostics.append(&mut diagnostics);

    (pg, acyclic)
}

/// Like [`recover_acyclic_graphs`], plus the scope stage: loop exits become
/// break markers and `while` candidates are marked.
pub fn recover_scoped_graphs(pg: ProgramGraph) -> (ProgramGraph, Vec<AcyclicGraph>) {
    let (pg, acyclic) = recover_acyclic_graphs(pg);
    let scoped = acyclic.iter().map(|a| build_scopes(a, &pg)).collect();
    (pg, scoped)
}
