pub(crate) mod error;
pub(crate) mod log_args;
pub(crate) mod output;

use clap::{Parser, ValueEnum};
use error::Error;
use log_args::LogArgs;
use output::output_base;
use tracing::info;

use cobolt_core::{
    cfg::{
        build_stmt_graph, build_structure_graph, dot::render_dot, prune_unreachable,
        AcyclicGraph, ProgramGraph,
    },
    common::utils::{
        io::file::{read_source_file, short_path, write_file},
        strings::expand_tabs,
    },
    parser::{parse, syntax::Program, xml::program_to_xml},
    recover_acyclic_graphs, recover_scoped_graphs,
    structure::{
        out::{html::render_html, text::render_code},
        StructureConfig,
    },
    structure_parsed,
};

#[derive(Debug, Parser)]
#[clap(
    name = "cobolt",
    author = "the cobolt contributors",
    version,
    about = "Reconstructs structured control flow from goto-heavy COBOL procedure divisions"
)]
pub struct Arguments {
    /// COBOL source files
    #[clap(required = true, value_name = "COBOL_FILE")]
    pub sources: Vec<String>,

    /// The output format
    #[clap(long, short, value_enum, default_value_t = OutputFormat::Html)]
    pub format: OutputFormat,

    /// Write output files to this directory instead of the source code dir
    #[clap(long, short)]
    pub destdir: Option<String>,

    /// Expand tabs by this many spaces
    #[clap(long, short, default_value_t = 4)]
    pub tabsize: usize,

    #[clap(flatten)]
    pub structure: StructureConfig,

    #[clap(flatten)]
    logs: LogArgs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Self-contained HTML report with source cross-links
    #[value(name = "html")]
    Html,
    /// Pythonish plain-text rendering
    #[value(name = "code")]
    Code,
    /// Position-annotated XML dump of the parse tree
    #[value(name = "xml")]
    Xml,
    /// Statement graph before reachability pruning, one .dot per section
    #[value(name = "full_stmt_graph")]
    FullStmtGraph,
    /// Reachable statement graph, one .dot per section
    #[value(name = "stmt_graph")]
    StmtGraph,
    /// Collapsed branch/join structure graph, one .dot per section
    #[value(name = "cobol_graph")]
    CobolGraph,
    /// Acyclic per-section graph with recovered loops, one .dot per section
    #[value(name = "acyclic_graph")]
    AcyclicGraph,
    /// Scoped graph with loop exits, one .dot per section
    #[value(name = "scope_graph")]
    ScopeGraph,
}

fn main() -> Result<(), Error> {
    let args = Arguments::parse();

    // setup logging
    let _ = args.logs.init_tracing();

    for source_path in &args.sources {
        process_source(&args, source_path)?;
    }

    Ok(())
}

fn process_source(args: &Arguments, source_path: &str) -> Result<(), Error> {
    let raw = read_source_file(source_path)
        .map_err(|e| Error::Generic(format!("failed to read {}: {}", source_path, e)))?;
    let source = expand_tabs(&raw, args.tabsize);

    let program =
        parse(&source, source_path).map_err(|e| Error::Core(cobolt_core::Error::Parser(e)))?;

    let base = output_base(args.destdir.as_deref(), source_path);

    match args.format {
        OutputFormat::Xml => {
            let path = format!("{}.xml", base.display());
            write_file(&path, &program_to_xml(&program))
                .map_err(|e| Error::Generic(format!("failed to write xml: {}", e)))?;
            info!("wrote {}", short_path(&path));
        }

        OutputFormat::Code => {
            let structured = structure_parsed(&program, &args.structure)?;
            structured.diagnostics.display();

            let path = format!("{}.py", base.display());
            write_file(&path, &render_code(&structured))
                .map_err(|e| Error::Generic(format!("failed to write code: {}", e)))?;
            info!("wrote {}", short_path(&path));
        }

        OutputFormat::Html => {
            let structured = structure_parsed(&program, &args.structure)?;
            structured.diagnostics.display();

            let path = format!("{}.html", base.display());
            let html = render_html(&structured, &source)
                .map_err(|e| Error::Core(cobolt_core::Error::Structure(e)))?;
            write_file(&path, &html)
                .map_err(|e| Error::Generic(format!("failed to write html: {}", e)))?;
            info!("wrote {}", short_path(&path));
        }

        OutputFormat::FullStmtGraph |
        OutputFormat::StmtGraph |
        OutputFormat::CobolGraph |
        OutputFormat::AcyclicGraph |
        OutputFormat::ScopeGraph => {
            write_graphs(args, &program, &base)?;
        }
    }

    Ok(())
}

/// Render the requested pipeline stage as one `.dot` file per section.
fn write_graphs(
    args: &Arguments,
    program: &Program,
    base: &std::path::Path,
) -> Result<(), Error> {
    let pg = build_stmt_graph(program).map_err(cobolt_core::Error::Cfg)?;

    let dots: Vec<(String, String)> = match args.format {
        OutputFormat::FullStmtGraph => per_section_dots(&pg),
        OutputFormat::StmtGraph => per_section_dots(&prune_unreachable(&pg)),
        OutputFormat::CobolGraph => {
            per_section_dots(&build_structure_graph(&prune_unreachable(&pg)))
        }
        OutputFormat::AcyclicGraph => {
            let (pg, acyclic) = recover_acyclic_graphs(pg);
            section_graph_dots(&pg, &acyclic)
        }
        OutputFormat::ScopeGraph => {
            let (pg, scoped) = recover_scoped_graphs(pg);
            section_graph_dots(&pg, &scoped)
        }
        _ => unreachable!("graph formats matched by the caller"),
    };

    for (section_name, dot) in dots {
        let path = format!("{}_{}.dot", base.display(), section_name);
        write_file(&path, &dot)
            .map_err(|e| Error::Generic(format!("failed to write graph: {}", e)))?;
        info!("wrote {}", short_path(&path));
    }

    Ok(())
}

fn per_section_dots(pg: &ProgramGraph) -> Vec<(String, String)> {
    pg.sections
        .iter()
        .filter(|info| pg.graph.contains(info.entry))
        .map(|info| (info.display_name.clone(), render_dot(&pg.graph, pg, Some(info.id))))
        .collect()
}

fn section_graph_dots(pg: &ProgramGraph, graphs: &[AcyclicGraph]) -> Vec<(String, String)> {
    graphs
        .iter()
        .map(|acyclic| {
            let name = pg.section(acyclic.section).display_name.clone();
            (name, render_dot(&acyclic.graph, pg, None))
        })
        .collect()
}
