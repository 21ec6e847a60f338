/// Error type for the core pipeline: fatal conditions from the stages it
/// drives. Warnings travel on the diagnostics list instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Error while parsing the COBOL source
    #[error("Parser error: {0}")]
    Parser(#[from] cobolt_parser::Error),
    /// Error while building the statement graph
    #[error("Graph error: {0}")]
    Cfg(#[from] cobolt_cfg::Error),
    /// Error from a renderer
    #[error("Render error: {0}")]
    Structure(#[from] cobolt_structure::Error),
    /// Generic internal error
    #[error("Internal error: {0}")]
    Eyre(#[from] eyre::Report),
}
