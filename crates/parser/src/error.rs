/// Error type for the Parser module. All variants are fatal: the pipeline
/// needs a complete procedure-division tree to do anything useful.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The source contains no procedure division.
    #[error("no procedure division found")]
    MissingProcedureDivision,
    /// A token that fits no statement or header production.
    #[error("line {line}: unexpected token: {token}")]
    UnexpectedToken { token: String, line: u32 },
    /// A statement verb outside the supported mid-80s subset.
    #[error("line {line}: unsupported statement type: {verb}")]
    UnsupportedStatement { verb: String, line: u32 },
    /// A `perform` form with until/varying/times clauses.
    #[error("line {line}: unsupported perform statement")]
    UnsupportedPerform { line: u32 },
    /// A construct ran into the end of the source.
    #[error("line {line}: unterminated {what}")]
    Unterminated { what: &'static str, line: u32 },
    /// Generic internal error
    #[error("Internal error: {0}")]
    Eyre(#[from] eyre::Report),
}
