/// Error type for the Cfg module. These are the fatal builder-stage
/// conditions; everything recoverable is a diagnostic instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A `go to` or `perform` names a paragraph or section that does not
    /// exist.
    #[error("line {line}: unresolved go to or perform target: {name}")]
    UnresolvedLabel { name: String, line: u32 },
    /// `perform a thru b` is outside the structured-COBOL assumption.
    #[error("line {line}: perform range {from} thru {thru} is not supported")]
    UnsupportedPerformRange { from: String, thru: String, line: u32 },
    /// Generic internal error
    #[error("Internal error: {0}")]
    Eyre(#[from] eyre::Report),
}
