/// Error type for the Structure module. The flattener itself never fails;
/// these cover the renderer surface.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Rendered output could not be serialized.
    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
    /// Generic internal error
    #[error("Internal error: {0}")]
    Eyre(#[from] eyre::Report),
}
