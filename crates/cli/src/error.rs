#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Generic(String),
    #[error("Pipeline error: {0}")]
    Core(#[from] cobolt_core::Error),
}
