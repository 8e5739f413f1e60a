#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("invalid shape: {0}")]
    InvalidShape(String),
    /// A predictor failed during a forward pass.
    #[error("predictor error: {0}")]
    Predictor(String),
    /// A data stream failed while producing a batch.
    #[error("stream error: {0}")]
    Stream(String),
}

pub type Result<T> = std::result::Result<T, Error>;
