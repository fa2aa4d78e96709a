use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("invalid audio format: {0}")]
    InvalidFormat(String),

    #[error("failed to decode audio: {0}")]
    DecodeFailed(String),

    #[error("file not found: {0}")]
    FileNotFound(std::path::PathBuf),

    #[error("allocation would exceed the configured memory budget: {0}")]
    OutOfMemory(String),

    #[error("{0} is not implemented")]
    NotImplemented(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;

impl AnalysisError {
    pub fn invalid_parameter(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}
