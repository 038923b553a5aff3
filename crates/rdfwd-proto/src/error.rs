use thiserror::Error;

/// Errors produced by the forwarding protocol layer.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("malformed rule: {0}")]
    MalformedRule(String),

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type ForwardResult<T> = Result<T, ForwardError>;
