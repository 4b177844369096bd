#[derive(Debug, thiserror::Error)]
pub enum ConsultError {
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("failed to open upstream completion stream: {0}")]
    Upstream(String),
    #[error("upstream completion stream failed: {0}")]
    UpstreamStream(String),
    #[error("invalid configuration: {0}")]
    Configuration(String),
}

pub type ConsultResult<T> = std::result::Result<T, ConsultError>;
