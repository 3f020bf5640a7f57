use thiserror::Error;

/// Centralized error type for syrinx-net.
#[derive(Debug, Error)]
pub enum NetError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("invalid byte range: {0}")]
    InvalidRange(String),

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    /// The server answered, but not with a usable object (non-200/206 or a
    /// malformed status line). Callers abandon the attempt and move on.
    #[error("not a fetchable object: {0}")]
    NotFetchable(String),

    #[error("connection is not established")]
    NotConnected,
}

impl NetError {
    /// Creates a TLS error from any TLS-layer failure.
    pub fn tls<E: std::fmt::Display>(err: E) -> Self {
        Self::Tls(err.to_string())
    }

    /// Non-fatal errors abandon one fetch attempt without ending the track.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, NetError::NotFetchable(_))
    }
}

pub type NetResult<T> = Result<T, NetError>;
