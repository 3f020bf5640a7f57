use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlaylistError {
    #[error("representation bandwidth must be positive")]
    ZeroBandwidth,

    #[error("net error: {0}")]
    Net(#[from] syrinx_net::NetError),

    #[error("playlist has no periods")]
    Empty,
}

pub type PlaylistResult<T> = Result<T, PlaylistError>;
