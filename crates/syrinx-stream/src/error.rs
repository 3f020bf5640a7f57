use syrinx_playlist::ContainerFormat;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("net error: {0}")]
    Net(#[from] syrinx_net::NetError),

    #[error("playlist error: {0}")]
    Playlist(#[from] syrinx_playlist::PlaylistError),

    #[error("no demultiplexer available for {0:?}")]
    UnsupportedFormat(ContainerFormat),

    #[error("demultiplexer failed: {0}")]
    Demux(String),
}

pub type StreamResult<T> = Result<T, StreamError>;
