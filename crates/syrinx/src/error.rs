use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("stream is not seekable")]
    NotSeekable,

    #[error("operation not available on live streams")]
    Live,

    #[error("requested time cannot be mapped to a segment")]
    Unmappable,

    #[error("playlist error: {0}")]
    Playlist(#[from] syrinx_playlist::PlaylistError),
}

pub type SessionResult<T> = Result<T, SessionError>;
