//! Pooled HTTP(S) connection and chunk-fetch layer.
//!
//! A `Chunk` is a materialized fetch unit (URL, optional byte range,
//! progress accounting). A `Connection` serves one chunk at a time over a
//! persistent HTTP/1.1 socket; the `ConnectionManager` pools idle
//! connections by (scheme, host, port) and forwards throughput samples to
//! a registered observer. `BufferedChunkSource` adds an optional
//! background-prefetch reader on top of a connection.

#![forbid(unsafe_code)]

mod buffered;
mod connection;
mod error;
mod manager;
mod socket;
mod types;

pub use buffered::BufferedChunkSource;
pub use connection::Connection;
pub use error::{NetError, NetResult};
pub use manager::{ConnectionManager, DownloadRateObserver};
pub use socket::Socket;
pub use types::{ByteRange, Chunk, ChunkKind, NetOptions, Scheme};
