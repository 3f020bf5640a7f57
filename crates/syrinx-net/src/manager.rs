use std::{sync::Arc, time::Duration};

use tracing::{debug, trace};

use crate::{
    connection::Connection,
    error::NetResult,
    types::{Chunk, NetOptions, Scheme},
};

/// Receiver of throughput samples measured by the connection layer.
///
/// The rate-based adaptation logic registers itself here, closing the
/// bandwidth-estimation feedback loop.
#[cfg_attr(test, mockall::automock)]
pub trait DownloadRateObserver: Send + Sync {
    fn update_download_rate(&self, bytes: u64, elapsed: Duration);
}

/// Pool of reusable connections keyed by (scheme, host, port).
pub struct ConnectionManager {
    options: NetOptions,
    idle: Vec<Connection>,
    observer: Option<Arc<dyn DownloadRateObserver>>,
    next_id: u64,
}

impl ConnectionManager {
    pub fn new(options: NetOptions) -> Self {
        Self {
            options,
            idle: Vec::new(),
            observer: None,
            next_id: 0,
        }
    }

    pub fn set_download_rate_observer(&mut self, observer: Arc<dyn DownloadRateObserver>) {
        self.observer = Some(observer);
    }

    /// Return an idle matching connection or create and connect a new one.
    ///
    /// The returned connection is exclusively owned by the caller until it
    /// is handed back via [`release`](Self::release).
    pub fn get_connection(&mut self, chunk: &Chunk) -> NetResult<Connection> {
        if let Some(pos) = self.idle.iter().position(|conn| conn.matches(chunk)) {
            let conn = self.idle.swap_remove(pos);
            trace!(conn = conn.id(), host = chunk.host(), "reusing pooled connection");
            return Ok(conn);
        }

        let id = self.next_id;
        self.next_id += 1;
        let mut conn = Connection::new(
            id,
            chunk.scheme(),
            chunk.host().to_string(),
            chunk.port(),
            self.options.clone(),
        );
        conn.connect()?;
        debug!(
            conn = id,
            host = chunk.host(),
            port = chunk.port(),
            secure = matches!(chunk.scheme(), Scheme::Https),
            "opened connection"
        );
        Ok(conn)
    }

    /// Hand a connection back. It is pooled for reuse only if it is still
    /// connected, fully drained, and the server did not request closure.
    pub fn release(&mut self, conn: Connection) {
        if conn.is_connected() && conn.drained() && !conn.close_requested() {
            trace!(conn = conn.id(), "connection returned to pool");
            self.idle.push(conn);
        } else {
            trace!(conn = conn.id(), "connection discarded");
        }
    }

    /// Forward a throughput sample to the registered observer.
    pub fn update_download_rate(&self, bytes: u64, elapsed: Duration) {
        if let Some(observer) = &self.observer {
            observer.update_download_rate(bytes, elapsed);
        }
    }

    pub fn idle_count(&self) -> usize {
        self.idle.len()
    }
}
