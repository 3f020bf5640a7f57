use std::{collections::VecDeque, sync::Arc, thread};

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use crate::{connection::Connection, types::Chunk};

struct QueueState {
    blocks: VecDeque<Bytes>,
    done: bool,
    cancelled: bool,
    error: Option<String>,
}

struct Shared {
    state: Mutex<QueueState>,
    cond: Condvar,
}

/// Background-prefetching reader over one chunk transfer.
///
/// A dedicated thread performs blocking reads into a block queue guarded by
/// one mutex and one condition variable; the consumer blocks on "queue
/// non-empty or done". `done` is set on short read, error, or cancellation.
/// Dropping the source cancels the in-flight read (best effort) and discards
/// queued-but-unconsumed blocks.
pub struct BufferedChunkSource {
    shared: Arc<Shared>,
    handle: Option<thread::JoinHandle<()>>,
}

impl BufferedChunkSource {
    /// Spawn the producer thread. The query for `chunk` must already have
    /// been issued on `conn`.
    pub fn start(mut conn: Connection, mut chunk: Chunk, block_size: usize) -> Self {
        let block_size = block_size.max(1);
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState {
                blocks: VecDeque::new(),
                done: false,
                cancelled: false,
                error: None,
            }),
            cond: Condvar::new(),
        });

        let producer = shared.clone();
        let handle = thread::spawn(move || {
            loop {
                if producer.state.lock().cancelled {
                    break;
                }

                let mut buf = vec![0u8; block_size];
                match conn.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        buf.truncate(n);
                        chunk.add_bytes_read(n as u64);
                        let mut state = producer.state.lock();
                        state.blocks.push_back(Bytes::from(buf));
                        producer.cond.notify_all();
                    }
                    Err(err) => {
                        debug!(chunk = %chunk.url(), error = %err, "prefetch read failed");
                        producer.state.lock().error = Some(err.to_string());
                        break;
                    }
                }
            }

            let mut state = producer.state.lock();
            state.done = true;
            producer.cond.notify_all();
            trace!(blocks_pending = state.blocks.len(), "prefetch producer finished");
        });

        Self {
            shared,
            handle: Some(handle),
        }
    }

    /// Block until a prefetched block is available or the transfer is done.
    ///
    /// Returns `None` once the queue is empty and the producer has finished.
    pub fn next_block(&self) -> Option<Bytes> {
        let mut state = self.shared.state.lock();
        loop {
            if let Some(block) = state.blocks.pop_front() {
                return Some(block);
            }
            if state.done {
                return None;
            }
            self.shared.cond.wait(&mut state);
        }
    }

    pub fn is_done(&self) -> bool {
        let state = self.shared.state.lock();
        state.done && state.blocks.is_empty()
    }

    pub fn take_error(&self) -> Option<String> {
        self.shared.state.lock().error.take()
    }
}

impl Drop for BufferedChunkSource {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.cancelled = true;
            state.blocks.clear();
            self.shared.cond.notify_all();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
