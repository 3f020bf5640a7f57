use std::io::{BufRead, BufReader, Read};

use tracing::{debug, trace};

use crate::{
    error::{NetError, NetResult},
    socket::Socket,
    types::{Chunk, NetOptions, Scheme},
};

/// One HTTP/1.1 connection, serving at most one chunk at a time.
///
/// A connection checked out of the pool is exclusively bound to its caller;
/// it becomes reusable once released back with its response fully drained
/// and no server-side closure requested.
pub struct Connection {
    id: u64,
    scheme: Scheme,
    host: String,
    port: u16,
    options: NetOptions,
    reader: Option<BufReader<Socket>>,
    persistent: bool,
    close_requested: bool,
    content_length: Option<u64>,
    bytes_read: u64,
}

impl Connection {
    pub(crate) fn new(id: u64, scheme: Scheme, host: String, port: u16, options: NetOptions) -> Self {
        let persistent = options.persistent;
        Self {
            id,
            scheme,
            host,
            port,
            options,
            reader: None,
            persistent,
            close_requested: false,
            content_length: None,
            bytes_read: 0,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn matches(&self, chunk: &Chunk) -> bool {
        self.scheme == chunk.scheme() && self.host == chunk.host() && self.port == chunk.port()
    }

    pub fn is_connected(&self) -> bool {
        self.reader.is_some()
    }

    pub fn close_requested(&self) -> bool {
        self.close_requested
    }

    /// Bytes of the current response still expected, if the length is known.
    pub fn remaining(&self) -> Option<u64> {
        self.content_length
            .map(|length| length.saturating_sub(self.bytes_read))
    }

    /// True once the current response body is fully consumed.
    pub fn drained(&self) -> bool {
        self.remaining() == Some(0)
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn connect(&mut self) -> NetResult<()> {
        let socket = Socket::connect(&self.host, self.port, self.scheme, &self.options)?;
        self.reader = Some(BufReader::new(socket));
        self.close_requested = false;
        Ok(())
    }

    pub fn disconnect(&mut self) {
        self.reader = None;
    }

    /// Issue the GET for `chunk` and parse the response head.
    ///
    /// On an I/O failure while persistence was assumed (typically a stale
    /// pooled socket), reconnects and retries exactly once with persistence
    /// forced off. A second failure is surfaced.
    pub fn query(&mut self, chunk: &Chunk) -> NetResult<()> {
        match self.try_query(chunk) {
            Err(NetError::Io(err)) if self.persistent => {
                debug!(
                    conn = self.id,
                    host = %self.host,
                    error = %err,
                    "query failed on persistent connection, retrying non-persistent"
                );
                self.disconnect();
                self.persistent = false;
                self.try_query(chunk)
            }
            other => other,
        }
    }

    fn try_query(&mut self, chunk: &Chunk) -> NetResult<()> {
        if self.reader.is_none() {
            self.connect()?;
        }

        let request = self.build_request(chunk);
        trace!(conn = self.id, target = %chunk.path_and_query(), "sending request");

        let reader = self.reader_mut()?;
        reader.get_mut().send(request.as_bytes())?;

        let status_line = Self::read_head_line(reader)?;
        let status = parse_status_line(&status_line)?;
        if status != 200 && status != 206 {
            debug!(conn = self.id, status, "unusable response status");
            self.disconnect();
            return Err(NetError::NotFetchable(format!("status {status}")));
        }

        self.content_length = None;
        self.bytes_read = 0;

        loop {
            let reader = self.reader_mut()?;
            let line = Self::read_head_line(reader)?;
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = parse_header(&line) {
                match name.as_str() {
                    "content-length" => {
                        if let Ok(length) = value.parse::<u64>() {
                            self.content_length = Some(length);
                        }
                    }
                    "connection" => {
                        if value.eq_ignore_ascii_case("close") {
                            self.close_requested = true;
                        }
                    }
                    _ => {}
                }
            }
        }

        trace!(
            conn = self.id,
            status,
            content_length = ?self.content_length,
            close_requested = self.close_requested,
            "response head parsed"
        );
        Ok(())
    }

    /// Read response bytes, bounded by what the content length still allows.
    ///
    /// A short read (fewer bytes than the bound) terminates the chunk's
    /// content and forces disconnection; subsequent reads return 0.
    pub fn read(&mut self, buf: &mut [u8]) -> NetResult<usize> {
        let bound = match self.remaining() {
            Some(remaining) => (buf.len() as u64).min(remaining) as usize,
            None => buf.len(),
        };
        if bound == 0 {
            return Ok(0);
        }

        let reader = self.reader_mut()?;
        let mut total = 0;
        while total < bound {
            match reader.read(&mut buf[total..bound])? {
                0 => break,
                n => total += n,
            }
        }

        self.bytes_read += total as u64;
        if total < bound {
            trace!(conn = self.id, got = total, wanted = bound, "short read, closing");
            self.content_length = Some(self.bytes_read);
            self.disconnect();
        }
        Ok(total)
    }

    fn reader_mut(&mut self) -> NetResult<&mut BufReader<Socket>> {
        self.reader.as_mut().ok_or(NetError::NotConnected)
    }

    fn read_head_line(reader: &mut BufReader<Socket>) -> NetResult<String> {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Err(NetError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed before response head",
            )));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    fn build_request(&self, chunk: &Chunk) -> String {
        let host_header = if self.port == self.scheme.default_port() {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        };

        let mut request = format!(
            "GET {} HTTP/1.1\r\nHost: {}\r\nUser-Agent: {}\r\nCache-Control: no-cache\r\n",
            chunk.path_and_query(),
            host_header,
            self.options.user_agent,
        );
        if let Some(range) = chunk.range() {
            request.push_str("Range: ");
            request.push_str(&range.to_header_value());
            request.push_str("\r\n");
        }
        if !self.persistent {
            request.push_str("Connection: close\r\n");
        }
        request.push_str("\r\n");
        request
    }
}

/// Accepts only `HTTP/1.1` status lines; anything else is not fetchable.
fn parse_status_line(line: &str) -> NetResult<u16> {
    let rest = line
        .strip_prefix("HTTP/1.1 ")
        .ok_or_else(|| NetError::NotFetchable(format!("malformed status line: {line:?}")))?;
    rest.split_whitespace()
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| NetError::NotFetchable(format!("malformed status line: {line:?}")))
}

fn parse_header(line: &str) -> Option<(String, &str)> {
    let (name, value) = line.split_once(':')?;
    Some((name.trim().to_ascii_lowercase(), value.trim()))
}
