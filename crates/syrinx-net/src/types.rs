use std::time::Duration;

use url::Url;

use crate::error::{NetError, NetResult};

/// Transport scheme of a fetchable URL.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn from_url(url: &Url) -> NetResult<Self> {
        match url.scheme() {
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            other => Err(NetError::UnsupportedScheme(other.to_string())),
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            Self::Http => 80,
            Self::Https => 443,
        }
    }

    pub fn is_secure(self) -> bool {
        matches!(self, Self::Https)
    }
}

/// Half-open byte range: `start` inclusive, `end` exclusive when present.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ByteRange {
    pub start: u64,
    /// Exclusive end offset; `None` means open-ended.
    pub end: Option<u64>,
}

impl ByteRange {
    pub fn new(start: u64, end: Option<u64>) -> NetResult<Self> {
        if let Some(end) = end {
            if end < start {
                return Err(NetError::InvalidRange(format!(
                    "end {end} before start {start}"
                )));
            }
        }
        Ok(Self { start, end })
    }

    pub fn from_start(start: u64) -> Self {
        Self { start, end: None }
    }

    pub fn len(&self) -> Option<u64> {
        self.end.map(|end| end - self.start)
    }

    pub fn is_empty(&self) -> Option<bool> {
        self.len().map(|len| len == 0)
    }

    /// HTTP `Range` header value. The wire format uses inclusive ends.
    pub fn to_header_value(&self) -> String {
        match self.end {
            Some(end) if end > self.start => {
                format!("bytes={}-{}", self.start, end - 1)
            }
            Some(_) => format!("bytes={}-{}", self.start, self.start),
            None => format!("bytes={}-", self.start),
        }
    }
}

/// Classification of what a chunk fetches.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChunkKind {
    Init,
    Index,
    Media,
}

/// A materialized fetch unit: one addressable piece of media data plus the
/// progress accounting for its in-flight transfer.
#[derive(Clone, Debug)]
pub struct Chunk {
    url: Url,
    scheme: Scheme,
    kind: ChunkKind,
    range: Option<ByteRange>,
    bytes_read: u64,
    content_length: Option<u64>,
}

impl Chunk {
    pub fn new(url: Url, kind: ChunkKind, range: Option<ByteRange>) -> NetResult<Self> {
        let scheme = Scheme::from_url(&url)?;
        if url.host_str().is_none() {
            return Err(NetError::InvalidUrl(format!("no host in {url}")));
        }
        Ok(Self {
            url,
            scheme,
            kind,
            range,
            bytes_read: 0,
            content_length: None,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    pub fn port(&self) -> u16 {
        self.url.port().unwrap_or_else(|| self.scheme.default_port())
    }

    /// Request target: path plus query string.
    pub fn path_and_query(&self) -> String {
        match self.url.query() {
            Some(query) => format!("{}?{}", self.url.path(), query),
            None => self.url.path().to_string(),
        }
    }

    pub fn kind(&self) -> ChunkKind {
        self.kind
    }

    pub fn range(&self) -> Option<&ByteRange> {
        self.range.as_ref()
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn add_bytes_read(&mut self, bytes: u64) {
        self.bytes_read += bytes;
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn set_content_length(&mut self, length: u64) {
        self.content_length = Some(length);
    }
}

/// Connection-layer configuration.
#[derive(Clone, Debug)]
pub struct NetOptions {
    pub user_agent: String,
    pub connect_timeout: Duration,
    /// Per-read/write socket timeout. `None` blocks indefinitely.
    pub io_timeout: Option<Duration>,
    /// Assume persistent connections until a query fails or the server
    /// requests closure.
    pub persistent: bool,
}

impl Default for NetOptions {
    fn default() -> Self {
        Self {
            user_agent: concat!("syrinx/", env!("CARGO_PKG_VERSION")).to_string(),
            connect_timeout: Duration::from_secs(10),
            io_timeout: Some(Duration::from_secs(10)),
            persistent: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use url::Url;

    use super::*;

    #[rstest]
    #[case::closed(0, Some(100), "bytes=0-99")]
    #[case::open_ended(50, None, "bytes=50-")]
    #[case::single_byte(10, Some(11), "bytes=10-10")]
    fn range_header_value(#[case] start: u64, #[case] end: Option<u64>, #[case] expected: &str) {
        let range = ByteRange::new(start, end).unwrap();
        assert_eq!(range.to_header_value(), expected);
    }

    #[test]
    fn range_end_before_start_rejected() {
        assert!(matches!(
            ByteRange::new(10, Some(9)),
            Err(NetError::InvalidRange(_))
        ));
    }

    #[test]
    fn range_end_is_exclusive() {
        let range = ByteRange::new(16, Some(32)).unwrap();
        assert_eq!(range.len(), Some(16));
    }

    #[rstest]
    #[case::http("http://example.com/seg.m4s", Scheme::Http, 80)]
    #[case::https("https://example.com/seg.m4s", Scheme::Https, 443)]
    #[case::explicit_port("http://example.com:8080/seg.m4s", Scheme::Http, 8080)]
    fn chunk_scheme_and_port(#[case] url: &str, #[case] scheme: Scheme, #[case] port: u16) {
        let chunk = Chunk::new(Url::parse(url).unwrap(), ChunkKind::Media, None).unwrap();
        assert_eq!(chunk.scheme(), scheme);
        assert_eq!(chunk.port(), port);
        assert_eq!(chunk.host(), "example.com");
    }

    #[test]
    fn chunk_rejects_unsupported_scheme() {
        let url = Url::parse("ftp://example.com/seg.m4s").unwrap();
        assert!(matches!(
            Chunk::new(url, ChunkKind::Media, None),
            Err(NetError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn chunk_path_includes_query() {
        let url = Url::parse("http://example.com/seg.m4s?token=abc").unwrap();
        let chunk = Chunk::new(url, ChunkKind::Media, None).unwrap();
        assert_eq!(chunk.path_and_query(), "/seg.m4s?token=abc");
    }

    #[test]
    fn chunk_progress_accounting() {
        let url = Url::parse("http://example.com/seg.m4s").unwrap();
        let mut chunk = Chunk::new(url, ChunkKind::Media, None).unwrap();
        assert_eq!(chunk.bytes_read(), 0);
        chunk.set_content_length(100);
        chunk.add_bytes_read(64);
        chunk.add_bytes_read(36);
        assert_eq!(chunk.bytes_read(), 100);
        assert_eq!(chunk.content_length(), Some(100));
    }
}
