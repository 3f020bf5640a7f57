//! Shared test fixtures: a minimal blocking HTTP/1.1 server.
//!
//! Serves canned bodies with byte-range support, keep-alive, and knobs for
//! forced closure and mid-body truncation, so the connection layer and the
//! session orchestration can be exercised without external infrastructure.

#![forbid(unsafe_code)]

use std::{
    collections::HashMap,
    io::{BufRead, BufReader, Read, Write},
    net::{SocketAddr, TcpListener, TcpStream},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    thread,
};

use url::Url;

/// One canned resource served by the test server.
#[derive(Clone)]
pub struct Resource {
    pub body: Vec<u8>,
    /// Answer with `Connection: close` and drop the socket after the response.
    pub force_close: bool,
    /// Send only this many body bytes, then drop the socket mid-transfer.
    pub truncate_at: Option<usize>,
    /// Answer with this status instead of 200/206.
    pub status: Option<u16>,
    /// Answer with an HTTP/1.0 status line.
    pub http10: bool,
}

impl Resource {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            force_close: false,
            truncate_at: None,
            status: None,
            http10: false,
        }
    }

    pub fn force_close(mut self) -> Self {
        self.force_close = true;
        self
    }

    pub fn truncate_at(mut self, at: usize) -> Self {
        self.truncate_at = Some(at);
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn http10(mut self) -> Self {
        self.http10 = true;
        self
    }
}

#[derive(Default)]
pub struct TestServerBuilder {
    resources: HashMap<String, Resource>,
}

impl TestServerBuilder {
    pub fn resource(mut self, path: &str, resource: Resource) -> Self {
        self.resources.insert(path.to_string(), resource);
        self
    }

    pub fn body(self, path: &str, body: impl Into<Vec<u8>>) -> Self {
        self.resource(path, Resource::new(body))
    }

    pub fn start(self) -> TestServer {
        TestServer::start(self.resources)
    }
}

struct ServerState {
    resources: HashMap<String, Resource>,
    requests: AtomicUsize,
    connections: AtomicUsize,
    shutdown: AtomicBool,
}

pub struct TestServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    handle: Option<thread::JoinHandle<()>>,
}

impl TestServer {
    pub fn builder() -> TestServerBuilder {
        TestServerBuilder::default()
    }

    fn start(resources: HashMap<String, Resource>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server");
        let addr = listener.local_addr().expect("local addr");
        let state = Arc::new(ServerState {
            resources,
            requests: AtomicUsize::new(0),
            connections: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
        });

        let accept_state = state.clone();
        let handle = thread::spawn(move || {
            for stream in listener.incoming() {
                if accept_state.shutdown.load(Ordering::SeqCst) {
                    break;
                }
                let Ok(stream) = stream else { continue };
                accept_state.connections.fetch_add(1, Ordering::SeqCst);
                let client_state = accept_state.clone();
                thread::spawn(move || serve_client(stream, &client_state));
            }
        });

        Self {
            addr,
            state,
            handle: Some(handle),
        }
    }

    pub fn url(&self, path: &str) -> Url {
        Url::parse(&format!("http://{}{}", self.addr, path)).expect("server url")
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Number of requests served so far.
    pub fn request_count(&self) -> usize {
        self.state.requests.load(Ordering::SeqCst)
    }

    /// Number of TCP connections accepted so far.
    pub fn connection_count(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.state.shutdown.store(true, Ordering::SeqCst);
        // Unblock the accept loop.
        let _ = TcpStream::connect(self.addr);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn serve_client(stream: TcpStream, state: &ServerState) {
    let mut reader = BufReader::new(stream);
    loop {
        let request = match read_request(&mut reader) {
            Some(request) => request,
            None => return,
        };
        state.requests.fetch_add(1, Ordering::SeqCst);

        let close_requested = request.close;
        let keep_open = respond(reader.get_mut(), state, &request);
        if !keep_open || close_requested {
            return;
        }
    }
}

struct Request {
    path: String,
    range: Option<(u64, Option<u64>)>,
    close: bool,
}

fn read_request(reader: &mut BufReader<TcpStream>) -> Option<Request> {
    let mut line = String::new();
    if reader.read_line(&mut line).ok()? == 0 {
        return None;
    }
    let mut parts = line.split_whitespace();
    let method = parts.next()?;
    let path = parts.next()?.to_string();
    if method != "GET" {
        return None;
    }

    let mut range = None;
    let mut close = false;
    loop {
        let mut header = String::new();
        if reader.read_line(&mut header).ok()? == 0 {
            return None;
        }
        let header = header.trim_end_matches(['\r', '\n']);
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            let name = name.trim().to_ascii_lowercase();
            let value = value.trim();
            if name == "range" {
                range = parse_range(value);
            } else if name == "connection" && value.eq_ignore_ascii_case("close") {
                close = true;
            }
        }
    }

    Some(Request { path, range, close })
}

/// Parses `bytes=a-b` / `bytes=a-` into (start, inclusive end).
fn parse_range(value: &str) -> Option<(u64, Option<u64>)> {
    let spec = value.strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    let start = start.parse::<u64>().ok()?;
    let end = if end.is_empty() {
        None
    } else {
        Some(end.parse::<u64>().ok()?)
    };
    Some((start, end))
}

/// Writes one response. Returns false when the socket must be dropped.
fn respond(stream: &mut TcpStream, state: &ServerState, request: &Request) -> bool {
    let Some(resource) = state.resources.get(&request.path) else {
        let body = b"not found";
        let head = format!(
            "HTTP/1.1 404 Not Found\r\nContent-Length: {}\r\n\r\n",
            body.len()
        );
        let _ = stream.write_all(head.as_bytes());
        let _ = stream.write_all(body);
        return true;
    };

    let version = if resource.http10 { "HTTP/1.0" } else { "HTTP/1.1" };

    if let Some(status) = resource.status {
        let head = format!("{version} {status} Error\r\nContent-Length: 0\r\n\r\n");
        let _ = stream.write_all(head.as_bytes());
        return !resource.http10;
    }

    let (status, slice) = match request.range {
        Some((start, end)) => {
            let len = resource.body.len() as u64;
            let start = start.min(len);
            let end = end.map_or(len, |end| (end + 1).min(len));
            ("206 Partial Content", &resource.body[start as usize..end as usize])
        }
        None => ("200 OK", &resource.body[..]),
    };

    let sent = resource.truncate_at.map_or(slice.len(), |at| at.min(slice.len()));
    let mut head = format!("{version} {status}\r\nContent-Length: {}\r\n", slice.len());
    if resource.force_close {
        head.push_str("Connection: close\r\n");
    }
    head.push_str("\r\n");

    if stream.write_all(head.as_bytes()).is_err() {
        return false;
    }
    if stream.write_all(&slice[..sent]).is_err() {
        return false;
    }
    let _ = stream.flush();

    sent == slice.len() && !resource.force_close && !resource.http10
}
