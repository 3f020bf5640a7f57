use syrinx_net::{ByteRange, Chunk, ChunkKind, ConnectionManager, NetError, NetOptions};
use syrinx_test_utils::{Resource, TestServer};

fn media_chunk(server: &TestServer, path: &str, range: Option<ByteRange>) -> Chunk {
    Chunk::new(server.url(path), ChunkKind::Media, range).unwrap()
}

fn read_all(conn: &mut syrinx_net::Connection, chunk: &mut Chunk) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let n = conn.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        chunk.add_bytes_read(n as u64);
        out.extend_from_slice(&buf[..n]);
    }
    out
}

#[test]
fn fetches_full_body() {
    let server = TestServer::builder().body("/seg.m4s", b"0123456789".to_vec()).start();
    let mut manager = ConnectionManager::new(NetOptions::default());

    let mut chunk = media_chunk(&server, "/seg.m4s", None);
    let mut conn = manager.get_connection(&chunk).unwrap();
    conn.query(&chunk).unwrap();
    assert_eq!(conn.content_length(), Some(10));

    let body = read_all(&mut conn, &mut chunk);
    assert_eq!(body, b"0123456789");
    assert_eq!(chunk.bytes_read(), 10);
}

#[test]
fn range_request_returns_slice() {
    let server = TestServer::builder().body("/seg.m4s", b"0123456789".to_vec()).start();
    let mut manager = ConnectionManager::new(NetOptions::default());

    let range = ByteRange::new(2, Some(6)).unwrap();
    let mut chunk = media_chunk(&server, "/seg.m4s", Some(range));
    let mut conn = manager.get_connection(&chunk).unwrap();
    conn.query(&chunk).unwrap();
    assert_eq!(conn.content_length(), Some(4));

    let body = read_all(&mut conn, &mut chunk);
    assert_eq!(body, b"2345");
}

#[test]
fn read_never_exceeds_remaining_content() {
    let server = TestServer::builder().body("/seg.m4s", vec![7u8; 100]).start();
    let mut manager = ConnectionManager::new(NetOptions::default());

    let chunk = media_chunk(&server, "/seg.m4s", None);
    let mut conn = manager.get_connection(&chunk).unwrap();
    conn.query(&chunk).unwrap();

    let mut buf = [0u8; 64];
    let first = conn.read(&mut buf).unwrap();
    assert_eq!(first, 64);
    // 36 bytes remain; a 64-byte request must be bounded by them.
    let second = conn.read(&mut buf).unwrap();
    assert_eq!(second, 36);
    let third = conn.read(&mut buf).unwrap();
    assert_eq!(third, 0);
}

#[test]
fn pooled_connection_is_reused_after_release() {
    let server = TestServer::builder()
        .body("/a.m4s", b"aaaa".to_vec())
        .body("/b.m4s", b"bbbb".to_vec())
        .start();
    let mut manager = ConnectionManager::new(NetOptions::default());

    let mut chunk_a = media_chunk(&server, "/a.m4s", None);
    let mut conn = manager.get_connection(&chunk_a).unwrap();
    let first_id = conn.id();
    conn.query(&chunk_a).unwrap();
    read_all(&mut conn, &mut chunk_a);
    manager.release(conn);
    assert_eq!(manager.idle_count(), 1);

    let mut chunk_b = media_chunk(&server, "/b.m4s", None);
    let mut conn = manager.get_connection(&chunk_b).unwrap();
    assert_eq!(conn.id(), first_id);
    conn.query(&chunk_b).unwrap();
    assert_eq!(read_all(&mut conn, &mut chunk_b), b"bbbb");
    manager.release(conn);

    // Both requests travelled over one TCP connection.
    assert_eq!(server.connection_count(), 1);
    assert_eq!(server.request_count(), 2);
}

#[test]
fn concurrent_checkouts_get_distinct_connections() {
    let server = TestServer::builder().body("/seg.m4s", b"data".to_vec()).start();
    let mut manager = ConnectionManager::new(NetOptions::default());

    let mut chunk_a = media_chunk(&server, "/seg.m4s", None);
    let mut chunk_b = media_chunk(&server, "/seg.m4s", None);
    let mut first = manager.get_connection(&chunk_a).unwrap();
    let mut second = manager.get_connection(&chunk_b).unwrap();
    assert_ne!(first.id(), second.id());

    // Count only after each connection has served a request; a freshly
    // connected socket may still sit in the accept backlog.
    first.query(&chunk_a).unwrap();
    assert_eq!(read_all(&mut first, &mut chunk_a), b"data");
    second.query(&chunk_b).unwrap();
    assert_eq!(read_all(&mut second, &mut chunk_b), b"data");
    assert_eq!(server.connection_count(), 2);
    assert_eq!(server.request_count(), 2);
}

#[test]
fn server_requested_close_prevents_pooling() {
    let server = TestServer::builder()
        .resource("/seg.m4s", Resource::new(b"data".to_vec()).force_close())
        .start();
    let mut manager = ConnectionManager::new(NetOptions::default());

    let mut chunk = media_chunk(&server, "/seg.m4s", None);
    let mut conn = manager.get_connection(&chunk).unwrap();
    conn.query(&chunk).unwrap();
    assert!(conn.close_requested());
    read_all(&mut conn, &mut chunk);
    manager.release(conn);
    assert_eq!(manager.idle_count(), 0);
}

#[test]
fn non_success_status_is_not_fetchable() {
    let server = TestServer::builder()
        .resource("/missing.m4s", Resource::new(Vec::new()).with_status(503))
        .start();
    let mut manager = ConnectionManager::new(NetOptions::default());

    let chunk = media_chunk(&server, "/missing.m4s", None);
    let mut conn = manager.get_connection(&chunk).unwrap();
    let err = conn.query(&chunk).unwrap_err();
    assert!(matches!(err, NetError::NotFetchable(_)));
    assert!(!err.is_fatal());
}

#[test]
fn unknown_path_is_not_fetchable() {
    let server = TestServer::builder().start();
    let mut manager = ConnectionManager::new(NetOptions::default());

    let chunk = media_chunk(&server, "/nowhere.m4s", None);
    let mut conn = manager.get_connection(&chunk).unwrap();
    assert!(matches!(conn.query(&chunk), Err(NetError::NotFetchable(_))));
}

#[test]
fn http10_status_line_is_not_fetchable() {
    let server = TestServer::builder()
        .resource("/old.m4s", Resource::new(b"data".to_vec()).http10())
        .start();
    let mut manager = ConnectionManager::new(NetOptions::default());

    let chunk = media_chunk(&server, "/old.m4s", None);
    let mut conn = manager.get_connection(&chunk).unwrap();
    assert!(matches!(conn.query(&chunk), Err(NetError::NotFetchable(_))));
}

#[test]
fn truncated_body_terminates_chunk_and_disconnects() {
    let server = TestServer::builder()
        .resource("/cut.m4s", Resource::new(vec![1u8; 100]).truncate_at(40))
        .start();
    let mut manager = ConnectionManager::new(NetOptions::default());

    let chunk = media_chunk(&server, "/cut.m4s", None);
    let mut conn = manager.get_connection(&chunk).unwrap();
    conn.query(&chunk).unwrap();
    assert_eq!(conn.content_length(), Some(100));

    let mut buf = [0u8; 100];
    let got = conn.read(&mut buf).unwrap();
    assert_eq!(got, 40);
    // Short read terminated the content: the connection is closed and the
    // chunk is considered complete.
    assert!(!conn.is_connected());
    assert_eq!(conn.read(&mut buf).unwrap(), 0);
}

#[test]
fn stale_pooled_connection_retries_once_non_persistent() {
    let server = TestServer::builder()
        .resource("/one.m4s", Resource::new(b"one!".to_vec()).force_close())
        .body("/two.m4s", b"two!".to_vec())
        .start();
    let mut manager = ConnectionManager::new(NetOptions::default());

    // First transfer: server drops the socket afterwards, but pretend the
    // caller kept the connection around anyway.
    let mut chunk = media_chunk(&server, "/one.m4s", None);
    let mut conn = manager.get_connection(&chunk).unwrap();
    conn.query(&chunk).unwrap();
    read_all(&mut conn, &mut chunk);

    // The socket is dead server-side; the retry policy must reconnect with
    // persistence off and still succeed.
    let mut chunk_two = media_chunk(&server, "/two.m4s", None);
    conn.query(&chunk_two).unwrap();
    assert_eq!(read_all(&mut conn, &mut chunk_two), b"two!");
}
