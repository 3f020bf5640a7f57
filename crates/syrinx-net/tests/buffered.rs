use std::time::{Duration, Instant};

use syrinx_net::{BufferedChunkSource, Chunk, ChunkKind, ConnectionManager, NetOptions};
use syrinx_test_utils::{Resource, TestServer};

fn start_source(server: &TestServer, path: &str, block_size: usize) -> BufferedChunkSource {
    let chunk = Chunk::new(server.url(path), ChunkKind::Media, None).unwrap();
    let mut manager = ConnectionManager::new(NetOptions::default());
    let mut conn = manager.get_connection(&chunk).unwrap();
    conn.query(&chunk).unwrap();
    BufferedChunkSource::start(conn, chunk, block_size)
}

#[test]
fn consumer_sees_exactly_the_produced_bytes() {
    let body: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
    let server = TestServer::builder().body("/big.m4s", body.clone()).start();

    let source = start_source(&server, "/big.m4s", 1024);
    let mut received = Vec::new();
    while let Some(block) = source.next_block() {
        received.extend_from_slice(&block);
    }

    assert_eq!(received, body);
    assert!(source.is_done());
    assert!(source.take_error().is_none());
}

#[test]
fn consumer_terminates_after_done_with_empty_queue() {
    let server = TestServer::builder().body("/tiny.m4s", b"x".to_vec()).start();
    let source = start_source(&server, "/tiny.m4s", 64);

    assert_eq!(source.next_block().as_deref(), Some(b"x".as_slice()));

    let started = Instant::now();
    assert!(source.next_block().is_none());
    // Termination must not require waiting out any timeout.
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn truncated_transfer_still_delivers_prefix_and_finishes() {
    let server = TestServer::builder()
        .resource("/cut.m4s", Resource::new(vec![9u8; 4096]).truncate_at(1000))
        .start();
    let source = start_source(&server, "/cut.m4s", 512);

    let mut received = 0usize;
    while let Some(block) = source.next_block() {
        received += block.len();
    }
    // The short read terminates the transfer; whatever arrived before the
    // truncation is still delivered in order.
    assert_eq!(received, 1000);
    assert!(source.is_done());
}

#[test]
fn drop_cancels_without_deadlock() {
    let body: Vec<u8> = vec![3u8; 1_000_000];
    let server = TestServer::builder().body("/huge.m4s", body).start();

    let source = start_source(&server, "/huge.m4s", 4096);
    // Consume a little, then drop with the producer still running.
    let _ = source.next_block();

    let started = Instant::now();
    drop(source);
    assert!(started.elapsed() < Duration::from_secs(5));
}
