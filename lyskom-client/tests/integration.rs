//! Integration tests driving a real TCP round-trip against an in-process
//! mock LysKOM server.
//!
//! Each test spawns a listener with a small server script: read the client
//! handshake, answer `LysKOM\n`, then follow the scripted exchange.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use lyskom_client::{Client, ClientConfig, ClientConfigBuilder, Error, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

// ── Helpers ─────────────────────────────────────────────────────────────

async fn spawn_server<F, Fut>(script: F) -> (u16, JoinHandle<()>)
where
    F: FnOnce(TcpStream) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        script(stream).await;
    });
    (port, handle)
}

fn test_config(port: u16) -> ClientConfig {
    ClientConfigBuilder::new()
        .port(port)
        .user("test")
        .connect_timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

async fn connect(port: u16) -> Result<Client, Error> {
    Client::connect_with("127.0.0.1", test_config(port)).await
}

/// Read one newline-terminated line.
async fn read_line(stream: &mut TcpStream) -> Vec<u8> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = stream.read(&mut byte).await.unwrap();
        if n == 0 {
            return line;
        }
        line.push(byte[0]);
        if byte[0] == b'\n' {
            return line;
        }
    }
}

/// Accept the client handshake and answer the server preface.
async fn greet(stream: &mut TcpStream) -> Vec<u8> {
    let hello = read_line(stream).await;
    assert_eq!(hello.first(), Some(&b'A'));
    stream.write_all(b"LysKOM\n").await.unwrap();
    hello
}

/// The reference number at the start of a request line.
fn ref_no_of(line: &[u8]) -> u32 {
    let text = std::str::from_utf8(line).unwrap();
    text.split_whitespace().next().unwrap().parse().unwrap()
}

// ── Tests ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn login_round_trip() {
    let (port, server) = spawn_server(|mut stream| async move {
        greet(&mut stream).await;
        let request = read_line(&mut stream).await;
        assert_eq!(request, b"0 62 4711 6Hgazonk 0\n");
        stream.write_all(b"=0\n").await.unwrap();
        read_line(&mut stream).await;
    })
    .await;

    let client = connect(port).await.unwrap();
    client.login(4711, "gazonk", false).await.unwrap();
    client.close().await;
    server.await.unwrap();
}

#[tokio::test]
async fn handshake_includes_configured_user() {
    let (port, server) = spawn_server(|mut stream| async move {
        let hello = greet(&mut stream).await;
        let text = String::from_utf8(hello).unwrap();
        assert_eq!(text, "A14Htest%127.0.0.1\n");
        read_line(&mut stream).await;
    })
    .await;

    let client = connect(port).await.unwrap();
    client.close().await;
    server.await.unwrap();
}

#[tokio::test]
async fn pipelined_replies_resolve_out_of_order() {
    let (port, server) = spawn_server(|mut stream| async move {
        greet(&mut stream).await;
        let first = ref_no_of(&read_line(&mut stream).await);
        let second = ref_no_of(&read_line(&mut stream).await);
        // answer the later request first
        let reply = format!("={second} 22\n={first} 11\n");
        stream.write_all(reply.as_bytes()).await.unwrap();
        read_line(&mut stream).await;
    })
    .await;

    let client = connect(port).await.unwrap();
    let (a, b) = tokio::join!(client.who_am_i(), client.who_am_i());
    assert_eq!(a.unwrap(), 11);
    assert_eq!(b.unwrap(), 22);
    client.close().await;
    server.await.unwrap();
}

#[tokio::test]
async fn error_reply_carries_symbolic_name() {
    let (port, server) = spawn_server(|mut stream| async move {
        greet(&mut stream).await;
        let ref_no = ref_no_of(&read_line(&mut stream).await);
        let reply = format!("%{ref_no} 4 4711\n");
        stream.write_all(reply.as_bytes()).await.unwrap();
        read_line(&mut stream).await;
    })
    .await;

    let client = connect(port).await.unwrap();
    match client.login(4711, "wrong", false).await.unwrap_err() {
        Error::Request { code, name, status } => {
            assert_eq!(code, 4);
            assert_eq!(name, "invalid-password");
            assert_eq!(status, 4711);
        }
        other => panic!("unexpected error {other:?}"),
    }
    client.close().await;
    server.await.unwrap();
}

#[tokio::test]
async fn async_event_reaches_handler() {
    let (port, server) = spawn_server(|mut stream| async move {
        greet(&mut stream).await;
        let ref_no = ref_no_of(&read_line(&mut stream).await);
        let reply = format!(":3 12 4711 1234 6Hfoobar\n={ref_no}\n");
        stream.write_all(reply.as_bytes()).await.unwrap();
        read_line(&mut stream).await;
    })
    .await;

    let client = connect(port).await.unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    client
        .on_async("send-message", move |value| {
            tx.send(value.clone()).unwrap();
        })
        .unwrap();

    client.user_active().await.unwrap();
    let message = rx.recv().await.unwrap();
    assert_eq!(message.get("recipient"), Some(&Value::Int(4711)));
    assert_eq!(message.get("sender"), Some(&Value::Int(1234)));
    assert_eq!(
        message.get("message").and_then(Value::as_bytes).map(|b| &b[..]),
        Some(&b"foobar"[..])
    );
    client.close().await;
    server.await.unwrap();
}

#[tokio::test]
async fn subscribing_to_unknown_event_fails() {
    let (port, server) = spawn_server(|mut stream| async move {
        greet(&mut stream).await;
        read_line(&mut stream).await;
    })
    .await;

    let client = connect(port).await.unwrap();
    assert!(matches!(
        client.on_async("no-such-event", |_| {}),
        Err(Error::UnknownAsync(_))
    ));
    client.close().await;
    server.await.unwrap();
}

#[tokio::test]
async fn unknown_async_is_skipped() {
    let (port, server) = spawn_server(|mut stream| async move {
        greet(&mut stream).await;
        let ref_no = ref_no_of(&read_line(&mut stream).await);
        // async 99 is not in the catalogue; both arguments must be discarded
        let reply = format!(":2 99 17 6Hxyzzyx\n={ref_no}\n");
        stream.write_all(reply.as_bytes()).await.unwrap();
        read_line(&mut stream).await;
    })
    .await;

    let client = connect(port).await.unwrap();
    client.user_active().await.unwrap();
    client.close().await;
    server.await.unwrap();
}

#[tokio::test]
async fn chunked_reply_resolves() {
    let (port, server) = spawn_server(|mut stream| async move {
        greet(&mut stream).await;
        let ref_no = ref_no_of(&read_line(&mut stream).await);
        for byte in format!("={ref_no} 4711\n").into_bytes() {
            stream.write_all(&[byte]).await.unwrap();
            stream.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        read_line(&mut stream).await;
    })
    .await;

    let client = connect(port).await.unwrap();
    assert_eq!(client.who_am_i().await.unwrap(), 4711);
    client.close().await;
    server.await.unwrap();
}

#[tokio::test]
async fn out_of_band_server_error_is_survivable() {
    let (port, server) = spawn_server(|mut stream| async move {
        greet(&mut stream).await;
        let ref_no = ref_no_of(&read_line(&mut stream).await);
        let reply = format!("%%disk is full\n={ref_no}\n");
        stream.write_all(reply.as_bytes()).await.unwrap();
        read_line(&mut stream).await;
    })
    .await;

    let client = connect(port).await.unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    client.on_error(move |error| {
        tx.send(error.to_string()).unwrap();
    });

    client.user_active().await.unwrap();
    assert_eq!(rx.recv().await.unwrap(), "server error: disk is full");
    client.close().await;
    server.await.unwrap();
}

#[tokio::test]
async fn protocol_garbage_fails_call_and_closes() {
    let (port, server) = spawn_server(|mut stream| async move {
        greet(&mut stream).await;
        read_line(&mut stream).await;
        stream.write_all(b"!!!\n").await.unwrap();
        read_line(&mut stream).await;
    })
    .await;

    let client = connect(port).await.unwrap();
    let closed = Arc::new(AtomicBool::new(false));
    let closed_seen = Arc::clone(&closed);
    client.on_close(move || {
        closed_seen.store(true, Ordering::SeqCst);
    });

    match client.user_active().await.unwrap_err() {
        Error::Protocol(_) => {}
        other => panic!("unexpected error {other:?}"),
    }
    // the reader tears down; a later call must fail fast
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(closed.load(Ordering::SeqCst));
    assert!(matches!(
        client.user_active().await.unwrap_err(),
        Error::Closed
    ));
    server.await.unwrap();
}

#[tokio::test]
async fn close_fails_pending_requests() {
    let (port, server) = spawn_server(|mut stream| async move {
        greet(&mut stream).await;
        // swallow the request and never answer
        read_line(&mut stream).await;
        read_line(&mut stream).await;
    })
    .await;

    let client = connect(port).await.unwrap();
    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.who_am_i().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    client.close().await;
    client.close().await; // idempotent
    assert!(matches!(
        pending.await.unwrap().unwrap_err(),
        Error::Closed
    ));
    server.await.unwrap();
}

#[tokio::test]
async fn bad_server_preface_fails_connect() {
    let (port, server) = spawn_server(|mut stream| async move {
        read_line(&mut stream).await;
        stream.write_all(b"NotKOM\n").await.unwrap();
    })
    .await;

    match connect(port).await.unwrap_err() {
        Error::Protocol(e) => assert_eq!(e.to_string(), "bad server handshake"),
        other => panic!("unexpected error {other:?}"),
    }
    server.await.unwrap();
}

#[tokio::test]
async fn server_error_during_handshake_fails_connect() {
    let (port, server) = spawn_server(|mut stream| async move {
        read_line(&mut stream).await;
        stream.write_all(b"%%too many connections\n").await.unwrap();
    })
    .await;

    match connect(port).await.unwrap_err() {
        Error::Server(text) => assert_eq!(text, "too many connections"),
        other => panic!("unexpected error {other:?}"),
    }
    server.await.unwrap();
}
