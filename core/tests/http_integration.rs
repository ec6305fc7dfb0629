/*
 * http_integration.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * Integration tests for the HTTP client. Each test runs a scripted HTTP/1.1
 * server on a loopback TcpListener and drives the full transfer cycle:
 * resolution, connect, request, header framing, body decoding, and the
 * connection retention decision.
 *
 * Run with:
 *   cargo test -p postiglione_core --test http_integration -- --nocapture
 */

use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing_test::traced_test;

use postiglione_core::config::HttpClientConfig;
use postiglione_core::protocol::http::{
    CancelToken, HttpClient, Request, Response, StaticDnsClient, TransferAttempt, TransferObserver,
    TransferPhase,
};

const HOST: &str = "server.test";

/// What the server does after reading one request.
enum Reply {
    /// Write the bytes, then close the connection.
    Close(&'static [u8]),
    /// Write the bytes and wait for the next request on the same connection.
    KeepOpen(&'static [u8]),
    /// Like `KeepOpen`, but the second part goes out in a later segment.
    KeepOpenSplit(&'static [u8], &'static [u8]),
    /// Write the bytes (possibly none), then say nothing until the client hangs up.
    Stall(&'static [u8]),
}

struct TestServer {
    port: u16,
    accepts: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl TestServer {
    async fn start(replies: Vec<Reply>) -> TestServer {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accepts = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let (accepts2, requests2) = (accepts.clone(), requests.clone());
        tokio::spawn(async move {
            let mut queue: VecDeque<Reply> = replies.into();
            'accept: while !queue.is_empty() {
                let Ok((mut sock, _)) = listener.accept().await else {
                    break;
                };
                accepts2.fetch_add(1, Ordering::SeqCst);
                loop {
                    let Some(request) = read_request(&mut sock).await else {
                        continue 'accept;
                    };
                    requests2.lock().unwrap().push(request);
                    let Some(reply) = queue.pop_front() else {
                        break 'accept;
                    };
                    match reply {
                        Reply::Close(bytes) => {
                            let _ = sock.write_all(bytes).await;
                            let _ = sock.shutdown().await;
                            continue 'accept;
                        }
                        Reply::KeepOpen(bytes) => {
                            let _ = sock.write_all(bytes).await;
                        }
                        Reply::KeepOpenSplit(first, rest) => {
                            let _ = sock.write_all(first).await;
                            let _ = sock.flush().await;
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            let _ = sock.write_all(rest).await;
                        }
                        Reply::Stall(bytes) => {
                            let _ = sock.write_all(bytes).await;
                            let mut sink = Vec::new();
                            let _ = sock.read_to_end(&mut sink).await;
                            continue 'accept;
                        }
                    }
                }
            }
        });
        TestServer {
            port,
            accepts,
            requests,
        }
    }

    fn accepts(&self) -> usize {
        self.accepts.load(Ordering::SeqCst)
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

/// Read one request head plus its Content-Length body. None on end of stream.
async fn read_request(sock: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 1024];
    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = sock.read(&mut tmp).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&tmp[..n]);
    };
    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let body_len = head
        .lines()
        .find_map(|l| l.strip_prefix("Content-Length: "))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < head_end + body_len {
        let n = sock.read(&mut tmp).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&tmp[..n]);
    }
    Some(String::from_utf8_lossy(&buf).into_owned())
}

fn client(port: u16, dns: &Arc<StaticDnsClient>, timeout: Duration) -> HttpClient {
    let config = HttpClientConfig::new(HOST, port)
        .tls(false)
        .user_agent("postiglione-test")
        .default_timeout(timeout);
    HttpClient::new(config).with_dns(dns.clone())
}

fn dns() -> Arc<StaticDnsClient> {
    Arc::new(StaticDnsClient::new().with_a(HOST, Ipv4Addr::LOCALHOST))
}

fn json(response: &Response) -> serde_json::Value {
    serde_json::from_slice(&response.body).unwrap()
}

#[tokio::test]
async fn content_length_response_then_close() {
    let server = TestServer::start(vec![Reply::Close(
        b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello",
    )])
    .await;
    let dns = dns();
    let mut client = client(server.port, &dns, Duration::from_secs(5));

    let request = client.get("/").build();
    let response = client.send(&request).await;

    assert_eq!(response.code, 200);
    assert_eq!(response.reason.as_deref(), Some("OK"));
    assert_eq!(&response.body[..], b"hello");
    assert!(!response.synthesized);
    assert!(!response.truncated);
    assert!(!client.is_connected());
    assert!(client.resolved_address().is_none());
    assert_eq!(client.phase(), TransferPhase::Idle);
    assert_eq!(response.remote_addr.map(|a| a.port()), Some(server.port));

    let sent = &server.requests()[0];
    assert_eq!(
        sent,
        &format!(
            "GET / HTTP/1.1\r\nHost: {}:{}\r\nUser-Agent: postiglione-test\r\n\r\n",
            HOST, server.port
        )
    );
}

#[tokio::test]
async fn chunked_response_is_decoded() {
    let server = TestServer::start(vec![Reply::Close(
        b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n",
    )])
    .await;
    let dns = dns();
    let mut client = client(server.port, &dns, Duration::from_secs(5));
    let request = client.get("/wiki").build();
    let response = client.send(&request).await;
    assert_eq!(response.code, 200);
    assert_eq!(response.body_str(), "Wikipedia");
}

#[tokio::test]
async fn keep_alive_reuses_connection() {
    let server = TestServer::start(vec![
        Reply::KeepOpen(b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\nConnection: keep-alive\r\n\r\none"),
        Reply::KeepOpen(b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\nConnection: Keep-Alive\r\n\r\ntwo"),
    ])
    .await;
    let dns = dns();
    let mut client = client(server.port, &dns, Duration::from_secs(5));

    let first = client.send(&client.get("/1").build()).await;
    assert!(client.is_connected());
    let second = client.send(&client.get("/2").build()).await;

    assert_eq!(first.body_str(), "one");
    assert_eq!(second.body_str(), "two");
    assert_eq!(first.local_addr, second.local_addr);
    assert_eq!(server.accepts(), 1);
    assert_eq!(dns.queries(), 2);
    assert!(client.is_connected());
}

#[tokio::test]
async fn chunked_keep_alive_with_late_terminator_reuses_connection() {
    let server = TestServer::start(vec![
        Reply::KeepOpenSplit(
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nConnection: keep-alive\r\n\r\n3\r\nabc\r\n0\r\n",
            b"X-Checksum: 1\r\n\r\n",
        ),
        Reply::KeepOpen(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: keep-alive\r\n\r\nok"),
    ])
    .await;
    let dns = dns();
    let mut client = client(server.port, &dns, Duration::from_secs(5));

    let first = client.send(&client.get("/1").build()).await;
    assert_eq!(first.code, 200);
    assert_eq!(first.body_str(), "abc");
    assert!(!first.truncated);
    assert!(client.is_connected());

    let second = client.send(&client.get("/2").build()).await;
    assert_eq!(second.code, 200);
    assert!(!second.synthesized);
    assert_eq!(second.body_str(), "ok");
    assert_eq!(server.accepts(), 1);
}

#[tokio::test]
async fn huge_default_timeout_still_transfers() {
    let server = TestServer::start(vec![Reply::Close(
        b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok",
    )])
    .await;
    let dns = dns();
    let mut client = client(server.port, &dns, Duration::MAX);
    let response = client.send(&client.get("/").build()).await;
    assert_eq!(response.code, 200);
    assert_eq!(response.body_str(), "ok");
}

#[tokio::test]
async fn missing_directive_closes_connection() {
    let server = TestServer::start(vec![
        Reply::Close(b"HTTP/1.1 200 OK\r\nContent-Length: 1\r\n\r\na"),
        Reply::Close(b"HTTP/1.1 200 OK\r\nContent-Length: 1\r\n\r\nb"),
    ])
    .await;
    let dns = dns();
    let mut client = client(server.port, &dns, Duration::from_secs(5));

    let first = client.send(&client.get("/").build()).await;
    assert!(!client.is_connected());
    let second = client.send(&client.get("/").build()).await;

    assert_eq!(first.body_str(), "a");
    assert_eq!(second.body_str(), "b");
    assert_eq!(server.accepts(), 2);
    // Torn down connections are resolved again.
    assert_eq!(dns.queries(), 4);
}

#[tokio::test]
async fn silence_becomes_408_and_next_call_resolves_again() {
    let server = TestServer::start(vec![
        Reply::Stall(b""),
        Reply::Close(b"HTTP/1.1 204 No Content\r\n\r\n"),
    ])
    .await;
    let dns = dns();
    let mut client = client(server.port, &dns, Duration::from_millis(300));

    let request = client.get("/slow").build();
    let response = client.send_attempt(&request, TransferAttempt::new(2)).await;

    assert_eq!(response.code, 408);
    assert!(response.synthesized);
    assert_eq!(response.retry_counter, 2);
    assert_eq!(response.header("content-type"), Some("application/json"));
    let body = json(&response);
    assert!(body["timeout"].as_u64().unwrap() >= 300);
    assert!(body["message"].as_str().unwrap().contains("awaiting header"));
    assert!(response.runtime >= Duration::from_millis(300));
    assert!(!client.is_connected());
    assert_eq!(dns.queries(), 2);

    let response = client.send(&request).await;
    assert_eq!(response.code, 204);
    assert!(response.body.is_empty());
    assert_eq!(dns.queries(), 4);
    assert_eq!(server.accepts(), 2);
}

#[tokio::test]
async fn request_timeout_shortens_deadline() {
    let server = TestServer::start(vec![Reply::Stall(b"")]).await;
    let dns = dns();
    let mut client = client(server.port, &dns, Duration::from_secs(30));
    let mut builder = client.get("/");
    builder.timeout(Duration::from_millis(200));
    let response = client.send(&builder.build()).await;
    assert_eq!(response.code, 408);
    assert!(response.runtime < Duration::from_secs(5));
}

#[tokio::test]
async fn early_close_truncates_fixed_length_body() {
    let server = TestServer::start(vec![Reply::Close(
        b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\nConnection: keep-alive\r\n\r\nabc",
    )])
    .await;
    let dns = dns();
    let mut client = client(server.port, &dns, Duration::from_secs(5));
    let response = client.send(&client.get("/").build()).await;
    assert_eq!(response.code, 200);
    assert_eq!(response.body_str(), "abc");
    assert!(response.truncated);
    assert!(!client.is_connected());
}

#[traced_test]
#[tokio::test]
async fn deadline_truncates_fixed_length_body() {
    let server = TestServer::start(vec![Reply::Stall(
        b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\nConnection: keep-alive\r\n\r\nabc",
    )])
    .await;
    let dns = dns();
    let mut client = client(server.port, &dns, Duration::from_millis(300));
    let response = client.send(&client.get("/").build()).await;
    assert_eq!(response.code, 200);
    assert!(!response.synthesized);
    assert_eq!(response.body_str(), "abc");
    assert!(response.truncated);
    // The rest of the body may still arrive; the stream cannot be reused.
    assert!(!client.is_connected());
    assert!(logs_contain("deadline elapsed, body truncated"));
}

#[tokio::test]
async fn read_until_close_body() {
    let server = TestServer::start(vec![Reply::Close(
        b"HTTP/1.0 200 OK\r\nConnection: keep-alive\r\n\r\nall of it, until the end",
    )])
    .await;
    let dns = dns();
    let mut client = client(server.port, &dns, Duration::from_secs(5));
    let response = client.send(&client.get("/").build()).await;
    assert_eq!(response.version, "HTTP/1.0");
    assert_eq!(response.body_str(), "all of it, until the end");
    assert!(!response.truncated);
    assert!(!client.is_connected());
}

#[tokio::test]
async fn interim_continue_is_skipped() {
    let server = TestServer::start(vec![Reply::Close(
        b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 201 Created\r\nContent-Length: 2\r\n\r\nok",
    )])
    .await;
    let dns = dns();
    let mut client = client(server.port, &dns, Duration::from_secs(5));
    let mut builder = client.post("/items");
    builder.body(&b"{\"name\":\"x\"}"[..]);
    let response = client.send(&builder.build()).await;
    assert_eq!(response.code, 201);
    assert_eq!(response.body_str(), "ok");
    assert!(server.requests()[0].ends_with("\r\n\r\n{\"name\":\"x\"}"));
}

#[tokio::test]
async fn head_response_has_no_body_and_keeps_connection() {
    let server = TestServer::start(vec![
        Reply::KeepOpen(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: keep-alive\r\n\r\n"),
        Reply::Close(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello"),
    ])
    .await;
    let dns = dns();
    let mut client = client(server.port, &dns, Duration::from_secs(5));
    let head = client.send(&client.head("/").build()).await;
    assert_eq!(head.code, 200);
    assert!(head.body.is_empty());
    assert_eq!(head.content_length(), Some(5));
    assert!(client.is_connected());
    let get = client.send(&client.get("/").build()).await;
    assert_eq!(get.body_str(), "hello");
    assert_eq!(server.accepts(), 1);
}

#[tokio::test]
async fn malformed_status_line_is_400() {
    let server = TestServer::start(vec![Reply::Close(b"SSH-2.0-OpenSSH_9.6\r\n\r\n")]).await;
    let dns = dns();
    let mut client = client(server.port, &dns, Duration::from_secs(5));
    let response = client.send(&client.get("/").build()).await;
    assert_eq!(response.code, 400);
    assert!(response.synthesized);
    assert!(json(&response)["message"]
        .as_str()
        .unwrap()
        .starts_with("malformed response: invalid status line"));
}

#[tokio::test]
async fn unresolvable_host_is_400() {
    let dns = Arc::new(StaticDnsClient::new());
    let mut client = client(80, &dns, Duration::from_secs(5));
    let response = client.send(&client.get("/").build()).await;
    assert_eq!(response.code, 400);
    assert_eq!(
        json(&response)["message"],
        "could not resolve server.test: no A or AAAA record"
    );
    assert!(json(&response)["stackTrace"]
        .as_str()
        .unwrap()
        .ends_with("phase: resolving"));
}

#[tokio::test]
async fn refused_connection_is_400() {
    let port = {
        let l = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        l.local_addr().unwrap().port()
    };
    let dns = dns();
    let mut client = client(port, &dns, Duration::from_secs(5));
    let response = client.send(&client.get("/").build()).await;
    assert_eq!(response.code, 400);
    assert!(response.synthesized);
    assert!(!client.is_connected());
}

#[tokio::test]
async fn cancellation_is_400() {
    let server = TestServer::start(vec![Reply::Stall(b"")]).await;
    let dns = dns();
    let mut client = client(server.port, &dns, Duration::from_secs(30));
    let token = CancelToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });
    let request = client.get("/").build();
    let response = client
        .send_attempt(&request, TransferAttempt::new(0).with_cancel(token))
        .await;
    assert_eq!(response.code, 400);
    assert_eq!(json(&response)["message"], "transfer cancelled while awaiting header");
    assert!(response.runtime < Duration::from_secs(5));
    assert!(!client.is_connected());
}

#[traced_test]
#[tokio::test]
async fn abandoned_transfer_discards_connection() {
    let server = TestServer::start(vec![
        Reply::Stall(b""),
        Reply::Close(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok"),
    ])
    .await;
    let dns = dns();
    let mut client = client(server.port, &dns, Duration::from_secs(30));
    let request = client.get("/").build();

    let abandoned = tokio::time::timeout(Duration::from_millis(100), client.send(&request)).await;
    assert!(abandoned.is_err());
    assert_eq!(client.phase(), TransferPhase::AwaitingHeader);

    let response = client.send(&request).await;
    assert_eq!(response.body_str(), "ok");
    assert_eq!(client.phase(), TransferPhase::Idle);
    assert!(logs_contain("previous transfer was abandoned"));
}

#[derive(Default)]
struct EventLog(Mutex<Vec<String>>);

impl EventLog {
    fn push(&self, event: String) {
        self.0.lock().unwrap().push(event);
    }
}

impl TransferObserver for EventLog {
    fn on_request(&self, request: &Request) {
        self.push(format!("request {}", request.path()));
    }

    fn on_data_read(&self, received: u64, expected: Option<u64>) {
        self.push(format!("data {} {:?}", received, expected));
    }

    fn on_chunk_data_read(&self, chunk: u32, chunk_len: usize, _decoded_total: u64) {
        self.push(format!("chunk {} {}", chunk, chunk_len));
    }

    fn on_response(&self, _request: &Request, response: &Response) {
        self.push(format!("response {}", response.code));
    }

    fn on_http_error(&self, _request: &Request, response: &Response) {
        self.push(format!("error {}", response.code));
    }
}

#[tokio::test]
async fn observers_see_each_checkpoint() {
    let server = TestServer::start(vec![
        Reply::KeepOpen(b"HTTP/1.1 404 Not Found\r\nContent-Length: 4\r\nConnection: keep-alive\r\n\r\nnope"),
        Reply::Close(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n2\r\nhi\r\n0\r\n\r\n"),
    ])
    .await;
    let dns = dns();
    let mut client = client(server.port, &dns, Duration::from_secs(5));
    let log = Arc::new(EventLog::default());
    client.add_observer(log.clone());

    client.send(&client.get("/missing").build()).await;
    client.send(&client.get("/chunks").build()).await;

    let events = log.0.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            "request /missing",
            "data 4 Some(4)",
            "response 404",
            "error 404",
            "request /chunks",
            "chunk 1 2",
            "response 200",
        ]
    );
}
