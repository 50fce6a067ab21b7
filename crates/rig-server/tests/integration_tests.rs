//! Integration tests for the rig-server binary.
//!
//! These tests spawn the compiled server, read its port from stdout and talk
//! to both RPC endpoints over real WebSocket connections.

use futures::{SinkExt, StreamExt};
use rig_rpc::{Binary, Codec, Request, RequestKind, Response, ResponseBody};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Serialize)]
struct PrintfRequest {
    msg: String,
    info: Vec<String>,
}

#[derive(Deserialize)]
struct PrintfResponse {
    str: String,
}

#[derive(Serialize)]
struct CountRequest {
    to: u32,
    interval_ms: u64,
}

/// Check health endpoint.
async fn check_health(port: u16) -> bool {
    let client = reqwest::Client::new();
    if let Ok(response) = client
        .get(format!("http://127.0.0.1:{}/health", port))
        .timeout(Duration::from_secs(5))
        .send()
        .await
    {
        if let Ok(json) = response.json::<Value>().await {
            return json.get("status").and_then(|v| v.as_str()) == Some("ok");
        }
    }
    false
}

/// Wait for server to be ready.
async fn wait_for_server(port: u16, timeout_secs: u64) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < Duration::from_secs(timeout_secs) {
        if check_health(port).await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}

struct ServerHandle {
    child: tokio::process::Child,
    port: u16,
    stdout_drain: Option<tokio::task::JoinHandle<()>>,
}

impl ServerHandle {
    async fn stop(mut self) {
        if let Some(drain) = self.stdout_drain.take() {
            drain.abort();
        }
        let _ = self.child.kill().await;
        let _ = self.child.wait().await;
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Some(drain) = self.stdout_drain.take() {
            drain.abort();
        }
        let _ = self.child.start_kill();
    }
}

/// Start the server binary and wait until `/health` is ready.
async fn start_server(extra_args: &[&str]) -> Result<ServerHandle, String> {
    let mut child = tokio::process::Command::new(env!("CARGO_BIN_EXE_rig-server"))
        .arg("--host")
        .arg("127.0.0.1")
        .arg("--port")
        .arg("0")
        .args(extra_args)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| format!("failed to spawn rig-server: {e}"))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| "failed to capture stdout".to_string())?;
    let mut lines = tokio::io::BufReader::new(stdout).lines();

    let mut discovered_port: Option<u16> = None;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(20);
    while tokio::time::Instant::now() < deadline {
        match tokio::time::timeout(Duration::from_millis(250), lines.next_line()).await {
            Ok(Ok(Some(line))) => {
                if let Some(value) = line.strip_prefix("RPC_PORT=") {
                    let parsed = value
                        .trim()
                        .parse::<u16>()
                        .map_err(|e| format!("invalid RPC_PORT value '{value}': {e}"))?;
                    discovered_port = Some(parsed);
                    break;
                }
            }
            Ok(Ok(None)) => break,
            Ok(Err(err)) => return Err(format!("failed to read rig-server stdout: {err}")),
            Err(_) => continue,
        }
    }

    let port = discovered_port.ok_or_else(|| "RPC_PORT line not emitted".to_string())?;
    if !wait_for_server(port, 15).await {
        return Err(format!("rig-server failed health check on port {port}"));
    }

    let stdout_drain =
        tokio::spawn(async move { while let Ok(Some(_)) = lines.next_line().await {} });

    Ok(ServerHandle {
        child,
        port,
        stdout_drain: Some(stdout_drain),
    })
}

async fn connect(port: u16, path: &str) -> Socket {
    let (socket, _) = connect_async(format!("ws://127.0.0.1:{port}{path}"))
        .await
        .expect("WebSocket connect failed");
    socket
}

/// Next text or binary message, skipping control frames.
async fn next_message(socket: &mut Socket) -> Message {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for a message")
            .expect("connection closed")
            .expect("WebSocket error");
        match message {
            Message::Text(_) | Message::Binary(_) => return message,
            _ => continue,
        }
    }
}

async fn next_json(socket: &mut Socket) -> Value {
    match next_message(socket).await {
        Message::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("expected a text message, got {other:?}"),
    }
}

async fn next_binary(socket: &mut Socket) -> Response {
    match next_message(socket).await {
        Message::Binary(bytes) => Binary::decode_response(&bytes).unwrap(),
        other => panic!("expected a binary message, got {other:?}"),
    }
}

async fn send_binary(socket: &mut Socket, request: &Request) {
    let bytes = Binary::encode_request(request).unwrap();
    socket.send(Message::Binary(bytes)).await.unwrap();
}

#[tokio::test]
async fn test_health() {
    let server = start_server(&[]).await.expect("server should start");
    assert!(check_health(server.port).await);
    server.stop().await;
}

#[tokio::test]
async fn test_json_printf() {
    let server = start_server(&[]).await.expect("server should start");
    let mut socket = connect(server.port, "/jrpc").await;

    let request = json!({
        "id": "1",
        "method": "printf",
        "params": {"msg": "Hello, %s!", "info": ["world"]}
    });
    socket.send(Message::Text(request.to_string())).await.unwrap();

    let response = next_json(&mut socket).await;
    assert_eq!(response, json!({"id": "1", "result": {"str": "Hello, world!"}}));

    server.stop().await;
}

#[tokio::test]
async fn test_json_unknown_function() {
    let server = start_server(&[]).await.expect("server should start");
    let mut socket = connect(server.port, "/jrpc").await;

    socket
        .send(Message::Text(json!({"id": "2", "method": "nope"}).to_string()))
        .await
        .unwrap();
    let response = next_json(&mut socket).await;
    assert_eq!(
        response,
        json!({"id": "2", "error": {"code": 404, "message": "function \"nope\" not found"}})
    );

    server.stop().await;
}

#[tokio::test]
async fn test_json_stream() {
    let server = start_server(&[]).await.expect("server should start");
    let mut socket = connect(server.port, "/jrpc").await;

    let request = json!({"id": "c", "method": "count", "params": {"to": 2}, "stream": true});
    socket.send(Message::Text(request.to_string())).await.unwrap();

    assert_eq!(next_json(&mut socket).await, json!({"id": "c", "result": 1, "end": false}));
    assert_eq!(next_json(&mut socket).await, json!({"id": "c", "result": 2, "end": false}));
    assert_eq!(next_json(&mut socket).await, json!({"id": "c", "end": true}));

    server.stop().await;
}

#[tokio::test]
async fn test_binary_printf_and_stream() {
    let server = start_server(&[]).await.expect("server should start");
    let mut socket = connect(server.port, "/mrpc").await;

    let input = Binary::encode_payload(&PrintfRequest {
        msg: "%s has %d legs".into(),
        info: vec!["spider".into(), "8".into()],
    })
    .unwrap();
    send_binary(&mut socket, &Request::new("1", RequestKind::Call, "printf", Some(input))).await;

    let response = next_binary(&mut socket).await;
    assert_eq!(response.id, "1");
    let ResponseBody::Succ(output) = response.body else {
        panic!("expected success");
    };
    let output: PrintfResponse = Binary::decode_payload(output.as_deref()).unwrap();
    assert_eq!(output.str, "spider has 8 legs");

    let input = Binary::encode_payload(&CountRequest {
        to: 3,
        interval_ms: 0,
    })
    .unwrap();
    send_binary(&mut socket, &Request::new("2", RequestKind::Start, "count", Some(input))).await;

    for expected in 1..=3u32 {
        let response = next_binary(&mut socket).await;
        assert_eq!(response.id, "2");
        let ResponseBody::Yield(item) = response.body else {
            panic!("expected an item");
        };
        assert_eq!(Binary::decode_payload::<u32>(item.as_deref()).unwrap(), expected);
    }
    assert_eq!(next_binary(&mut socket).await.body, ResponseBody::End);

    server.stop().await;
}

#[tokio::test]
async fn test_binary_endpoint_ignores_text() {
    let server = start_server(&[]).await.expect("server should start");
    let mut socket = connect(server.port, "/mrpc").await;

    socket.send(Message::Text("hello".into())).await.unwrap();
    send_binary(&mut socket, &Request::new("9", RequestKind::Call, "nope", None)).await;

    let response = next_binary(&mut socket).await;
    assert_eq!(response.id, "9");
    assert!(matches!(response.body, ResponseBody::Fail(ref fail) if fail.code == 404));

    server.stop().await;
}

#[tokio::test]
async fn test_read_limit_closes_connection() {
    let server = start_server(&["--read-limit", "256"])
        .await
        .expect("server should start");
    let mut socket = connect(server.port, "/jrpc").await;

    let request = json!({"id": "1", "method": "printf", "params": {"msg": "x".repeat(1024)}});
    let _ = socket.send(Message::Text(request.to_string())).await;

    let outcome = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(outcome.is_ok(), "connection should be closed");

    server.stop().await;
}
