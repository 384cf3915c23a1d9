//! Scripted HTTP/1.1 server used by the client tests.

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex as TokioMutex;

#[derive(Debug, Clone)]
pub(crate) enum MockReply {
    Respond {
        status: u16,
        body: String,
        delay_ms: u64,
    },
    DropConnection,
}

impl MockReply {
    pub(crate) fn json(status: u16, body: serde_json::Value) -> Self {
        Self::Respond {
            status,
            body: body.to_string(),
            delay_ms: 0,
        }
    }

    pub(crate) fn raw(status: u16, body: &str) -> Self {
        Self::Respond {
            status,
            body: body.to_string(),
            delay_ms: 0,
        }
    }

    pub(crate) fn delayed(mut self, delay: u64) -> Self {
        if let Self::Respond { delay_ms, .. } = &mut self {
            *delay_ms = delay;
        }
        self
    }
}

#[derive(Debug, Clone)]
pub(crate) struct CapturedRequest {
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: serde_json::Value,
    pub peer: IpAddr,
}

pub(crate) type Captured = Arc<TokioMutex<Vec<CapturedRequest>>>;

fn header_end_offset(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|window| window == b"\r\n\r\n")
}

async fn read_http_request(
    stream: &mut tokio::net::TcpStream,
) -> Option<(String, HashMap<String, String>, Vec<u8>)> {
    let mut buffer = Vec::new();
    loop {
        let mut chunk = [0_u8; 2048];
        let read = stream.read(&mut chunk).await.ok()?;
        if read == 0 {
            return None;
        }
        buffer.extend_from_slice(&chunk[..read]);
        if header_end_offset(&buffer).is_some() {
            break;
        }
    }

    let header_end = header_end_offset(&buffer)?;
    let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
    let mut lines = head.lines();
    let request_line = lines.next()?.to_string();
    let path = request_line.split_whitespace().nth(1)?.to_string();

    let mut headers = HashMap::new();
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    let content_length = headers
        .get("content-length")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buffer[header_end + 4..].to_vec();
    while body.len() < content_length {
        let mut chunk = [0_u8; 2048];
        let read = stream.read(&mut chunk).await.ok()?;
        if read == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..read]);
    }

    Some((path, headers, body))
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        403 => "Forbidden",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Error",
    }
}

async fn write_http_response(
    stream: &mut tokio::net::TcpStream,
    status: u16,
    body: &str,
) -> std::io::Result<()> {
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        status_text(status),
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await
}

/// Serves `replies` in order; unscripted requests get a 500.
pub(crate) async fn start_mock_server(
    replies: Vec<MockReply>,
) -> (String, Captured, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener addr");
    let captured: Captured = Arc::new(TokioMutex::new(Vec::new()));
    let scripted = Arc::new(TokioMutex::new(VecDeque::from(replies)));
    let captured_clone = Arc::clone(&captured);

    let handle = tokio::spawn(async move {
        loop {
            let (mut stream, peer) = match listener.accept().await {
                Ok(value) => value,
                Err(_) => break,
            };
            let captured_inner = Arc::clone(&captured_clone);
            let scripted_inner = Arc::clone(&scripted);
            tokio::spawn(async move {
                let Some((path, headers, body)) = read_http_request(&mut stream).await else {
                    return;
                };
                let body = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
                captured_inner.lock().await.push(CapturedRequest {
                    path,
                    headers,
                    body,
                    peer: peer.ip(),
                });

                let reply = scripted_inner
                    .lock()
                    .await
                    .pop_front()
                    .unwrap_or_else(|| MockReply::raw(500, "{}"));

                match reply {
                    MockReply::DropConnection => {}
                    MockReply::Respond {
                        status,
                        body,
                        delay_ms,
                    } => {
                        if delay_ms > 0 {
                            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        }
                        let _ = write_http_response(&mut stream, status, &body).await;
                    }
                }
            });
        }
    });

    (format!("http://{}", addr), captured, handle)
}
