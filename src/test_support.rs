//! Loopback HTTP server with canned replies, shared by the async tests.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone)]
pub struct Request {
  pub method: String,
  pub path: String,
  pub body: String,
}

pub type Seen = Arc<StdMutex<Vec<Request>>>;

/// How the server answers one request.
#[derive(Debug, Clone)]
pub enum Reply {
  /// Status and a JSON (or plain) body with an exact Content-Length.
  Body(u16, String),
  /// 200 with `Transfer-Encoding: chunked`, one chunk per element, each
  /// flushed separately with a short pause in between.
  Chunked(Vec<String>),
  /// 200 declaring `declared` bytes but closing after `body`.
  Truncated { declared: usize, body: String },
}

impl From<(u16, String)> for Reply {
  fn from((status, body): (u16, String)) -> Self {
    Reply::Body(status, body)
  }
}

async fn read_request(stream: &mut TcpStream) -> Option<Request> {
  let mut buf = Vec::new();
  let mut chunk = [0u8; 4096];
  let header_end = loop {
    let n = stream.read(&mut chunk).await.ok()?;
    if n == 0 {
      return None;
    }
    buf.extend_from_slice(&chunk[..n]);
    if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
      break pos + 4;
    }
  };
  let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
  let content_length = head
    .lines()
    .filter_map(|l| l.split_once(':'))
    .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
    .and_then(|(_, v)| v.trim().parse::<usize>().ok())
    .unwrap_or(0);
  while buf.len() < header_end + content_length {
    let n = stream.read(&mut chunk).await.ok()?;
    if n == 0 {
      break;
    }
    buf.extend_from_slice(&chunk[..n]);
  }
  let mut parts = head.split_whitespace();
  let method = parts.next()?.to_string();
  let path = parts.next()?.to_string();
  let body = String::from_utf8_lossy(&buf[header_end..]).to_string();
  Some(Request { method, path, body })
}

async fn write_reply(stream: &mut TcpStream, reply: Reply, is_head: bool) {
  match reply {
    Reply::Body(status, body) => {
      let head = format!(
        "HTTP/1.1 {} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        body.len()
      );
      let _ = stream.write_all(head.as_bytes()).await;
      if !is_head {
        let _ = stream.write_all(body.as_bytes()).await;
      }
    }
    Reply::Chunked(chunks) => {
      let head = "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n";
      let _ = stream.write_all(head.as_bytes()).await;
      for chunk in chunks.iter().filter(|c| !c.is_empty()) {
        let _ = stream.write_all(format!("{:x}\r\n{}\r\n", chunk.len(), chunk).as_bytes()).await;
        let _ = stream.flush().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
      }
      let _ = stream.write_all(b"0\r\n\r\n").await;
    }
    Reply::Truncated { declared, body } => {
      let head = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        declared
      );
      let _ = stream.write_all(head.as_bytes()).await;
      let _ = stream.write_all(body.as_bytes()).await;
    }
  }
  let _ = stream.shutdown().await;
}

/// Serve canned replies on a loopback port until the test ends.
pub async fn serve<F, R>(handler: F) -> (u16, Seen)
where
  F: Fn(&Request) -> R + Send + Sync + 'static,
  R: Into<Reply> + Send + 'static,
{
  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  let port = listener.local_addr().unwrap().port();
  let seen: Seen = Arc::new(StdMutex::new(Vec::new()));
  let handler = Arc::new(handler);
  let log = seen.clone();
  tokio::spawn(async move {
    while let Ok((mut stream, _)) = listener.accept().await {
      let handler = handler.clone();
      let log = log.clone();
      tokio::spawn(async move {
        let Some(req) = read_request(&mut stream).await else { return };
        let reply: Reply = (*handler)(&req).into();
        let is_head = req.method == "HEAD";
        log.lock().unwrap().push(req);
        write_reply(&mut stream, reply, is_head).await;
      });
    }
  });
  (port, seen)
}

/// A loopback port with nothing listening on it.
pub async fn dead_port() -> u16 {
  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  listener.local_addr().unwrap().port()
}

pub fn requests(seen: &Seen) -> Vec<Request> {
  seen.lock().unwrap().clone()
}
