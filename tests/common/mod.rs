//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Start a mock backend that answers every request with a fixed response.
pub async fn start_mock_backend(
    addr: SocketAddr,
    content_type: &'static str,
    body: &'static str,
) -> SocketAddr {
    start_mock_backend_with_status(addr, "200 OK", content_type, body).await
}

/// Like [`start_mock_backend`], with a custom status line.
#[allow(dead_code)]
pub async fn start_mock_backend_with_status(
    addr: SocketAddr,
    status: &'static str,
    content_type: &'static str,
    body: &'static str,
) -> SocketAddr {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nX-Backend: mock\r\nConnection: close\r\n\r\n{}",
        status,
        content_type,
        body.len(),
        body
    );
    start_raw_backend(addr, response).await
}

/// Mock backend that sends `body` chunked, without a `Content-Length`.
#[allow(dead_code)]
pub async fn start_chunked_backend(
    addr: SocketAddr,
    content_type: &'static str,
    body: &'static str,
    chunk_size: usize,
) -> SocketAddr {
    let mut response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {content_type}\r\nTransfer-Encoding: chunked\r\nX-Backend: mock\r\nConnection: close\r\n\r\n"
    );
    for chunk in body.as_bytes().chunks(chunk_size) {
        response.push_str(&format!("{:x}\r\n", chunk.len()));
        response.push_str(std::str::from_utf8(chunk).unwrap());
        response.push_str("\r\n");
    }
    response.push_str("0\r\n\r\n");
    start_raw_backend(addr, response).await
}

/// Mock backend writing the same raw HTTP response to every connection.
async fn start_raw_backend(addr: SocketAddr, response: String) -> SocketAddr {
    let listener = TcpListener::bind(addr).await.unwrap();
    let local_addr = listener.local_addr().unwrap();
    let response = std::sync::Arc::new(response);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let response = response.clone();
                    tokio::spawn(async move {
                        // Read (and ignore) the request head before answering.
                        let mut buf = [0u8; 4096];
                        let _ = socket.read(&mut buf).await;

                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    local_addr
}

/// An address nothing is listening on (yet).
#[allow(dead_code)]
pub async fn free_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// HTTP client that never goes through an environment proxy.
#[allow(dead_code)]
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

/// Lay out an `app/` directory with templates and static assets.
#[allow(dead_code)]
pub fn scaffold_app(root: &Path) {
    std::fs::create_dir_all(root.join("templates")).unwrap();
    std::fs::create_dir_all(root.join("static/css")).unwrap();
    std::fs::write(root.join("templates/index.html"), "<html><body></body></html>").unwrap();
    std::fs::write(root.join("static/css/site.css"), "body {}").unwrap();
    std::fs::write(root.join("main.py"), "app = None").unwrap();
}

/// Poll `check` until it holds or the timeout expires.
#[allow(dead_code)]
pub async fn eventually<F>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    check()
}
