//! Test utilities for the relay
//!
//! Mock servers such as wiremock always finish their responses cleanly, so
//! this module provides a raw TCP upstream that starts a chunked response and
//! then drops the connection before the terminating chunk.

use bytes::Bytes;
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Upstream that sends `chunks` as a chunked 200 response, then hangs up.
pub struct AbortingUpstream {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl AbortingUpstream {
    pub async fn start(chunks: Vec<Bytes>) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let handle = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let chunks = chunks.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve_truncated(socket, &chunks).await {
                        tracing::debug!("Aborting upstream connection error: {e}");
                    }
                });
            }
        });

        Ok(Self { addr, handle })
    }

    /// Base URL to use as the relay's upstream
    pub fn uri(&self) -> String {
        format!("http://{}", self.addr)
    }
}

impl Drop for AbortingUpstream {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve_truncated(mut socket: TcpStream, chunks: &[Bytes]) -> io::Result<()> {
    // Read the whole request first so closing the socket sends FIN, not RST.
    read_request(&mut socket).await?;

    socket
        .write_all(
            b"HTTP/1.1 200 OK\r\n\
              content-type: application/x-ndjson\r\n\
              transfer-encoding: chunked\r\n\r\n",
        )
        .await?;

    for chunk in chunks {
        socket
            .write_all(format!("{:x}\r\n", chunk.len()).as_bytes())
            .await?;
        socket.write_all(chunk).await?;
        socket.write_all(b"\r\n").await?;
        socket.flush().await?;
    }

    // No zero-length terminating chunk: the body ends abnormally.
    socket.shutdown().await
}

async fn read_request(socket: &mut TcpStream) -> io::Result<()> {
    let mut buf = Vec::new();
    let mut scratch = [0u8; 4096];

    let head_end = loop {
        if let Some(pos) = find_subslice(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
        let n = socket.read(&mut scratch).await?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed before request head",
            ));
        }
        buf.extend_from_slice(&scratch[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_ascii_lowercase();
    let content_length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let mut body_read = buf.len() - head_end;
    while body_read < content_length {
        let n = socket.read(&mut scratch).await?;
        if n == 0 {
            break;
        }
        body_read += n;
    }

    Ok(())
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
