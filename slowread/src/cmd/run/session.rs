//! A single simulated slow reading HTTP client.
//!
//! A session opens one connection, sends one `GET`, reads the response head
//! one byte at a time and then drains the body in small, paced chunks until
//! its read window is over or the server closes the connection.
//!
//! A session never fails: every fault is folded into the [`ClientResult`].

use std::{fmt, io, time::Duration};

use rama::telemetry::tracing;
use tokio::{
    io::{AsyncReadExt as _, AsyncWriteExt as _},
    net::TcpStream,
    time::Instant,
};

use crate::config::RunConfig;

/// Upper bound for the response head, terminator included.
pub const MAX_HEADER_BYTES: usize = 64 * 1024;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// The class of failure a client ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Refused, reset, timed out connecting or closed before the head was complete.
    Connection,
    /// Unexpected status or oversized head.
    Protocol,
    /// The supervisor gave up on the session.
    Timeout,
    /// Fault while pacing through the body.
    Read,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 4] = [
        ErrorKind::Connection,
        ErrorKind::Protocol,
        ErrorKind::Timeout,
        ErrorKind::Read,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Connection => "connection",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Read => "read",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub enum SessionError {
    Connect(io::Error),
    ConnectTimeout(Duration),
    Write(io::Error),
    HeadRead(io::Error),
    ClosedBeforeHeaders,
    HeadersTooLarge,
    BadStatus(String),
    BodyRead(io::Error),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::Connect(_)
            | SessionError::ConnectTimeout(_)
            | SessionError::Write(_)
            | SessionError::HeadRead(_)
            | SessionError::ClosedBeforeHeaders => ErrorKind::Connection,
            SessionError::HeadersTooLarge | SessionError::BadStatus(_) => ErrorKind::Protocol,
            SessionError::BodyRead(_) => ErrorKind::Read,
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Connect(err)
            | SessionError::Write(err)
            | SessionError::HeadRead(err)
            | SessionError::BodyRead(err) => write!(f, "{err}"),
            SessionError::ConnectTimeout(timeout) => {
                write!(f, "connect timed out after {:.1}s", timeout.as_secs_f64())
            }
            SessionError::ClosedBeforeHeaders => f.write_str("server closed before headers"),
            SessionError::HeadersTooLarge => f.write_str("headers too large"),
            SessionError::BadStatus(status_line) => f.write_str(status_line),
        }
    }
}

impl std::error::Error for SessionError {}

/// Outcome of exactly one simulated client.
#[derive(Debug, Clone)]
pub struct ClientResult {
    pub client_id: usize,
    pub ok: bool,
    pub bytes_read: u64,
    pub elapsed: Duration,
    /// Empty iff `ok`.
    pub error_message: String,
    pub error_kind: Option<ErrorKind>,
}

impl ClientResult {
    pub fn success(client_id: usize, bytes_read: u64, elapsed: Duration) -> Self {
        Self {
            client_id,
            ok: true,
            bytes_read,
            elapsed,
            error_message: String::new(),
            error_kind: None,
        }
    }

    pub fn failure(
        client_id: usize,
        kind: ErrorKind,
        message: impl Into<String>,
        bytes_read: u64,
        elapsed: Duration,
    ) -> Self {
        Self {
            client_id,
            ok: false,
            bytes_read,
            elapsed,
            error_message: message.into(),
            error_kind: Some(kind),
        }
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }
}

/// The literal request every client sends.
pub fn build_request(host: &str, path: &str) -> String {
    format!("GET {path} HTTP/1.1\r\nHost: {host}\r\nConnection: keep-alive\r\n\r\n")
}

/// Run one slow reading client to completion.
pub async fn run(client_id: usize, cfg: &RunConfig) -> ClientResult {
    let start = Instant::now();
    let mut bytes_read = 0;

    let result = drive(cfg, start, &mut bytes_read).await;
    let elapsed = start.elapsed();

    match result {
        Ok(()) => {
            tracing::debug!(client_id, bytes_read, ?elapsed, "session finished");
            ClientResult::success(client_id, bytes_read, elapsed)
        }
        Err(err) => {
            tracing::debug!(client_id, bytes_read, ?elapsed, kind = %err.kind(), "session failed: {err}");
            ClientResult::failure(client_id, err.kind(), err.to_string(), bytes_read, elapsed)
        }
    }
}

async fn drive(cfg: &RunConfig, start: Instant, bytes_read: &mut u64) -> Result<(), SessionError> {
    let mut stream = connect(cfg).await?;

    let result = exchange(&mut stream, cfg, start, bytes_read).await;

    // dropping the stream closes the read side
    if let Err(err) = stream.shutdown().await {
        tracing::trace!("shutdown of client stream failed: {err}");
    }

    result
}

async fn connect(cfg: &RunConfig) -> Result<TcpStream, SessionError> {
    let connect = TcpStream::connect((cfg.host.as_str(), cfg.port));
    match tokio::time::timeout(cfg.connect_timeout, connect).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(err)) => Err(SessionError::Connect(err)),
        Err(_) => Err(SessionError::ConnectTimeout(cfg.connect_timeout)),
    }
}

async fn exchange(
    stream: &mut TcpStream,
    cfg: &RunConfig,
    start: Instant,
    bytes_read: &mut u64,
) -> Result<(), SessionError> {
    stream
        .write_all(build_request(&cfg.host, &cfg.path).as_bytes())
        .await
        .map_err(SessionError::Write)?;

    let head = read_head(stream).await?;
    check_status(&head)?;

    let deadline = start + cfg.run_duration;
    let mut buf = vec![0u8; cfg.read_chunk_size];

    while Instant::now() < deadline {
        let n = match tokio::time::timeout_at(deadline, stream.read(&mut buf)).await {
            Ok(result) => result.map_err(SessionError::BodyRead)?,
            Err(_) => break,
        };
        if n == 0 {
            tracing::trace!(bytes_read = *bytes_read, "server closed the body stream");
            break;
        }
        *bytes_read += n as u64;

        if !cfg.inter_read_delay.is_zero() {
            tokio::time::sleep(cfg.inter_read_delay).await;
        }
    }

    Ok(())
}

/// Read the response head byte by byte so that nothing of the body is consumed.
async fn read_head(stream: &mut TcpStream) -> Result<Vec<u8>, SessionError> {
    let mut head = Vec::with_capacity(512);
    let mut byte = [0u8; 1];

    while !head.ends_with(HEADER_TERMINATOR) {
        let n = stream.read(&mut byte).await.map_err(SessionError::HeadRead)?;
        if n == 0 {
            return Err(SessionError::ClosedBeforeHeaders);
        }
        head.push(byte[0]);
        if head.len() > MAX_HEADER_BYTES {
            return Err(SessionError::HeadersTooLarge);
        }
    }

    Ok(head)
}

fn check_status(head: &[u8]) -> Result<(), SessionError> {
    let text = String::from_utf8_lossy(head);
    let Some(status_line) = text.lines().next().filter(|line| !line.is_empty()) else {
        return Err(SessionError::BadStatus("bad status".to_owned()));
    };

    if status_line.contains(" 200 ") || status_line.contains(" 206 ") {
        Ok(())
    } else {
        Err(SessionError::BadStatus(status_line.to_owned()))
    }
}
