use std::time::Duration;

use rama::error::{ErrorContext as _, OpaqueError};

use super::ClientConfig;

/// Fixed grace added on top of the worst case session duration
/// before the supervisor gives up on a client.
pub const SUPERVISOR_GRACE: Duration = Duration::from_secs(10);

/// Largest `read_bytes` accepted, every admitted client holds a buffer of this size.
pub const MAX_READ_CHUNK_SIZE: usize = 1024 * 1024;

/// Largest `seconds`, `sleep` or `conn_timeout` accepted (one week).
pub const MAX_DURATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Validated and immutable configuration of a single slow read batch.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub total_clients: usize,
    pub concurrency_limit: usize,
    pub read_chunk_size: usize,
    pub inter_read_delay: Duration,
    pub run_duration: Duration,
    pub connect_timeout: Duration,
}

impl RunConfig {
    /// Validate a fully merged [`ClientConfig`] together with the target.
    pub fn try_new(
        host: impl Into<String>,
        port: u16,
        path: impl Into<String>,
        client: &ClientConfig,
    ) -> Result<Self, OpaqueError> {
        let host = host.into();
        let path = path.into();

        if host.is_empty() || host.contains(char::is_whitespace) {
            return Err(OpaqueError::from_display(format!(
                "invalid host '{host}': expected a non-empty hostname or ip"
            )));
        }
        if !path.starts_with('/') || path.contains(char::is_whitespace) {
            return Err(OpaqueError::from_display(format!(
                "invalid path '{path}': expected an absolute path without whitespace"
            )));
        }

        let total_clients = required(client.clients, "clients")?;
        if total_clients == 0 {
            return Err(OpaqueError::from_display("clients must be >= 1"));
        }

        let concurrency_limit = required(client.concurrency, "concurrency")?;
        if concurrency_limit == 0 {
            return Err(OpaqueError::from_display("concurrency must be >= 1"));
        }

        let read_chunk_size = required(client.read_bytes, "read_bytes")?;
        if read_chunk_size == 0 {
            return Err(OpaqueError::from_display("read_bytes must be >= 1"));
        }
        if read_chunk_size > MAX_READ_CHUNK_SIZE {
            return Err(OpaqueError::from_display(format!(
                "read_bytes must be <= {MAX_READ_CHUNK_SIZE}"
            )));
        }

        let inter_read_delay = seconds(required(client.sleep, "sleep")?, "sleep")?;

        let run_duration = seconds(required(client.seconds, "seconds")?, "seconds")?;
        if run_duration.is_zero() {
            return Err(OpaqueError::from_display("seconds must be > 0"));
        }

        let connect_timeout =
            seconds(required(client.conn_timeout, "conn_timeout")?, "conn_timeout")?;
        if connect_timeout.is_zero() {
            return Err(OpaqueError::from_display("conn_timeout must be > 0"));
        }

        Ok(Self {
            host,
            port,
            path,
            total_clients,
            concurrency_limit,
            read_chunk_size,
            inter_read_delay,
            run_duration,
            connect_timeout,
        })
    }

    /// Outer deadline for a single client: its read window,
    /// the connect timeout and a fixed grace.
    pub fn supervisory_timeout(&self) -> Duration {
        self.run_duration + self.connect_timeout + SUPERVISOR_GRACE
    }

    /// Admission ceiling that can actually be reached.
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency_limit.min(self.total_clients)
    }
}

fn required<T>(value: Option<T>, name: &'static str) -> Result<T, OpaqueError> {
    value.ok_or_else(|| OpaqueError::from_display(format!("property '{name}' is undefined")))
}

fn seconds(value: f64, name: &'static str) -> Result<Duration, OpaqueError> {
    let duration = Duration::try_from_secs_f64(value).with_context(|| {
        format!("property '{name}' must be a finite, non-negative amount of seconds")
    })?;
    if duration > MAX_DURATION {
        return Err(OpaqueError::from_display(format!(
            "property '{name}' must be at most {} seconds",
            MAX_DURATION.as_secs()
        )));
    }
    Ok(duration)
}
