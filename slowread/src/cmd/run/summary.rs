use std::time::Duration;

use super::session::{ClientResult, ErrorKind};

/// How many failure messages a summary keeps.
pub const MAX_SAMPLE_ERRORS: usize = 5;

/// Folds client results, in arrival order, into a [`BatchSummary`].
#[derive(Debug)]
pub struct ResultAggregator {
    total_clients: usize,
    collected: usize,
    ok_count: usize,
    total_bytes_read: u64,
    sample_errors: Vec<String>,
    failures_by_kind: [usize; ErrorKind::ALL.len()],
    last_result_at: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchSummary {
    pub total_clients: usize,
    /// Results that actually came in, at most `total_clients`.
    pub collected: usize,
    pub ok_count: usize,
    /// Includes clients that never reported a result.
    pub fail_count: usize,
    pub total_bytes_read: u64,
    pub sample_errors: Vec<String>,
    pub failures_by_kind: Vec<(ErrorKind, usize)>,
    pub wall_elapsed: Duration,
}

impl ResultAggregator {
    pub fn new(total_clients: usize) -> Self {
        Self {
            total_clients,
            collected: 0,
            ok_count: 0,
            total_bytes_read: 0,
            sample_errors: Vec::with_capacity(MAX_SAMPLE_ERRORS),
            failures_by_kind: [0; ErrorKind::ALL.len()],
            last_result_at: Duration::ZERO,
        }
    }

    /// Record one result, `at` being the time since batch start.
    pub fn push(&mut self, result: &ClientResult, at: Duration) {
        self.collected += 1;
        self.total_bytes_read += result.bytes_read;
        self.last_result_at = self.last_result_at.max(at);

        if result.ok {
            self.ok_count += 1;
            return;
        }

        if let Some(kind) = result.error_kind {
            self.failures_by_kind[kind_index(kind)] += 1;
        }

        if self.sample_errors.len() < MAX_SAMPLE_ERRORS {
            self.sample_errors.push(result.error_message.clone());
        }
    }

    pub fn collected(&self) -> usize {
        self.collected
    }

    pub fn is_complete(&self) -> bool {
        self.collected >= self.total_clients
    }

    pub fn summarize(&self) -> BatchSummary {
        BatchSummary {
            total_clients: self.total_clients,
            collected: self.collected,
            ok_count: self.ok_count,
            fail_count: self.total_clients.saturating_sub(self.ok_count),
            total_bytes_read: self.total_bytes_read,
            sample_errors: self.sample_errors.clone(),
            failures_by_kind: ErrorKind::ALL
                .into_iter()
                .map(|kind| (kind, self.failures_by_kind[kind_index(kind)]))
                .filter(|(_, count)| *count > 0)
                .collect(),
            wall_elapsed: self.last_result_at,
        }
    }
}

impl BatchSummary {
    pub fn total_mib(&self) -> f64 {
        self.total_bytes_read as f64 / (1024. * 1024.)
    }
}

fn kind_index(kind: ErrorKind) -> usize {
    match kind {
        ErrorKind::Connection => 0,
        ErrorKind::Protocol => 1,
        ErrorKind::Timeout => 2,
        ErrorKind::Read => 3,
    }
}
