use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Admission control for client sessions.
///
/// At most `limit` [`GatePermit`]s exist at any point in time.
/// Dropping a permit releases it.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    permits: Arc<Semaphore>,
    limit: usize,
}

#[derive(Debug)]
pub struct GatePermit(#[allow(dead_code)] OwnedSemaphorePermit);

impl ConcurrencyGate {
    pub fn new(limit: usize) -> Self {
        let limit = limit.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            permits: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    /// Wait until a permit is free.
    ///
    /// Returns `None` only once the gate is closed.
    pub async fn acquire(&self) -> Option<GatePermit> {
        self.permits.clone().acquire_owned().await.ok().map(GatePermit)
    }

    /// Stop admitting; pending and future `acquire` calls return `None`.
    pub fn close(&self) {
        self.permits.close();
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    #[cfg(test)]
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}
