use std::{sync::Arc, time::Duration};

use rama::telemetry::tracing::{self, Instrument as _};
use tokio::{task::AbortHandle, time::Instant};

use crate::config::RunConfig;

use super::{
    counters::SharedCounters,
    gate::{ConcurrencyGate, GatePermit},
    session::{self, ClientResult, ErrorKind},
};

/// Everything a client task shares with the rest of the batch.
#[derive(Debug, Clone)]
pub struct ClientContext {
    pub cfg: Arc<RunConfig>,
    pub gate: ConcurrencyGate,
    pub counters: SharedCounters,
}

/// Admit, supervise and account for a single client.
///
/// Returns `None` when the client was never admitted because the gate got closed.
pub async fn run_client(client_id: usize, ctx: ClientContext) -> Option<ClientResult> {
    let deadline = ctx.cfg.supervisory_timeout();
    let cfg = ctx.cfg.clone();
    supervise(client_id, &ctx, deadline, async move {
        session::run(client_id, &cfg).await
    })
    .await
}

async fn supervise<F>(
    client_id: usize,
    ctx: &ClientContext,
    deadline: Duration,
    session: F,
) -> Option<ClientResult>
where
    F: Future<Output = ClientResult> + Send + 'static,
{
    let permit = ctx.gate.acquire().await?;
    let _admitted = Admitted::new(ctx.counters.clone(), permit);

    let start = Instant::now();
    let session = tokio::spawn(session.instrument(tracing::debug_span!("client", client_id)));
    let _session_guard = AbortOnDrop(session.abort_handle());

    let result = match tokio::time::timeout(deadline, session).await {
        Ok(Ok(result)) => result,
        Ok(Err(err)) => {
            tracing::error!(client_id, "client session task failed: {err}");
            ClientResult::failure(
                client_id,
                ErrorKind::Timeout,
                format!("timeout_or_error:{err}"),
                0,
                start.elapsed(),
            )
        }
        Err(err) => {
            tracing::debug!(client_id, ?deadline, "client session exceeded supervisory timeout");
            ClientResult::failure(
                client_id,
                ErrorKind::Timeout,
                format!("timeout_or_error:{err}"),
                0,
                start.elapsed(),
            )
        }
    };

    Some(result)
}

/// Counts a client as active for as long as it lives.
///
/// On drop the counters are updated first and only then is the permit released.
struct Admitted {
    counters: SharedCounters,
    _permit: GatePermit,
}

impl Admitted {
    fn new(counters: SharedCounters, permit: GatePermit) -> Self {
        counters.start();
        Self {
            counters,
            _permit: permit,
        }
    }
}

impl Drop for Admitted {
    fn drop(&mut self) {
        self.counters.finish();
    }
}

/// Aborting drops the session future, which closes its socket.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}
