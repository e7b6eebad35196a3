use std::sync::Arc;

use rama::{error::OpaqueError, graceful::ShutdownGuard, telemetry::tracing};

use clap::Args;
use tokio::{task::JoinSet, time::Instant};

use crate::config::{ClientConfig, RunConfig, Scenario};

pub mod counters;
pub mod gate;
pub mod heartbeat;
pub mod reporter;
pub mod runner;
pub mod session;
pub mod summary;

use self::{
    counters::SharedCounters,
    gate::ConcurrencyGate,
    heartbeat::{HEARTBEAT_INTERVAL, Heartbeat},
    reporter::{HumanReporter, JsonlReporter, Reporter},
    runner::ClientContext,
    summary::{BatchSummary, ResultAggregator},
};

#[derive(Debug, Clone, Args)]
/// run a batch of slow reading clients against a streaming server
pub struct RunCommand {
    /// target server host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// target server port
    #[arg(long, default_value_t = 8000)]
    port: u16,

    /// resource path to GET
    #[arg(long, required = true)]
    path: String,

    /// report json lines instead of a human-friendly format
    #[arg(long, default_value_t = false)]
    json: bool,

    /// when reporting json, also emit one line per client result
    #[arg(long, default_value_t = false, requires = "json")]
    events: bool,

    #[clap(flatten)]
    config: Option<ClientConfig>,

    #[arg(long)]
    /// Scenario to run,
    /// manually defined parameters overwrite scenario parameters.
    scenario: Option<Scenario>,
}

pub async fn exec(guard: ShutdownGuard, args: RunCommand) -> Result<(), OpaqueError> {
    let merged_cfg = merge_client_cfg(args.scenario, args.config);
    let cfg = Arc::new(RunConfig::try_new(
        args.host,
        args.port,
        args.path,
        &merged_cfg,
    )?);

    tracing::info!(
        host = %cfg.host,
        port = %cfg.port,
        path = %cfg.path,
        clients = %cfg.total_clients,
        concurrency = %cfg.concurrency_limit,
        read_bytes = %cfg.read_chunk_size,
        sleep = ?cfg.inter_read_delay,
        seconds = ?cfg.run_duration,
        conn_timeout = ?cfg.connect_timeout,
        supervisory_timeout = ?cfg.supervisory_timeout(),
        "slow read config ready",
    );
    if cfg.concurrency_limit > cfg.total_clients {
        tracing::warn!(
            "concurrency ({}) exceeds clients ({}): at most {} clients will be active",
            cfg.concurrency_limit,
            cfg.total_clients,
            cfg.effective_concurrency(),
        );
    }

    let reporter: Box<dyn Reporter> = if args.json {
        Box::new(JsonlReporter::new(args.events))
    } else {
        Box::new(HumanReporter::new())
    };

    let cancelled = guard.clone_weak().into_cancelled();
    let summary = run_batch(cfg, reporter, cancelled).await;

    tracing::debug!(
        ok = summary.ok_count,
        fail = summary.fail_count,
        bytes = summary.total_bytes_read,
        "batch finished",
    );
    Ok(())
}

/// Run every client of the batch and report on it.
///
/// Client failures end up in the summary, they never fail the batch.
/// Once `cancelled` resolves no new client is admitted,
/// running ones are aborted and the partial summary is reported.
pub async fn run_batch<F>(
    cfg: Arc<RunConfig>,
    mut reporter: Box<dyn Reporter>,
    cancelled: F,
) -> BatchSummary
where
    F: Future,
{
    reporter.on_start(&cfg);

    let start = Instant::now();
    let ctx = ClientContext {
        cfg: cfg.clone(),
        gate: ConcurrencyGate::new(cfg.effective_concurrency()),
        counters: SharedCounters::new(),
    };

    tracing::debug!(
        clients = cfg.total_clients,
        admission_ceiling = ctx.gate.limit(),
        "spawn client tasks",
    );

    let mut clients = JoinSet::new();
    for client_id in 0..cfg.total_clients {
        clients.spawn(runner::run_client(client_id, ctx.clone()));
    }

    let mut aggregator = ResultAggregator::new(cfg.total_clients);
    let mut heartbeat = Heartbeat::new(
        ctx.counters.clone(),
        cfg.total_clients,
        start,
        HEARTBEAT_INTERVAL,
    );
    let mut heartbeat_done = false;

    let mut cancelled = std::pin::pin!(cancelled);

    while !clients.is_empty() {
        tokio::select! {
            _ = cancelled.as_mut() => {
                tracing::warn!(
                    collected = aggregator.collected(),
                    "shutdown requested: abort remaining clients",
                );
                ctx.gate.close();
                clients.abort_all();
                break;
            }

            beat = heartbeat.tick(), if !heartbeat_done => {
                reporter.on_heartbeat(&beat);
                heartbeat_done = beat.is_final();
            }

            Some(joined) = clients.join_next() => {
                match joined {
                    Ok(Some(result)) => {
                        let at = start.elapsed();
                        reporter.on_result(at, &result);
                        aggregator.push(&result, at);
                    }
                    Ok(None) => {
                        tracing::debug!("client was never admitted");
                    }
                    Err(err) => {
                        tracing::error!("client task failed: {err}");
                    }
                }
            }
        }
    }

    if !heartbeat_done {
        reporter.on_heartbeat(&heartbeat.beat());
    }

    if !aggregator.is_complete() {
        tracing::warn!(
            "{} of {} clients did not report a result",
            cfg.total_clients - aggregator.collected(),
            cfg.total_clients,
        );
    }

    let summary = aggregator.summarize();
    reporter.finish(&cfg, &summary);
    summary
}

fn merge_client_cfg(scenario: Option<Scenario>, config: Option<ClientConfig>) -> ClientConfig {
    let scenario_cfg = scenario
        .map(|s| {
            tracing::info!("use scenario to define base config: {s:?}");
            s.client_config()
        })
        .unwrap_or_else(|| {
            tracing::debug!("no scenario defined, use baseline as base config");
            Scenario::default().client_config()
        });

    let overwrite_cfg = config.unwrap_or_default();

    macro_rules! merge_config {
        ($scenario:ident, $overwrite:ident, {$($property:ident),+ $(,)?}) => {
            ClientConfig {
                $(
                    $property: if let Some(value) = $overwrite.$property {
                        tracing::debug!("property '{}': use overwrite: {value}", stringify!($property));
                        Some(value)
                    } else if let Some(value) = $scenario.$property {
                        tracing::debug!("property '{}': use scenario: {value}", stringify!($property));
                        Some(value)
                    } else {
                        tracing::debug!("property '{}': undefined", stringify!($property));
                        None
                    },
                )+
            }
        };
    }

    merge_config!(
        scenario_cfg, overwrite_cfg,
        {
            clients,
            concurrency,
            read_bytes,
            sleep,
            seconds,
            conn_timeout,
        }
    )
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use parking_lot::Mutex;

    use rama::telemetry::tracing;
    use tracing_test::traced_test;

    use super::{
        counters::CounterSnapshot, heartbeat::Beat, session::ClientResult, *,
    };
    use crate::utils::test::{AcceptLoop, test_config};

    /// Keeps everything it is told, for inspection after the batch.
    #[derive(Clone, Default)]
    struct RecordingReporter {
        log: Arc<Mutex<Recorded>>,
    }

    #[derive(Default)]
    struct Recorded {
        results: Vec<ClientResult>,
        beats: Vec<Beat>,
        finished: Option<BatchSummary>,
    }

    impl Reporter for RecordingReporter {
        fn on_start(&mut self, _cfg: &RunConfig) {}

        fn on_result(&mut self, _elapsed: Duration, result: &ClientResult) {
            self.log.lock().results.push(result.clone());
        }

        fn on_heartbeat(&mut self, beat: &Beat) {
            self.log.lock().beats.push(*beat);
        }

        fn finish(&mut self, _cfg: &RunConfig, summary: &BatchSummary) {
            self.log.lock().finished = Some(summary.clone());
        }
    }

    fn batch_config(port: u16, clients: usize, concurrency: usize, seconds: f64) -> RunConfig {
        let mut cfg = test_config(port, Duration::from_secs_f64(seconds));
        cfg.total_clients = clients;
        cfg.concurrency_limit = concurrency;
        cfg.inter_read_delay = Duration::from_millis(5);
        cfg
    }

    fn assert_counters_consistent(beats: &[Beat], clients: usize, concurrency: usize) {
        let mut last_done = 0;
        for beat in beats {
            let CounterSnapshot {
                active,
                started,
                done,
                peak_active,
            } = beat.counters;
            assert!(active <= concurrency, "{beat:?}");
            assert!(peak_active <= concurrency, "{beat:?}");
            assert!(started >= active, "{beat:?}");
            assert!(done <= started, "{beat:?}");
            assert!(done >= last_done, "{beat:?}");
            last_done = done;
        }
        let last = beats.last().expect("at least one heartbeat");
        assert_eq!(last.counters.done, clients);
        assert!(last.is_final());
        assert_eq!(beats.iter().filter(|b| b.is_final()).count(), 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn every_client_reports_exactly_once() {
        const CLIENTS: usize = 10;
        const CONCURRENCY: usize = 5;
        const BODY: usize = 500;

        let server = AcceptLoop::spawn_static_body(BODY).await;
        let cfg = Arc::new(batch_config(server.port(), CLIENTS, CONCURRENCY, 5.));

        let reporter = RecordingReporter::default();
        let summary = run_batch(
            cfg,
            Box::new(reporter.clone()),
            std::future::pending::<()>(),
        )
        .await;

        let log = reporter.log.lock();

        let mut ids: Vec<_> = log.results.iter().map(|r| r.client_id).collect();
        ids.sort_unstable();
        assert_eq!(ids, (0..CLIENTS).collect::<Vec<_>>());

        assert_eq!(summary.ok_count, CLIENTS);
        assert_eq!(summary.fail_count, 0);
        assert_eq!(summary.total_bytes_read, (CLIENTS * BODY) as u64);
        assert_eq!(
            summary.total_bytes_read,
            log.results.iter().map(|r| r.bytes_read).sum::<u64>()
        );
        assert_eq!(log.finished.as_ref(), Some(&summary));

        assert_counters_consistent(&log.beats, CLIENTS, CONCURRENCY);
        assert!(logs_contain("session finished"));
    }

    #[tokio::test]
    async fn admission_ceiling_holds_while_clients_read() {
        const CLIENTS: usize = 12;
        const CONCURRENCY: usize = 3;

        // endless body, clients stop on their read window
        let server = AcceptLoop::spawn(|mut conn| async move {
            conn.read_request().await;
            if !conn.try_write(b"HTTP/1.1 200 OK\r\n\r\n").await {
                return;
            }
            while conn.try_write(&[b'#'; 64]).await {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;

        let cfg = Arc::new(batch_config(server.port(), CLIENTS, CONCURRENCY, 0.4));
        let reporter = RecordingReporter::default();
        let summary = run_batch(
            cfg,
            Box::new(reporter.clone()),
            std::future::pending::<()>(),
        )
        .await;

        assert_eq!(summary.ok_count, CLIENTS);
        // 4 waves of 0.4s
        assert!(summary.wall_elapsed >= Duration::from_millis(1_600));

        let log = reporter.log.lock();
        assert_counters_consistent(&log.beats, CLIENTS, CONCURRENCY);
        let peak = log.beats.last().unwrap().counters.peak_active;
        assert!(peak <= CONCURRENCY);
        assert!(peak > 0);
    }

    #[tokio::test]
    async fn serial_batch_takes_the_sum_of_read_windows() {
        let server = AcceptLoop::spawn(|mut conn| async move {
            conn.read_request().await;
            if conn.try_write(b"HTTP/1.1 200 OK\r\n\r\n").await {
                conn.wait_for_close().await;
            }
        })
        .await;

        let cfg = Arc::new(batch_config(server.port(), 4, 1, 0.25));
        let summary = run_batch(
            cfg,
            Box::new(RecordingReporter::default()),
            std::future::pending::<()>(),
        )
        .await;

        assert_eq!(summary.ok_count, 4);
        assert!(summary.wall_elapsed >= Duration::from_millis(4 * 250));
    }

    #[tokio::test]
    async fn failures_are_data_not_batch_errors() {
        let server = AcceptLoop::spawn(|mut conn| async move {
            conn.read_request().await;
            let _ = conn
                .try_write(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n")
                .await;
        })
        .await;

        let cfg = Arc::new(batch_config(server.port(), 6, 2, 1.));
        let summary = run_batch(
            cfg,
            Box::new(RecordingReporter::default()),
            std::future::pending::<()>(),
        )
        .await;

        assert_eq!(summary.collected, 6);
        assert_eq!(summary.ok_count, 0);
        assert_eq!(summary.fail_count, 6);
        assert_eq!(summary.sample_errors, vec!["HTTP/1.1 404 Not Found"; 5]);
        assert_eq!(
            summary.failures_by_kind,
            vec![(session::ErrorKind::Protocol, 6)]
        );
    }

    #[tokio::test]
    async fn cancellation_reports_a_partial_summary() {
        let server = AcceptLoop::spawn(|mut conn| async move {
            conn.read_request().await;
            if conn.try_write(b"HTTP/1.1 200 OK\r\n\r\n").await {
                conn.wait_for_close().await;
            }
        })
        .await;

        let cfg = Arc::new(batch_config(server.port(), 8, 2, 30.));
        let reporter = RecordingReporter::default();
        let summary = tokio::time::timeout(
            Duration::from_secs(5),
            run_batch(
                cfg,
                Box::new(reporter.clone()),
                tokio::time::sleep(Duration::from_millis(200)),
            ),
        )
        .await
        .expect("cancelled batch to return promptly");

        assert_eq!(summary.collected, 0);
        assert_eq!(summary.fail_count, 8);
        assert!(reporter.log.lock().finished.is_some());
    }

    #[test]
    fn overwrites_win_over_scenario() {
        let merged = merge_client_cfg(
            Some(Scenario::Trickle),
            Some(ClientConfig {
                clients: Some(3),
                sleep: Some(0.2),
                ..Default::default()
            }),
        );

        let trickle = Scenario::Trickle.client_config();
        assert_eq!(merged.clients, Some(3));
        assert_eq!(merged.sleep, Some(0.2));
        assert_eq!(merged.concurrency, trickle.concurrency);
        assert_eq!(merged.seconds, trickle.seconds);
    }

    #[test]
    fn no_scenario_means_cli_defaults() {
        let merged = merge_client_cfg(None, None);
        let cfg = RunConfig::try_new("127.0.0.1", 8000, "/stream.ts", &merged).unwrap();
        assert_eq!(cfg.total_clients, 200);
        assert_eq!(cfg.concurrency_limit, 50);
        assert_eq!(cfg.read_chunk_size, 1);
        assert_eq!(cfg.inter_read_delay, Duration::from_millis(50));
        assert_eq!(cfg.run_duration, Duration::from_secs(30));
        assert_eq!(cfg.connect_timeout, Duration::from_secs(4));
    }
}
