use std::time::Duration;

use crate::config::RunConfig;

use super::{Beat, BatchSummary, ClientResult, Reporter};

/// Plain progress lines, one per heartbeat, and a short summary at the end.
#[derive(Debug, Default)]
pub struct HumanReporter;

impl HumanReporter {
    pub fn new() -> Self {
        Self
    }

    pub(super) fn heartbeat_line(beat: &Beat) -> String {
        format!(
            "[{:6.1}s] active={} started={}/{} done={}/{}",
            beat.elapsed.as_secs_f64(),
            beat.counters.active,
            beat.counters.started,
            beat.total,
            beat.counters.done,
            beat.total,
        )
    }

    pub(super) fn summary_lines(cfg: &RunConfig, summary: &BatchSummary) -> Vec<String> {
        let mut lines = vec![
            format!(
                "clients: {} concurrency: {}",
                summary.total_clients, cfg.concurrency_limit
            ),
            format!("ok: {} fail: {}", summary.ok_count, summary.fail_count),
        ];

        if summary.fail_count > 0 {
            lines.push(format!("sample_errors: {:?}", summary.sample_errors));

            let missing = summary.total_clients.saturating_sub(summary.collected);
            let mut kinds: Vec<_> = summary
                .failures_by_kind
                .iter()
                .map(|(kind, count)| format!("{kind}={count}"))
                .collect();
            if missing > 0 {
                kinds.push(format!("not_reported={missing}"));
            }
            if !kinds.is_empty() {
                lines.push(format!("failures: {}", kinds.join(" ")));
            }
        }

        lines.push(format!(
            "bytes_read_total: {} ({:.2} MiB)",
            summary.total_bytes_read,
            summary.total_mib(),
        ));
        lines.push(format!("elapsed: {:.2}s", summary.wall_elapsed.as_secs_f64()));

        lines
    }
}

impl Reporter for HumanReporter {
    fn on_start(&mut self, cfg: &RunConfig) {
        println!(
            "slow reading http://{}:{}{} with {} clients ({} at a time)",
            cfg.host, cfg.port, cfg.path, cfg.total_clients, cfg.concurrency_limit,
        );
    }

    fn on_result(&mut self, _elapsed: Duration, _result: &ClientResult) {}

    fn on_heartbeat(&mut self, beat: &Beat) {
        println!("{}", Self::heartbeat_line(beat));
    }

    fn finish(&mut self, cfg: &RunConfig, summary: &BatchSummary) {
        for line in Self::summary_lines(cfg, summary) {
            println!("{line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::run::{counters::CounterSnapshot, session::ErrorKind};
    use crate::utils::test::test_config;

    #[test]
    fn heartbeat_line_format() {
        let beat = Beat {
            elapsed: Duration::from_millis(3_000),
            total: 10,
            counters: CounterSnapshot {
                active: 5,
                started: 8,
                done: 3,
                peak_active: 5,
            },
        };
        assert_eq!(
            HumanReporter::heartbeat_line(&beat),
            "[   3.0s] active=5 started=8/10 done=3/10"
        );
    }

    #[test]
    fn summary_without_failures_has_no_samples() {
        let mut cfg = test_config(8000, Duration::from_secs(2));
        cfg.concurrency_limit = 5;

        let summary = BatchSummary {
            total_clients: 10,
            collected: 10,
            ok_count: 10,
            fail_count: 0,
            total_bytes_read: 3 * 1024 * 1024,
            sample_errors: vec![],
            failures_by_kind: vec![],
            wall_elapsed: Duration::from_millis(2_041),
        };

        assert_eq!(
            HumanReporter::summary_lines(&cfg, &summary),
            vec![
                "clients: 10 concurrency: 5",
                "ok: 10 fail: 0",
                "bytes_read_total: 3145728 (3.00 MiB)",
                "elapsed: 2.04s",
            ]
        );
    }

    #[test]
    fn summary_with_failures_lists_samples_and_kinds() {
        let cfg = test_config(8000, Duration::from_secs(2));

        let summary = BatchSummary {
            total_clients: 4,
            collected: 3,
            ok_count: 1,
            fail_count: 3,
            total_bytes_read: 10,
            sample_errors: vec!["HTTP/1.1 404 Not Found".to_owned()],
            failures_by_kind: vec![(ErrorKind::Protocol, 2)],
            wall_elapsed: Duration::from_secs(1),
        };

        let lines = HumanReporter::summary_lines(&cfg, &summary);
        assert_eq!(lines[2], r#"sample_errors: ["HTTP/1.1 404 Not Found"]"#);
        assert_eq!(lines[3], "failures: protocol=2 not_reported=1");
    }
}
