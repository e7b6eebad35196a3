use std::time::Duration;

use crate::config::RunConfig;

use super::{Beat, BatchSummary, ClientResult, Reporter};

/// One JSON object per line, for consumption by scripts.
pub struct JsonlReporter {
    emit_events: bool,
}

impl JsonlReporter {
    pub fn new(emit_events: bool) -> Self {
        Self { emit_events }
    }

    fn config_value(cfg: &RunConfig) -> serde_json::Value {
        serde_json::json!({
            "type": "config",
            "host": cfg.host,
            "port": cfg.port,
            "path": cfg.path,
            "clients": cfg.total_clients,
            "concurrency": cfg.concurrency_limit,
            "read_bytes": cfg.read_chunk_size,
            "sleep_ms": cfg.inter_read_delay.as_millis(),
            "seconds": cfg.run_duration.as_secs_f64(),
            "conn_timeout_ms": cfg.connect_timeout.as_millis(),
        })
    }

    fn event_value(elapsed: Duration, result: &ClientResult) -> serde_json::Value {
        serde_json::json!({
            "type": "event",
            "t_ms": elapsed.as_millis(),
            "client_id": result.client_id,
            "ok": result.ok,
            "bytes_read": result.bytes_read,
            "elapsed_seconds": result.elapsed_seconds(),
            "error": (!result.ok).then_some(result.error_message.as_str()),
            "error_kind": result.error_kind.map(|kind| kind.as_str()),
        })
    }

    fn heartbeat_value(beat: &Beat) -> serde_json::Value {
        serde_json::json!({
            "type": "heartbeat",
            "t_ms": beat.elapsed.as_millis(),
            "active": beat.counters.active,
            "started": beat.counters.started,
            "done": beat.counters.done,
            "total": beat.total,
            "peak_active": beat.counters.peak_active,
        })
    }

    fn summary_value(summary: &BatchSummary) -> serde_json::Value {
        let failures: serde_json::Map<String, serde_json::Value> = summary
            .failures_by_kind
            .iter()
            .map(|(kind, count)| (kind.as_str().to_owned(), (*count).into()))
            .collect();

        serde_json::json!({
            "type": "summary",
            "clients": summary.total_clients,
            "collected": summary.collected,
            "ok": summary.ok_count,
            "fail": summary.fail_count,
            "sample_errors": summary.sample_errors,
            "failures": failures,
            "bytes_read_total": summary.total_bytes_read,
            "elapsed_seconds": summary.wall_elapsed.as_secs_f64(),
        })
    }
}

impl Reporter for JsonlReporter {
    fn on_start(&mut self, cfg: &RunConfig) {
        println!("{}", Self::config_value(cfg));
    }

    fn on_result(&mut self, elapsed: Duration, result: &ClientResult) {
        if self.emit_events {
            println!("{}", Self::event_value(elapsed, result));
        }
    }

    fn on_heartbeat(&mut self, beat: &Beat) {
        println!("{}", Self::heartbeat_value(beat));
    }

    fn finish(&mut self, _cfg: &RunConfig, summary: &BatchSummary) {
        println!("{}", Self::summary_value(summary));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::run::session::ErrorKind;

    #[test]
    fn failed_event_carries_error_and_kind() {
        let result = ClientResult::failure(
            4,
            ErrorKind::Timeout,
            "timeout_or_error:deadline has elapsed",
            12,
            Duration::from_secs(44),
        );
        let v = JsonlReporter::event_value(Duration::from_millis(44_500), &result);

        assert_eq!(v["type"], "event");
        assert_eq!(v["t_ms"], 44_500);
        assert_eq!(v["client_id"], 4);
        assert_eq!(v["ok"], false);
        assert_eq!(v["bytes_read"], 12);
        assert_eq!(v["error"], "timeout_or_error:deadline has elapsed");
        assert_eq!(v["error_kind"], "timeout");
    }

    #[test]
    fn ok_event_has_null_error() {
        let result = ClientResult::success(1, 100, Duration::from_secs(2));
        let v = JsonlReporter::event_value(Duration::from_secs(2), &result);
        assert!(v["error"].is_null());
        assert!(v["error_kind"].is_null());
    }

    #[test]
    fn summary_groups_failures_by_kind() {
        let summary = BatchSummary {
            total_clients: 3,
            collected: 3,
            ok_count: 1,
            fail_count: 2,
            total_bytes_read: 9,
            sample_errors: vec!["headers too large".to_owned()],
            failures_by_kind: vec![(ErrorKind::Protocol, 2)],
            wall_elapsed: Duration::from_millis(1_500),
        };
        let v = JsonlReporter::summary_value(&summary);

        assert_eq!(v["ok"], 1);
        assert_eq!(v["fail"], 2);
        assert_eq!(v["failures"]["protocol"], 2);
        assert_eq!(v["sample_errors"][0], "headers too large");
        assert_eq!(v["elapsed_seconds"], 1.5);
    }
}
