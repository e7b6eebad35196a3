mod human;
mod json;

pub use self::{human::HumanReporter, json::JsonlReporter};

use std::time::Duration;

use crate::config::RunConfig;

use super::{heartbeat::Beat, session::ClientResult, summary::BatchSummary};

/// Sink for everything a batch has to say on stdout.
pub trait Reporter: Send + Sync + 'static {
    fn on_start(&mut self, cfg: &RunConfig);
    fn on_result(&mut self, elapsed: Duration, result: &ClientResult);
    fn on_heartbeat(&mut self, beat: &Beat);
    fn finish(&mut self, cfg: &RunConfig, summary: &BatchSummary);
}
