mod client;
mod run;
mod scenario;

pub use self::{client::ClientConfig, run::RunConfig, scenario::Scenario};
