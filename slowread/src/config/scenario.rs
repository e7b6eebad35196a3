use super::ClientConfig;

/// High level slow read scenarios.
/// Each scenario is a preset of the client load shape.
#[derive(Debug, Clone, Copy, clap::ValueEnum, Default)]
pub enum Scenario {
    /// A few hundred clients reading one byte every 50ms.
    /// Used as the reference run.
    #[default]
    Baseline,

    /// Few clients holding their connection open for a long time
    /// while barely reading anything.
    /// Used to find buffering that grows with send queue size.
    Trickle,

    /// Thousands of clients arriving at once, reading small chunks.
    /// Used to exhaust connection slots and worker pools.
    Stampede,
}

impl Scenario {
    /// Construct the concrete client configuration
    /// associated with this scenario.
    pub fn client_config(self) -> ClientConfig {
        match self {
            Scenario::Baseline => ClientConfig {
                clients: Some(200),
                concurrency: Some(50),
                read_bytes: Some(1),
                sleep: Some(0.05),
                seconds: Some(30.),
                conn_timeout: Some(4.),
            },

            Scenario::Trickle => ClientConfig {
                clients: Some(64),
                concurrency: Some(64),
                read_bytes: Some(1),
                sleep: Some(1.),
                seconds: Some(120.),
                conn_timeout: Some(4.),
            },

            Scenario::Stampede => ClientConfig {
                clients: Some(5_000),
                concurrency: Some(1_000),
                read_bytes: Some(16),
                sleep: Some(0.01),
                seconds: Some(10.),
                conn_timeout: Some(8.),
            },
        }
    }
}
