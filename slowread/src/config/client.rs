/// Client side load shape.
/// This models how many slow readers exist and how slowly each of them reads.
///
/// Every property is optional so it can overwrite a [`Scenario`](super::Scenario) preset.
#[derive(Debug, Clone, clap::Args, Default)]
pub struct ClientConfig {
    /// Total amount of simulated clients.
    #[arg(long, value_name = "N")]
    pub clients: Option<usize>,

    /// Maximum number of clients connected at the same time.
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Amount of bytes read per paced read.
    #[arg(long, value_name = "BYTES")]
    pub read_bytes: Option<usize>,

    /// Pause between two reads of the same client.
    #[arg(long, value_name = "SECONDS")]
    pub sleep: Option<f64>,

    /// How long each client keeps reading the body.
    #[arg(long, value_name = "SECONDS")]
    pub seconds: Option<f64>,

    /// Connect timeout, also added as grace to the per client deadline.
    #[arg(long, value_name = "SECONDS")]
    pub conn_timeout: Option<f64>,
}
