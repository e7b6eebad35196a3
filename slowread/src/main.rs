use std::{path::PathBuf, sync::Arc, time::Duration};

use rama::{
    error::{BoxError, OpaqueError},
    graceful,
    telemetry::tracing,
};

#[cfg(target_family = "unix")]
use rama::error::ErrorContext as _;

use clap::{Parser, Subcommand};

pub mod cmd;
pub mod config;
pub mod utils;

#[cfg(target_family = "unix")]
#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

#[cfg(target_os = "windows")]
#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// CLI arguments for configuring slowread behavior.
#[derive(Debug, Clone, Parser)]
#[command(name = "slowread")]
#[command(bin_name = "slowread")]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    cmds: CliCommands,

    /// debug logging as default instead of Info; use RUST_LOG env for more options
    #[arg(long, short = 'v', default_value_t = false, global = true)]
    pub verbose: bool,

    /// enable pretty logging (format for humans)
    #[arg(long, default_value_t = false, global = true)]
    pub pretty: bool,

    /// write the tracing output to the provided (log) file instead of stderr
    #[arg(long, short = 'o', global = true)]
    pub output: Option<PathBuf>,

    /// directory in which data will be stored on the filesystem
    #[arg(long, default_value = ".slowread", global = true)]
    pub data: PathBuf,

    #[arg(long, value_name = "SECONDS", default_value_t = 0., global = true)]
    /// the graceful shutdown timeout (<= 0.0 = no timeout)
    pub graceful: f64,

    #[cfg(target_family = "unix")]
    /// Set the limit of max open file descriptors for this process and its children.
    #[arg(long, value_name = "N", default_value_t = 262_144, global = true)]
    pub ulimit: self::utils::os::rlim_t,
}

#[derive(Debug, Clone, Subcommand)]
enum CliCommands {
    Run(self::cmd::run::RunCommand),
    Mock(self::cmd::mock::MockCommand),
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let args = Args::parse();

    self::utils::telemetry::init_tracing(&args)?;

    #[cfg(target_family = "unix")]
    self::utils::os::raise_nofile(args.ulimit).context("set file descriptor limit")?;

    let base_shutdown_signal = graceful::default_signal();
    if let Err(err) = run_with_args(base_shutdown_signal, args).await {
        eprintln!("🚩 exit with error: {err}");
        std::process::exit(1);
    }

    Ok(())
}

/// run a slowread cmd with the given args
async fn run_with_args<F>(base_shutdown_signal: F, args: Args) -> Result<(), BoxError>
where
    F: Future<Output: Send + 'static> + Send + 'static,
{
    let graceful_timeout = (args.graceful > 0.).then(|| Duration::from_secs_f64(args.graceful));

    let (error_tx, error_rx) = tokio::sync::oneshot::channel::<OpaqueError>();
    let fatal_error = Arc::new(parking_lot::Mutex::new(None));
    let graceful = graceful::Shutdown::new(new_shutdown_signal(
        error_rx,
        fatal_error.clone(),
        base_shutdown_signal,
    ));

    graceful.spawn_task_fn(async move |guard| {
        let result = match args.cmds {
            CliCommands::Run(run_args) => self::cmd::run::exec(guard, run_args).await,
            CliCommands::Mock(mock_args) => {
                self::cmd::mock::exec(args.data, guard, mock_args).await
            }
        };
        if let Err(err) = result {
            let _ = error_tx.send(err);
        }
    });

    let delay = match graceful_timeout {
        Some(duration) => graceful.shutdown_with_limit(duration).await?,
        None => graceful.shutdown().await,
    };

    tracing::debug!("gracefully shutdown with a delay of: {delay:?}");

    match fatal_error.lock().take() {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

fn new_shutdown_signal(
    error_rx: tokio::sync::oneshot::Receiver<OpaqueError>,
    fatal_error: Arc<parking_lot::Mutex<Option<OpaqueError>>>,
    base_shutdown_signal: impl Future<Output: Send + 'static> + Send + 'static,
) -> impl Future + Send + 'static {
    async move {
        tokio::select! {
            _ = base_shutdown_signal => {
                tracing::debug!("default signal triggered: init graceful shutdown");
            }
            result = error_rx => {
                match result {
                    Ok(err) => {
                        tracing::error!("fatal err received: {err}; abort");
                        *fatal_error.lock() = Some(err);
                    },
                    Err(_) => {
                        tracing::debug!("command is finished without error, return control");
                    },
                }
            }
        }
    }
}
