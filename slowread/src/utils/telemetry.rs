use std::io::IsTerminal as _;

use rama::{
    error::{BoxError, ErrorContext as _},
    telemetry::tracing::{
        self,
        subscriber::{EnvFilter, fmt::writer::BoxMakeWriter},
    },
};

use crate::Args;

/// Configures structured logging.
///
/// Without `RUST_LOG` only this crate logs at INFO (DEBUG with `--verbose`),
/// dependencies such as the rama http stack of the mock server at WARN.
/// `RUST_LOG` replaces that default entirely,
/// e.g. `RUST_LOG=slowread=trace` to follow every session step.
///
/// Logs go to stderr (or the `--output` file) so that the progress
/// and summary lines on stdout stay machine readable.
pub fn init_tracing(args: &Args) -> Result<(), BoxError> {
    let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(_) => EnvFilter::builder().from_env_lossy(),
        Err(_) => EnvFilter::builder()
            .parse(default_directives(args.verbose))
            .context("parse default log directives")?,
    };

    let make_writer = match args.output.as_deref() {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .append(true)
                .create(true)
                .open(path)
                .with_context(|| format!("open log file at '{}'", path.display()))?;

            BoxMakeWriter::new(file)
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let subscriber = tracing::subscriber::fmt()
        .with_ansi(args.output.is_none() && std::io::stderr().is_terminal())
        .with_env_filter(filter)
        .with_writer(make_writer);

    if args.pretty {
        subscriber.pretty().try_init()?;
    } else {
        subscriber.try_init()?;
    }

    tracing::debug!(
        version = crate::utils::env::server_identifier(),
        "tracing is set up"
    );
    Ok(())
}

fn default_directives(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    format!("warn,{}={level}", env!("CARGO_CRATE_NAME"))
}
