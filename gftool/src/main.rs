mod application;
mod presentation {
    pub mod cli;
}

use application::progress::Bars;
use clap::Parser;
use gft_core::{ErrorKind, GftError, Session, Verbosity};
use presentation::cli::Cli;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

fn verbosity(cli: &Cli) -> Verbosity {
    if cli.quiet {
        Verbosity::Quiet
    } else if cli.verbose {
        Verbosity::Verbose
    } else {
        Verbosity::Normal
    }
}

/// `RUST_LOG` wins over the flags.
fn init_logging(verbosity: Verbosity) {
    let level = match verbosity {
        Verbosity::Quiet => "error",
        Verbosity::Normal => "info",
        Verbosity::Verbose => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn exit_code(err: &GftError) -> ExitCode {
    let code = match err.kind() {
        ErrorKind::InvalidRequest => 2,
        ErrorKind::UnsupportedFeature => 3,
        ErrorKind::NotFound => 4,
        ErrorKind::CorruptContainer => 5,
        ErrorKind::AuthenticationFailed => 6,
        ErrorKind::IoFailure => 7,
        ErrorKind::ChecksumMismatch => 8,
    };
    ExitCode::from(code)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let verbosity = verbosity(&cli);
    init_logging(verbosity);

    let bars = Bars::new(verbosity == Verbosity::Quiet);
    let session = Session::new(verbosity, &bars);

    match application::run(cli, &session) {
        Ok(code) => code,
        Err(err) => {
            debug!(kind = ?err.kind(), "command failed");
            eprintln!("error: {err}");
            exit_code(&err)
        }
    }
}
