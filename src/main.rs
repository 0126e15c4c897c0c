pub mod capture;
pub mod config;
pub mod convert;
pub mod dot11;
pub mod error;
pub mod extract;
pub mod handshake;
pub mod hccap;
pub mod registry;

#[cfg(test)]
mod testutil;

use std::{ffi::OsString, path::PathBuf, process::ExitCode};

use clap::Parser;
use config::Config;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

/// Extracts WPA handshakes from 802.11 packet captures into the hccap format.
#[derive(Parser, Debug)]
#[command(about)]
struct Args {
    /// Sets the logging verbosity.
    ///
    /// Can be: `trace`, `debug`, `info`, `warn`, `error`. Per-module directives can also be used,
    /// for example: `info,cap2hccap::extract=trace`.
    #[arg(short = 'L', long, env, default_value = "INFO")]
    log_level: String,
    /// Only keep handshakes of the network with exactly this name.
    ///
    /// The name is compared byte for byte and does not need to be valid UTF-8.
    #[arg(short, long)]
    essid: Option<OsString>,
    /// Write at most this many handshakes.
    #[arg(short, long)]
    max_networks: Option<usize>,
    /// Configuration file path.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Capture files to read, followed by the hccap file to append to.
    #[arg(required = true, num_args = 2.., value_name = "PATH")]
    paths: Vec<PathBuf>,
}

fn main() -> ExitCode {
    // Parse command-line arguments based on the [Args] struct.
    let args = Args::parse();

    // Set up human-readable logging using the `tracing-subcriber` crate.
    tracing_subscriber::fmt()
        .with_env_filter(match EnvFilter::builder().parse(args.log_level) {
            Ok(v) => v,
            Err(err) => {
                eprintln!("Failed to parse log_level argument: {err:?}");
                return ExitCode::FAILURE;
            }
        })
        .init();
    debug!("Debug logging is enabled");

    let file_config = match &args.config {
        Some(path) => match Config::read(path) {
            Ok(v) => v,
            Err(err) => {
                error!("Unable to parse `{}`: {err:?}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => Config::default(),
    };
    let config = file_config.merge(Config {
        essid: args.essid.map(OsString::into_encoded_bytes),
        max_networks: args.max_networks,
    });
    if let Err(err) = config.validate() {
        error!("Invalid arguments: {err}");
        return ExitCode::FAILURE;
    }

    let mut inputs = args.paths;
    let Some(output) = inputs.pop() else {
        return ExitCode::FAILURE;
    };

    let written = convert::run(&inputs, &output, &config);
    if written == 0 {
        error!("unable to find valid handshakes");
        return ExitCode::FAILURE;
    }

    info!("Wrote {written} handshake(s) to `{}`", output.display());
    ExitCode::SUCCESS
}
