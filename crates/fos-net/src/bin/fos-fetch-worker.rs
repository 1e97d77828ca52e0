//! Sync fetch worker
//!
//! Reads one request as JSON from stdin, performs it, and prints the JSON
//! result to stdout. Logs go to stderr (`FOS_LOG`, default `warn`).

use std::io::{self, Read, Write};
use std::process::ExitCode;

use fos_net::{HttpClient, HttpFetcher, worker};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_env("FOS_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let mut input = String::new();
    if let Err(err) = io::stdin().read_to_string(&mut input) {
        tracing::error!("Failed to read request: {}", err);
        return ExitCode::FAILURE;
    }

    let fetcher = match HttpClient::builder().build() {
        Ok(client) => HttpFetcher::new(client),
        Err(err) => {
            tracing::error!("Failed to build HTTP client: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let output = worker::run(&input, &fetcher);
    let mut stdout = io::stdout().lock();
    if stdout.write_all(output.as_bytes()).and_then(|_| stdout.flush()).is_err() {
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
