//! lr - static file server with live reload.
//!
//! Serves a directory over HTTP and reloads connected browsers whenever an
//! HTML, CSS, JavaScript or JSON file in it changes.

mod error;
mod output;
mod serve;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use error::CliError;
use output::Output;
use serve::ServeArgs;

/// Default log filter when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "lr=info,lr_server=info";

/// Log filter for `--verbose`.
const VERBOSE_FILTER: &str = "lr=debug,lr_server=debug,tower_http=debug";

/// lr - static file server with live reload.
#[derive(Parser)]
#[command(name = "lr", version, about)]
struct Cli {
    #[command(flatten)]
    serve: ServeArgs,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            // --help and --version are not failures
            std::process::exit(i32::from(err.use_stderr()));
        }
    };
    let output = Output::new();

    // --verbose wins over RUST_LOG
    let filter = if cli.serve.verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let result = tokio::runtime::Runtime::new()
        .map_err(CliError::Runtime)
        .and_then(|rt| rt.block_on(cli.serve.execute()));

    if let Err(err) = result {
        output.error(&format!("Error: {err}"));
        std::process::exit(1);
    }
}
