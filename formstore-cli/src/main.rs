//! # Formstore
//!
//! Prints `{ "valid", "errors", "values" }` for a record; exits with status 1
//! when the record is invalid.

use std::process::ExitCode;

use clap::Parser;
use formstore_cli::{render, run, CliArgs};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,formstore_core=debug"));

    // Logs go to stderr, the report to stdout.
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    // Use JSON format in production (RUST_LOG_FORMAT=json)
    if std::env::var("RUST_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

fn main() -> anyhow::Result<ExitCode> {
    init_tracing();

    let args = CliArgs::parse();
    let report = run(&args)?;
    println!("{}", render(&report, args.pretty)?);

    Ok(if report.valid {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
