//! Tracing setup.
//!
//! Headless modes log to stderr. The TUI owns the terminal, so it only logs when a
//! file is given.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub(crate) enum LogSink<'a> {
    Stderr,
    File(&'a Path),
    Off,
}

fn filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("felica_reset=debug,info")
            } else {
                EnvFilter::try_new("felica_reset=info,warn")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

pub(crate) fn init(sink: LogSink<'_>, verbose: bool) -> Result<()> {
    let layer = fmt::layer()
        .with_target(verbose)
        .with_thread_names(verbose)
        .with_line_number(false)
        .with_file(false)
        .compact();

    match sink {
        LogSink::Off => Ok(()),
        LogSink::Stderr => tracing_subscriber::registry()
            .with(filter(verbose))
            .with(layer.with_writer(std::io::stderr))
            .try_init()
            .context("install stderr logger"),
        LogSink::File(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("open log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(filter(verbose))
                .with(layer.with_ansi(false).with_writer(Mutex::new(file)))
                .try_init()
                .context("install file logger")
        }
    }
}
