//! Instrumentor.
//!
//! Instrumentor is a development web server for JavaScript test pages. It serves the scripts of
//! a directory tree in instrumented form, so that a test run in the browser can collect
//! coverage, and serves everything else as plain static files. Instrumented scripts are cached
//! in memory and instrumented again as soon as they change on disk.

#![warn(missing_debug_implementations, clippy::all)]

mod cli;
mod endpoints;
mod healthcheck;
mod logging;
mod server;

fn main() {
    match cli::execute() {
        Ok(()) => std::process::exit(0),
        Err(error) => {
            logging::ensure_log_error(&error);
            std::process::exit(1);
        }
    }
}
