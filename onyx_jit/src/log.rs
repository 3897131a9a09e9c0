//! Logging setup for the JIT.
//!
//! The JIT logs through `tracing`. At initialization the subscriber is
//! pointed either at stderr or, when `jit-log-file` is configured, at a
//! file (with `{pid}` in the path replaced by the process id). Failing to
//! open the log file falls back to stderr; it never aborts startup.

use std::fs::File;
use std::sync::Mutex;

use tracing::warn;
use tracing_subscriber::filter::LevelFilter;

use crate::config::expand_pid_marker;

/// Install the global subscriber.
///
/// Safe to call more than once; only the first installation wins, which
/// matters for embedders that initialize, finalize and re-initialize.
pub fn init(log_file: Option<&str>, debug: bool) {
    let level = if debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let mut open_error = None;
    if let Some(path) = log_file {
        let path = expand_pid_marker(path);
        match File::create(&path) {
            Ok(file) => {
                let _ = tracing_subscriber::fmt()
                    .with_max_level(level)
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .try_init();
                return;
            }
            Err(err) => open_error = Some((path, err)),
        }
    }

    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();

    if let Some((path, err)) = open_error {
        warn!(path = %path, error = %err, "couldn't open log file, logging to stderr");
    }
}
