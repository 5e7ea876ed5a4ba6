use crate::config::LOG_ENV;
use std::env;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Installs the stderr subscriber for the binary.
///
/// The filter comes from `UNPACK_LOG` (default `warn`); `verbose` forces `debug`.
/// A second call is a no-op.
pub fn init_logger(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        let directives = env::var(LOG_ENV).unwrap_or_else(|_| "warn".to_string());
        EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time()
                .with_ansi(false),
        )
        .with(filter)
        .try_init();
}
