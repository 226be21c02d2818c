//! Tracing initialization for the CLI and server entry points.

use tracing_subscriber::{
    EnvFilter,
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `dubflow=debug` in verbose mode and
/// `dubflow=info` by default. Safe to call once per process; a second call
/// is a no-op error we swallow so tests can share a process.
pub fn init_tracing(verbose: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("dubflow=debug,info")
            } else {
                EnvFilter::try_new("dubflow=info,warn")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .try_init();
}
