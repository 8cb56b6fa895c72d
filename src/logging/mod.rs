//! Process-wide tracing setup: stdout output plus a daily-rotated file
//! sink, via `tracing-subscriber` and `tracing-appender` (§2's "ambient
//! stack"). Always headless -- this binary has no interactive surface.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes the global subscriber. Returns a `WorkerGuard` that must be
/// held for the process lifetime -- dropping it stops the file appender's
/// background flush thread.
///
/// Precedence: `RUST_LOG` env var > `debug` flag from settings > `info`.
pub fn init(debug: bool, log_dir: Option<&std::path::Path>) -> WorkerGuard {
    let default_filter = if debug { "elastic_ilm=debug" } else { "elastic_ilm=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    let log_dir = log_dir.unwrap_or_else(|| std::path::Path::new("logs"));
    let file_appender = tracing_appender::rolling::daily(log_dir, "elastic-ilm.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    guard
}
