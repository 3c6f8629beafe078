//! Optional tracing bootstrap for hosts without their own subscriber.
//!
//! The library itself only emits `tracing` events; installing a
//! subscriber is the host's job. This helper covers examples and ad-hoc
//! debugging: filter from `WEFT_LOG` (falling back to `error`), compact
//! output to stderr.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const ENV_FILTER_VAR: &str = "WEFT_LOG";

/// Install a global subscriber; a second call is a no-op.
pub fn init() {
    let filter = EnvFilter::try_from_env(ENV_FILTER_VAR)
        .unwrap_or_else(|_| EnvFilter::new("error"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr),
        )
        .try_init();
}
