//! Tracing subscriber initialization for Waypoint host applications.
//!
//! # Usage
//!
//! ```no_run
//! waypoint_observe::tracing_setup::init_tracing().unwrap();
//! ```

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// Installs a structured `fmt` layer with target visibility and span close
/// timing, filtered by `RUST_LOG` (`EnvFilter::from_default_env()`, defaulting
/// to `info` when unset). No OpenTelemetry bridging: this engine has no
/// concrete downstream calls worth exporting as distributed traces, only the
/// dispatcher interface (see `waypoint_engine::dispatcher`); a host that does
/// want OTel export can layer it on top of the same `tracing::Subscriber`.
///
/// # Errors
///
/// Returns an error if a global subscriber has already been installed.
pub fn init_tracing() -> Result<(), Box<dyn std::error::Error>> {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
