//! Tracing bootstrap.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const DEFAULT_LOG_FILTER: &str = "intake_engine=debug";

/// Install the global subscriber.
///
/// `RUST_LOG` wins, then `override_filter`, then [`DEFAULT_LOG_FILTER`].
/// Calling it twice is harmless; the second install is ignored.
pub fn init_tracing(override_filter: Option<&str>) {
    let fallback = override_filter.unwrap_or(DEFAULT_LOG_FILTER).to_string();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback.into());

    if tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_err()
    {
        tracing::debug!("Tracing subscriber already installed");
    }
}
