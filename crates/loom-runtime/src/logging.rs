//! Log subscriber setup.
//!
//! Library code only emits `tracing` events; hosts call [`init`] (or
//! [`try_init`]) once to print them. The filter comes from `LOOM_LOG` when
//! set, otherwise from the argument.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Environment variable holding the log filter
pub const LOG_ENV: &str = "LOOM_LOG";

/// Filter used when neither `LOOM_LOG` nor an explicit filter is given
pub const DEFAULT_FILTER: &str = "info";

fn filter(default: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(default.unwrap_or(DEFAULT_FILTER)))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install a stderr fmt subscriber. Panics if one is already installed.
pub fn init(default: Option<&str>) {
    let layer = fmt::layer()
        .compact()
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_filter(filter(default));
    tracing_subscriber::registry().with(layer).init();
}

/// Like [`init`], but returns `false` instead of panicking when a
/// subscriber is already installed.
pub fn try_init(default: Option<&str>) -> bool {
    let layer = fmt::layer()
        .compact()
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_filter(filter(default));
    tracing_subscriber::registry().with(layer).try_init().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_init_twice() {
        try_init(Some("debug"));
        assert!(!try_init(None));
    }
}
