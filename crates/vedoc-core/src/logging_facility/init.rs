//! Logging initialization module

use std::sync::Once;
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter};

/// Logging profile configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Human-readable output for development
    Development,
    /// JSON structured output for production
    Production,
    /// Test capture mode for deterministic testing
    Test,
}

static INIT_ONCE: Once = Once::new();

/// Initialize the logging facility
///
/// Call once at application startup. The `RUST_LOG` environment variable
/// overrides the profile's default filter.
///
/// # Profiles
///
/// - **Development**: Human-readable logs, `vedoc_core=debug`
/// - **Production**: JSON structured logs, `vedoc_core=info`
/// - **Test**: Bare registry; use `init_test_capture()` to collect events
pub fn init(profile: Profile) {
    INIT_ONCE.call_once(|| match profile {
        Profile::Development => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| EnvFilter::new("vedoc_core=debug")),
                )
                .init();
        }
        Profile::Production => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(
                    EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| EnvFilter::new("vedoc_core=info")),
                )
                .init();
        }
        Profile::Test => {
            // try_init: a capture subscriber may already be installed
            let _ = tracing_subscriber::registry().try_init();
        }
    });
}
