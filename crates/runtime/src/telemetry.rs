use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use pv_domain::config::LoggingConfig;

/// Install the global subscriber. `RUST_LOG` wins over the configured
/// filter. Returns `false` if a subscriber was already installed.
pub fn init_tracing(logging: &LoggingConfig) -> bool {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(&logging.filter).unwrap_or_else(|e| {
            eprintln!("WARNING: invalid log filter {:?}: {e}, using \"info\"", logging.filter);
            EnvFilter::new("info")
        })
    });

    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = if logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer().pretty()).try_init()
    };
    installed.is_ok()
}
