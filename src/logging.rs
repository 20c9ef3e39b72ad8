use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Environment variable holding the log filter, e.g. `K3S_DEPLOY_LOG=debug`.
pub const LOG_ENV: &str = "K3S_DEPLOY_LOG";

/// Initializes `tracing` logging with options from the environment variable
/// given in the `env` parameter.
///
/// Without the variable the maximum level is INFO, or DEBUG when `verbose`.
/// Log lines go to stderr so command output on stdout stays clean.
pub fn initialize_logging(env: &str, verbose: bool) {
    let default_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let filter = match EnvFilter::try_from_env(env) {
        Ok(env_filter) => env_filter,
        _ => EnvFilter::new(default_level.to_string()),
    };

    let fmt = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    let registry = Registry::default().with(filter).with(fmt);

    // A second initialization (tests) keeps the first subscriber
    let _ = registry.try_init();
}
