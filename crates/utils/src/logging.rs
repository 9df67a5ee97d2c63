use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing for one of the engine's process entry points.
///
/// Reads `RUST_LOG` (default `info`) for the fmt layer, and installs a
/// Sentry layer when `SENTRY_DSN` is set so panics and `tracing::error!`
/// spans are reported upstream. Call exactly once per binary.
pub fn init(service_name: &str) -> Option<sentry::ClientInitGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let guard = std::env::var("SENTRY_DSN").ok().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                attach_stacktrace: true,
                ..Default::default()
            },
        ))
    });

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true));

    if guard.is_some() {
        registry.with(sentry_tracing::layer()).init();
    } else {
        registry.init();
    }

    tracing::info!(service = service_name, "logging initialized");
    guard
}
