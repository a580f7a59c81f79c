//! Logging integration for the grove framework.
//!
//! Provides helpers for configuring [`tracing`]-based logging from an
//! application's log level and environment name, and for creating
//! per-request spans.

/// Sets up the global tracing subscriber.
///
/// `level` is an [`EnvFilter`](tracing_subscriber::EnvFilter) directive such
/// as `"debug"` or `"grove_app=trace,info"`; an unparsable directive falls back
/// to `info`. In the `development` environment a pretty, human-readable format
/// is used; everywhere else a structured JSON format is used.
///
/// Installing a second subscriber is a no-op, so this is safe to call from
/// several applications in one process.
pub fn setup_logging(level: &str, env: &str) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    if env == "development" {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(true)
            .with_line_number(true)
            .pretty()
            .try_init()
            .ok();
    } else {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .try_init()
            .ok();
    }
}

/// Creates a tracing span for an HTTP request.
///
/// # Examples
///
/// ```
/// use grove_core::logging::request_span;
///
/// let span = request_span("abc-123", "GET", "/users");
/// let _guard = span.enter();
/// tracing::info!("handling request");
/// ```
pub fn request_span(request_id: &str, method: &str, path: &str) -> tracing::Span {
    tracing::info_span!("request", id = request_id, method, path)
}
