//! Cross-module scenario tests.
//!
//! Unit tests live next to their modules; the tests here exercise the
//! dispatcher, coordinator and store together, plus the HTTP endpoints over
//! a real local server.


/// Install a test subscriber so scenario failures come with logs attached
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}
