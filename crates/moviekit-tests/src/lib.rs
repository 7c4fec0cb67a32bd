//! Integration test crate for moviekit.
//!
//! This crate exists solely to hold cross-crate integration tests.
//! It depends on moviekit-core and moviekit-media to verify the full
//! write/read pipeline against the raw container backend.

/// Install a `RUST_LOG`-driven subscriber once per test binary so session
/// logging is visible when a test fails.
#[cfg(test)]
fn init_logging() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

#[cfg(test)]
mod pipeline;

#[cfg(test)]
mod seeking;

#[cfg(test)]
mod sessions;
