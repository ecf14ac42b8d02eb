//! Observability infrastructure for twinsync.
//!
//! Structured logging with consistent spans: every pass runs inside a
//! [`pass_span`], every policy round trip inside a [`verification_span`].

use std::sync::Once;

use chrono::{DateTime, Utc};
use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::id::{PassId, PolicyRef};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

impl LogFormat {
    /// Reads the format from `TWINSYNC_LOG_FORMAT` (`json` or anything else for pretty).
    #[must_use]
    pub fn from_env() -> Self {
        match std::env::var("TWINSYNC_LOG_FORMAT") {
            Ok(value) if value.trim().eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times;
/// subsequent calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Controls log levels (e.g., `info`, `twinsync_reconcile=debug`)
///
/// # Example
///
/// ```rust
/// use twinsync_core::observability::{init_logging, LogFormat};
///
/// init_logging(LogFormat::Pretty);
/// ```
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        // try_init: a test harness may already own the global subscriber.
        let _ = match format {
            LogFormat::Json => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .try_init(),
            LogFormat::Pretty => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .try_init(),
        };
    });
}

/// Creates the span a reconciliation pass runs in.
///
/// # Example
///
/// ```rust
/// use chrono::Utc;
/// use twinsync_core::id::PassId;
/// use twinsync_core::observability::pass_span;
///
/// let span = pass_span(&PassId::generate(), Utc::now());
/// let _guard = span.enter();
/// ```
#[must_use]
pub fn pass_span(pass_id: &PassId, reference_time: DateTime<Utc>) -> Span {
    tracing::info_span!(
        "background_sync",
        pass_id = %pass_id,
        reference_time = %reference_time.to_rfc3339(),
    )
}

/// Creates the span for one policy revision round trip.
#[must_use]
pub fn verification_span(policy_ref: &PolicyRef) -> Span {
    tracing::debug_span!("verify_policy_revision", policy_ref = %policy_ref)
}
