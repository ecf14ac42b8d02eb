//! Shared test utilities for twinsync integration tests.
//!
//! This crate provides:
//! - Fixture builders for metadata records pinned to a fixed reference time
//! - [`ScriptedPolicyAuthority`]: a policy authority with per-policy delays,
//!   failures and hangs, recording every request and peak concurrency
//! - [`FailingFeed`] and [`CountingFeed`]: feeds for error and backpressure tests
//! - Custom assertion helpers
//!
//! # Example
//!
//! ```rust,ignore
//! use twinsync_test_utils::{entity, recent, sync_with, test_config, ScriptedPolicyAuthority};
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let sync = sync_with(ScriptedPolicyAuthority::new(), test_config());
//!     // ... run a pass ...
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
// Test utilities use expect/unwrap for cleaner test code - panics are acceptable in tests
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc)]

pub mod assertions;
pub mod authority;
pub mod feeds;
pub mod fixtures;

pub use assertions::*;
pub use authority::*;
pub use feeds::*;
pub use fixtures::*;

/// Initialize test logging (call once per test module).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("twinsync_reconcile=debug".parse().expect("valid directive")),
        )
        .with_test_writer()
        .try_init();
}
