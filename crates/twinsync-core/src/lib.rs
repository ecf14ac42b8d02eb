//! # twinsync-core
//!
//! Core primitives shared by the twinsync reconciliation components.
//!
//! This crate provides the foundational types used across the workspace:
//!
//! - **Identifiers**: Validated `EntityId` / `PolicyRef` join keys and per-pass `PassId`s
//! - **Metadata**: The per-feed observation record compared by the reconciler
//! - **Error Types**: Shared error definitions returned by feeds and authorities
//! - **Observability**: Logging initialisation and span constructors
//!
//! ## Crate Boundary
//!
//! `twinsync-core` holds no reconciliation logic. Storage drivers that produce
//! metadata feeds and services that answer policy revision queries depend only
//! on this crate.
//!
//! ## Example
//!
//! ```rust
//! use twinsync_core::prelude::*;
//!
//! let record = Metadata::new(EntityId::new("org.acme:pump-7").unwrap(), 3)
//!     .with_policy(PolicyRef::new("org.acme:pumps").unwrap(), 1);
//!
//! assert_eq!(record.policy_revision(), Some(1));
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod id;
pub mod metadata;
pub mod observability;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use twinsync_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::id::{EntityId, PassId, PolicyRef};
    pub use crate::metadata::Metadata;
}

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use id::{EntityId, PassId, PolicyRef};
pub use metadata::Metadata;
pub use observability::{LogFormat, init_logging};
