//! Scripted policy authority.
//!
//! Each policy gets a [`Script`] describing how the authority answers for it.
//! Every request is recorded, and the authority tracks how many requests were
//! outstanding at once so tests can check the in-flight bound.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use twinsync_core::{Error, PolicyRef, Result};
use twinsync_reconcile::verify::{PolicyAuthority, PolicyRevision};

/// How the authority answers for one policy.
#[derive(Debug, Clone)]
pub enum Script {
    /// Answer immediately with this revision.
    Revision(u64),
    /// Answer with this revision after a delay (tokio time).
    Delayed(u64, Duration),
    /// Fail with this message.
    Fail(String),
    /// Never answer.
    Hang,
}

/// Policy authority following per-policy scripts.
///
/// Unscripted policies fail with not-found.
#[derive(Debug, Default)]
pub struct ScriptedPolicyAuthority {
    scripts: HashMap<PolicyRef, Script>,
    requests: Mutex<Vec<PolicyRef>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedPolicyAuthority {
    /// Creates an authority with no scripts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the answer for `policy_ref`.
    #[must_use]
    pub fn with(mut self, policy_ref: PolicyRef, script: Script) -> Self {
        self.scripts.insert(policy_ref, script);
        self
    }

    /// Shorthand for an immediate revision answer.
    #[must_use]
    pub fn with_revision(self, policy_ref: PolicyRef, revision: u64) -> Self {
        self.with(policy_ref, Script::Revision(revision))
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<PolicyRef> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of requests received so far.
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Highest number of concurrently outstanding requests observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PolicyAuthority for ScriptedPolicyAuthority {
    async fn current_revision(&self, policy_ref: &PolicyRef) -> Result<PolicyRevision> {
        self.requests.lock().unwrap().push(policy_ref.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let answer = |current_revision| PolicyRevision {
            policy_ref: policy_ref.clone(),
            current_revision,
        };

        match self.scripts.get(policy_ref) {
            Some(Script::Revision(revision)) => Ok(answer(*revision)),
            Some(Script::Delayed(revision, delay)) => {
                tokio::time::sleep(*delay).await;
                Ok(answer(*revision))
            }
            Some(Script::Fail(message)) => Err(Error::Internal {
                message: message.clone(),
            }),
            Some(Script::Hang) => std::future::pending().await,
            None => Err(Error::not_found("policy", policy_ref)),
        }
    }
}
