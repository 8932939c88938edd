//! Advisory cross-instance lock built on TTL keys

use sluice_core::{error::Result, observe, LogStore};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// TTL for the short lock taken while a backup producer routes a message
pub const ROUTE_LOCK_TTL: Duration = Duration::from_secs(5);

/// Proof of a successful acquisition
///
/// Carries the owner token that release checks against, so a holder whose
/// lease expired can never release a lock someone else has since taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockLease {
    key: String,
    token: String,
}

impl LockLease {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

/// Per-log lock stored as a TTL key
///
/// Acquisition is a single conditional set: no spinning, no retries. A
/// crashed holder is released by TTL expiry only.
#[derive(Clone)]
pub struct DistributedLock {
    store: Arc<dyn LogStore>,
    key: String,
}

impl DistributedLock {
    /// Lock guarding routing and transfer decisions for one log
    pub fn for_stream(store: Arc<dyn LogStore>, stream: &str) -> Self {
        Self::new(store, format!("stream_lock:{}", stream))
    }

    pub fn new(store: Arc<dyn LogStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Try once to take the lock
    ///
    /// Returns `Ok(None)` when another owner holds it.
    pub async fn try_acquire(&self, ttl: Duration) -> Result<Option<LockLease>> {
        let token = Uuid::new_v4().to_string();

        match self.store.set_if_absent(&self.key, &token, ttl).await {
            Ok(true) => {
                observe::record_lock_attempt("acquired");
                Ok(Some(LockLease {
                    key: self.key.clone(),
                    token,
                }))
            }
            Ok(false) => {
                observe::record_lock_attempt("busy");
                Ok(None)
            }
            Err(e) => {
                observe::record_lock_attempt("error");
                Err(e)
            }
        }
    }

    /// Release a lease, only if it is still the current owner
    ///
    /// Returns false when the lease had already expired.
    pub async fn release(&self, lease: &LockLease) -> Result<bool> {
        let released = self.store.delete_if_equals(&lease.key, &lease.token).await?;
        if !released {
            tracing::debug!(key = %lease.key, "Lock lease expired before release");
        }
        Ok(released)
    }
}
