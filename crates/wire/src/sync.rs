// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Forward-and-correlate request matching.
//!
//! An RPC forwarded to a peer gets its reply on a different message, matched
//! back by request id. [`RequestSync`] owns the pending map; each entry is a
//! oneshot completed by the reply or failed by the per-entry timeout. The map
//! is actor-local, so no locking.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::oneshot;

/// Outcome of awaiting a correlated reply.
#[derive(Debug, PartialEq, Eq)]
pub enum SyncError {
    /// No reply arrived within the timeout. The dead entry stays in the
    /// map until the next [`RequestSync::prune`].
    Timeout,
    /// The helper dropped the entry (shutdown or explicit cancel).
    Canceled,
}

/// Pending-reply map keyed by request id.
pub struct RequestSync<T> {
    pending: HashMap<String, oneshot::Sender<T>>,
    timeout: Duration,
}

impl<T: Send + 'static> RequestSync<T> {
    pub fn new(timeout: Duration) -> Self {
        Self { pending: HashMap::new(), timeout }
    }

    /// Register a pending request. The returned future resolves with the
    /// matched reply, or [`SyncError::Timeout`] after the helper's timeout.
    /// A second registration under the same id replaces (cancels) the first.
    pub fn register(
        &mut self,
        request_id: impl Into<String>,
    ) -> impl std::future::Future<Output = Result<T, SyncError>> {
        let request_id = request_id.into();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(request_id, tx);
        let timeout = self.timeout;
        async move {
            match tokio::time::timeout(timeout, rx).await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(_)) => Err(SyncError::Canceled),
                Err(_) => Err(SyncError::Timeout),
            }
        }
    }

    /// Complete a pending request. Returns false when no entry matched
    /// (late or unknown reply, dropped on the floor).
    pub fn complete(&mut self, request_id: &str, value: T) -> bool {
        match self.pending.remove(request_id) {
            Some(tx) => tx.send(value).is_ok(),
            None => false,
        }
    }

    /// Drop a pending entry, failing its future with [`SyncError::Canceled`].
    pub fn cancel(&mut self, request_id: &str) {
        self.pending.remove(request_id);
    }

    /// Remove entries whose awaiting futures have gone away.
    pub fn prune(&mut self) {
        self.pending.retain(|_, tx| !tx.is_closed());
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
#[path = "sync_tests.rs"]
mod tests;
