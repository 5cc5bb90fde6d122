// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-instance state machines with store-mediated ownership.
//!
//! Every lifecycle transition is a CAS transaction on the instance key,
//! guarded by the mod-revision last read. Three outcomes: applied (version
//! bumps by one, callbacks fire), wrong-version with the same owner
//! (reconcile against the store), or wrong-version with a new owner
//! (relinquish — the instance has moved).
//!
//! Saves for one instance queue behind each other; every await re-looks the
//! machine up by id and exits early when it has been deleted in the
//! meantime.

use fm_core::{InstanceInfo, InstanceState};
use fm_store::{keys, DeleteOptions, MetaStore, PutOptions, TxnCompare, TxnOp};
use fm_wire::RouteInfo;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Errors from state machine operations.
#[derive(Debug, Error)]
pub enum StateMachineError {
    #[error("instance {0} not found in control view")]
    NotFound(String),
    #[error(transparent)]
    Invalid(#[from] fm_core::TransitionError),
    #[error("meta store error: {0}")]
    Store(String),
}

/// How a save resolved against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// CAS applied; local version advanced by exactly one.
    Applied,
    /// The store already showed the target state under this owner; the
    /// write was someone else's identical intent (idempotent success).
    AlreadyApplied,
    /// Same owner but the store moved on; local state rolled back to it.
    RolledBack { store_state: InstanceState },
    /// Another local owns the record now; ownership relinquished.
    Relinquished { new_owner: String },
}

struct Machine {
    info: InstanceInfo,
    owned: bool,
    cancel: CancellationToken,
    save_lock: Arc<tokio::sync::Mutex<()>>,
    callbacks: Vec<(HashSet<InstanceState>, oneshot::Sender<InstanceInfo>)>,
}

impl Machine {
    fn new(info: InstanceInfo, owned: bool) -> Self {
        Self {
            info,
            owned,
            cancel: CancellationToken::new(),
            save_lock: Arc::new(tokio::sync::Mutex::new(())),
            callbacks: Vec::new(),
        }
    }

    fn fire_callbacks(&mut self) {
        let state = self.info.state();
        let mut remaining = Vec::with_capacity(self.callbacks.len());
        for (states, tx) in self.callbacks.drain(..) {
            if states.contains(&state) {
                let _ = tx.send(self.info.clone());
            } else if !tx.is_closed() {
                remaining.push((states, tx));
            }
        }
        self.callbacks = remaining;
    }
}

/// The control view: instance id → state machine.
///
/// Cheap to clone; clones share the map. Locking is internal and never held
/// across awaits.
#[derive(Clone)]
pub struct InstanceControlView {
    node_id: String,
    store: Arc<dyn MetaStore>,
    machines: Arc<Mutex<HashMap<String, Machine>>>,
}

impl InstanceControlView {
    pub fn new(node_id: impl Into<String>, store: Arc<dyn MetaStore>) -> Self {
        Self {
            node_id: node_id.into(),
            store,
            machines: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Track a new instance. Ownership is claimed when the record's proxy
    /// field is empty or already names this local.
    pub fn insert(&self, info: InstanceInfo) {
        let owned = info.function_proxy_id.is_empty() || info.function_proxy_id == self.node_id;
        let id = info.instance_id.clone();
        self.machines.lock().insert(id, Machine::new(info, owned));
    }

    pub fn contains(&self, instance_id: &str) -> bool {
        self.machines.lock().contains_key(instance_id)
    }

    pub fn get(&self, instance_id: &str) -> Option<InstanceInfo> {
        self.machines.lock().get(instance_id).map(|m| m.info.clone())
    }

    pub fn state(&self, instance_id: &str) -> Option<InstanceState> {
        self.machines.lock().get(instance_id).map(|m| m.info.state())
    }

    /// A machine is owned only while it both believes so and the last
    /// successful CAS named this local as the proxy.
    pub fn owns(&self, instance_id: &str) -> bool {
        self.machines
            .lock()
            .get(instance_id)
            .is_some_and(|m| m.owned && m.info.function_proxy_id == self.node_id)
    }

    /// The one-shot cancel signal for an instance's in-flight pipeline.
    pub fn cancel_token(&self, instance_id: &str) -> Option<CancellationToken> {
        self.machines.lock().get(instance_id).map(|m| m.cancel.clone())
    }

    /// Cancel whatever pipeline is running for the instance.
    pub fn cancel(&self, instance_id: &str) {
        if let Some(m) = self.machines.lock().get(instance_id) {
            m.cancel.cancel();
        }
    }

    /// Subscribe a one-shot listener for the instance reaching any of the
    /// given states. Fires immediately when it is already there.
    pub fn subscribe(
        &self,
        instance_id: &str,
        states: HashSet<InstanceState>,
    ) -> Option<oneshot::Receiver<InstanceInfo>> {
        let mut machines = self.machines.lock();
        let machine = machines.get_mut(instance_id)?;
        let (tx, rx) = oneshot::channel();
        if states.contains(&machine.info.state()) {
            let _ = tx.send(machine.info.clone());
        } else {
            machine.callbacks.push((states, tx));
        }
        Some(rx)
    }

    /// Drop the machine. Pending saves notice the absence and exit early.
    pub fn remove(&self, instance_id: &str) -> Option<InstanceInfo> {
        self.machines.lock().remove(instance_id).map(|m| m.info)
    }

    /// All tracked records (admin queries).
    pub fn instances(&self) -> Vec<InstanceInfo> {
        self.machines.lock().values().map(|m| m.info.clone()).collect()
    }

    /// Records currently waiting in the scheduling stages.
    pub fn scheduling_queue(&self) -> Vec<InstanceInfo> {
        self.machines
            .lock()
            .values()
            .filter(|m| {
                matches!(m.info.state(), InstanceState::New | InstanceState::Scheduling)
            })
            .map(|m| m.info.clone())
            .collect()
    }

    /// Apply a lifecycle transition and persist it with CAS.
    ///
    /// `mutate` edits the candidate record (owner, agent, error status)
    /// before the write; version and state are managed here.
    pub async fn transition(
        &self,
        instance_id: &str,
        target: InstanceState,
        mutate: impl FnOnce(&mut InstanceInfo),
    ) -> Result<SaveOutcome, StateMachineError> {
        // Stage 1: legality check and save-queue entry.
        let save_lock = {
            let machines = self.machines.lock();
            let machine = machines
                .get(instance_id)
                .ok_or_else(|| StateMachineError::NotFound(instance_id.to_string()))?;
            let from = machine.info.state();
            if !from.can_transition(target) {
                return Err(fm_core::TransitionError { from, to: target }.into());
            }
            machine.save_lock.clone()
        };
        let _guard = save_lock.lock().await;

        // Stage 2: the machine may have changed (or died) while queued.
        let (candidate, expected, key) = {
            let machines = self.machines.lock();
            let machine = machines
                .get(instance_id)
                .ok_or_else(|| StateMachineError::NotFound(instance_id.to_string()))?;
            let from = machine.info.state();
            if !from.can_transition(target) {
                return Err(fm_core::TransitionError { from, to: target }.into());
            }
            let mut candidate = machine.info.clone();
            mutate(&mut candidate);
            candidate.status.state = target;
            candidate.version += 1;
            let expected = machine.info.mod_revision;
            let key = keys::instance_key(
                &candidate.function,
                &candidate.instance_id,
                &candidate.request_id,
            );
            (candidate, expected, key)
        };
        let bytes =
            serde_json::to_vec(&candidate).map_err(|e| StateMachineError::Store(e.to_string()))?;

        let txn = self
            .store
            .txn(
                vec![TxnCompare::ModRevisionEq { key: key.clone(), revision: expected }],
                vec![TxnOp::Put { key: key.clone(), value: bytes }],
                vec![TxnOp::Get { key: key.clone() }],
            )
            .await
            .map_err(|e| StateMachineError::Store(e.to_string()))?;

        // Stage 3: fold the outcome back into the machine, which may have
        // been deleted while the transaction was in flight.
        let mut machines = self.machines.lock();
        let machine = machines
            .get_mut(instance_id)
            .ok_or_else(|| StateMachineError::NotFound(instance_id.to_string()))?;

        if txn.succeeded {
            let mut applied = candidate;
            applied.mod_revision = txn.mod_revision;
            debug!(
                instance_id,
                version = applied.version,
                state = %target,
                "instance transition applied"
            );
            machine.info = applied;
            machine.owned = machine.info.function_proxy_id == self.node_id;
            machine.fire_callbacks();
            return Ok(SaveOutcome::Applied);
        }

        let Some(kv) = txn.kvs.into_iter().next() else {
            // The record is gone entirely; someone exited the instance.
            info!(instance_id, "record vanished during save, relinquishing");
            machine.owned = false;
            machine.info.version = 0;
            machine.info.function_proxy_id.clear();
            return Ok(SaveOutcome::Relinquished { new_owner: String::new() });
        };
        let mut stored: InstanceInfo = serde_json::from_slice(&kv.value)
            .map_err(|e| StateMachineError::Store(e.to_string()))?;
        stored.mod_revision = kv.mod_revision;

        if stored.function_proxy_id == self.node_id {
            if stored.status.state == target {
                info!(instance_id, state = %target, "store already shows the target state");
                machine.info = stored;
                machine.fire_callbacks();
                Ok(SaveOutcome::AlreadyApplied)
            } else {
                let store_state = stored.status.state;
                warn!(
                    instance_id,
                    wanted = %target,
                    store = %store_state,
                    "save lost the race, rolling back to store"
                );
                machine.info = stored;
                Ok(SaveOutcome::RolledBack { store_state })
            }
        } else {
            let new_owner = stored.function_proxy_id.clone();
            info!(instance_id, new_owner, "instance has moved, relinquishing ownership");
            machine.owned = false;
            machine.info.version = 0;
            machine.info.function_proxy_id.clear();
            Ok(SaveOutcome::Relinquished { new_owner })
        }
    }

    /// Publish the compact route record for remote lookup.
    pub async fn persist_route(&self, info: &InstanceInfo) -> Result<(), StateMachineError> {
        let route = RouteInfo {
            instance_id: info.instance_id.clone(),
            function_proxy_id: info.function_proxy_id.clone(),
            runtime_address: info.runtime_address.clone(),
        };
        let bytes =
            serde_json::to_vec(&route).map_err(|e| StateMachineError::Store(e.to_string()))?;
        self.store
            .put(&keys::route_key(&info.instance_id), bytes, PutOptions::default())
            .await
            .map(|_| ())
            .map_err(|e| StateMachineError::Store(e.to_string()))
    }

    /// Remove the instance record and its route from the store.
    pub async fn delete_record(&self, info: &InstanceInfo) -> Result<(), StateMachineError> {
        let key = keys::instance_key(&info.function, &info.instance_id, &info.request_id);
        self.store
            .delete(&key, DeleteOptions::default())
            .await
            .map_err(|e| StateMachineError::Store(e.to_string()))?;
        self.store
            .delete(&keys::route_key(&info.instance_id), DeleteOptions::default())
            .await
            .map_err(|e| StateMachineError::Store(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "machine_tests.rs"]
mod tests;
