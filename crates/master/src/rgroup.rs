// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource group gang scheduling.
//!
//! Creating a group persists it pending, then asks the root domain's group
//! controller to place every bundle at once. The gang RPC retries until the
//! root domain is reachable or a queued delete cancels it. Bundles whose
//! local goes abnormal return to pending and are re-gang-scheduled one at a
//! time until placed.

use crate::config::MasterConfig;
use crate::domain_mgr::DomainMgrHandle;
use crate::global::{GlobalSchedHandle, LocalChange, LocalExitKind};
use crate::leader::{LeaderInfo, Role};
use crate::local_mgr::LocalMgrHandle;
use fm_core::{BundleState, ErrCode, ResourceGroup, ResourceGroupState};
use fm_store::{keys, DeleteOptions, GetOptions, MetaStore, PutOptions};
use fm_wire::{
    CreateResourceGroupRequest, CreateResourceGroupResponse, GroupScheduleRequest,
    GroupScheduleResponse, QueryResourceGroupRequest, QueryResourceGroupResponse,
    RemoveBundleRequest,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

type GroupKey = (String, String); // (tenant, name)

enum Msg {
    Create {
        req: CreateResourceGroupRequest,
        reply: oneshot::Sender<CreateResourceGroupResponse>,
    },
    Delete {
        tenant_id: String,
        name: String,
        reply: oneshot::Sender<(ErrCode, String)>,
    },
    Query {
        req: QueryResourceGroupRequest,
        reply: oneshot::Sender<QueryResourceGroupResponse>,
    },
    UpdateLeaderInfo(LeaderInfo),
    LocalAbnormal {
        proxy_id: String,
    },
    GangDone {
        key: GroupKey,
        outcome: Result<GroupScheduleResponse, String>,
    },
    ReschedDone {
        key: GroupKey,
        results: BTreeMap<String, String>,
    },
    RetryReschedule {
        key: GroupKey,
    },
    Sync,
}

/// Handle to the resource group manager actor.
#[derive(Clone)]
pub struct ResourceGroupHandle {
    tx: mpsc::Sender<Msg>,
}

impl ResourceGroupHandle {
    /// Create and gang-schedule a group. Resolves when every bundle is
    /// placed, the request fails, or a delete cancels it.
    pub async fn create(&self, req: CreateResourceGroupRequest) -> CreateResourceGroupResponse {
        let request_id = req.request_id.clone();
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Msg::Create { req, reply }).await.is_err() {
            return CreateResourceGroupResponse {
                request_id,
                code: ErrCode::InnerSystemError,
                message: "resource group manager stopped".to_string(),
            };
        }
        rx.await.unwrap_or(CreateResourceGroupResponse {
            request_id,
            code: ErrCode::InnerSystemError,
            message: "resource group manager dropped reply".to_string(),
        })
    }

    /// Delete a group, releasing its reservations. Queued while a gang
    /// schedule is in flight.
    pub async fn delete(
        &self,
        tenant_id: impl Into<String>,
        name: impl Into<String>,
    ) -> (ErrCode, String) {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(Msg::Delete { tenant_id: tenant_id.into(), name: name.into(), reply })
            .await
            .is_err()
        {
            return (ErrCode::InnerSystemError, "resource group manager stopped".to_string());
        }
        rx.await
            .unwrap_or((ErrCode::InnerSystemError, "resource group manager dropped reply".to_string()))
    }

    pub async fn query(&self, req: QueryResourceGroupRequest) -> QueryResourceGroupResponse {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Msg::Query { req, reply }).await.is_err() {
            return QueryResourceGroupResponse {
                code: ErrCode::InnerSystemError,
                ..Default::default()
            };
        }
        rx.await.unwrap_or(QueryResourceGroupResponse {
            code: ErrCode::InnerSystemError,
            ..Default::default()
        })
    }

    pub async fn update_leader_info(&self, leader: LeaderInfo) {
        let _ = self.tx.send(Msg::UpdateLeaderInfo(leader)).await;
    }

    /// Re-read every group from the store (master acquisition).
    pub async fn sync(&self) {
        let _ = self.tx.send(Msg::Sync).await;
    }
}

struct PendingCreate {
    reply: oneshot::Sender<CreateResourceGroupResponse>,
    request_id: String,
    cancel: CancellationToken,
    /// Delete that arrived mid-schedule, to run once the gang resolves.
    queued_delete: Option<oneshot::Sender<(ErrCode, String)>>,
}

/// The resource group manager actor.
pub struct ResourceGroupManager {
    rx: mpsc::Receiver<Msg>,
    self_tx: mpsc::Sender<Msg>,
    config: MasterConfig,
    store: Arc<dyn MetaStore>,
    global: GlobalSchedHandle,
    domain_mgr: DomainMgrHandle,
    local_mgr: LocalMgrHandle,
    role: Role,
    groups: HashMap<GroupKey, ResourceGroup>,
    creating: HashMap<GroupKey, PendingCreate>,
    rescheduling: HashSet<GroupKey>,
}

impl ResourceGroupManager {
    pub fn spawn(
        config: MasterConfig,
        store: Arc<dyn MetaStore>,
        global: GlobalSchedHandle,
        domain_mgr: DomainMgrHandle,
        local_mgr: LocalMgrHandle,
        local_changes: mpsc::UnboundedReceiver<LocalChange>,
    ) -> ResourceGroupHandle {
        let (tx, rx) = mpsc::channel(256);
        let actor = Self {
            rx,
            self_tx: tx.clone(),
            config,
            store,
            global,
            domain_mgr,
            local_mgr,
            role: Role::Master,
            groups: HashMap::new(),
            creating: HashMap::new(),
            rescheduling: HashSet::new(),
        };
        tokio::spawn(actor.run(local_changes));
        ResourceGroupHandle { tx }
    }

    async fn run(mut self, mut local_changes: mpsc::UnboundedReceiver<LocalChange>) {
        self.sync_from_store().await;
        loop {
            tokio::select! {
                msg = self.rx.recv() => match msg {
                    Some(msg) => self.handle(msg).await,
                    None => break,
                },
                Some(change) = local_changes.recv() => {
                    if let LocalChange::Removed { name, kind: LocalExitKind::Abnormal } = change {
                        self.on_local_abnormal(name).await;
                    }
                }
            }
        }
    }

    async fn handle(&mut self, msg: Msg) {
        match msg {
            Msg::Create { req, reply } => self.create(req, reply).await,
            Msg::Delete { tenant_id, name, reply } => self.delete(tenant_id, name, reply).await,
            Msg::Query { req, reply } => {
                let _ = reply.send(self.query(req));
            }
            Msg::UpdateLeaderInfo(leader) => {
                let new_role = Role::from_leader(&self.config.node_id, &leader);
                let became_master = new_role.is_master() && !self.role.is_master();
                self.role = new_role;
                if became_master {
                    self.sync_from_store().await;
                }
            }
            Msg::LocalAbnormal { proxy_id } => self.on_local_abnormal(proxy_id).await,
            Msg::GangDone { key, outcome } => self.on_gang_done(key, outcome).await,
            Msg::ReschedDone { key, results } => self.on_resched_done(key, results).await,
            Msg::RetryReschedule { key } => self.kick_reschedule(key),
            Msg::Sync => self.sync_from_store().await,
        }
    }

    // ── Create ──────────────────────────────────────────────────────────

    async fn create(
        &mut self,
        req: CreateResourceGroupRequest,
        reply: oneshot::Sender<CreateResourceGroupResponse>,
    ) {
        let respond = |code: ErrCode, message: String| CreateResourceGroupResponse {
            request_id: req.request_id.clone(),
            code,
            message,
        };
        if !self.role.is_master() {
            let (code, message) = self.role.refusal();
            let _ = reply.send(respond(code, message));
            return;
        }
        if req.name.is_empty() || req.bundles.is_empty() {
            let _ = reply.send(respond(
                ErrCode::ParamInvalid,
                "resource group needs a name and at least one bundle".to_string(),
            ));
            return;
        }
        let key = (req.tenant_id.clone(), req.name.clone());
        if self.groups.contains_key(&key) || self.creating.contains_key(&key) {
            let _ = reply.send(respond(
                ErrCode::InstanceDuplicated,
                format!("resource group {} already exists", req.name),
            ));
            return;
        }

        let group = ResourceGroup::assemble(
            req.name.clone(),
            req.tenant_id.clone(),
            req.owner.clone(),
            req.priority,
            req.policy,
            req.request_id.clone(),
            req.bundles.clone(),
        );
        if let Err(e) = self.persist(&group).await {
            let _ = reply.send(respond(ErrCode::EtcdOperationError, e));
            return;
        }
        info!(group = req.name, tenant = req.tenant_id, "resource group persisted, gang scheduling");
        self.groups.insert(key.clone(), group.clone());

        let cancel = CancellationToken::new();
        self.creating.insert(
            key.clone(),
            PendingCreate {
                reply,
                request_id: req.request_id.clone(),
                cancel: cancel.clone(),
                queued_delete: None,
            },
        );
        self.spawn_gang_schedule(key, group, cancel);
    }

    /// Gang-schedule in the background, retrying until the root domain is
    /// reachable or the token cancels. The outcome returns as a message.
    fn spawn_gang_schedule(&self, key: GroupKey, group: ResourceGroup, cancel: CancellationToken) {
        let global = self.global.clone();
        let domain_mgr = self.domain_mgr.clone();
        let self_tx = self.self_tx.clone();
        let timeout = Duration::from_millis(self.config.group_timeout_ms);
        let retry = Duration::from_millis(self.config.reschedule_interval_ms);
        tokio::spawn(async move {
            let request_id = group.request_id.clone();
            let outcome = loop {
                if cancel.is_cancelled() {
                    break Err("canceled".to_string());
                }
                let Some(root) = global.root_domain_info().await else {
                    warn!(group = group.name, "no root domain for gang schedule, retrying");
                    tokio::select! {
                        _ = cancel.cancelled() => break Err("canceled".to_string()),
                        _ = tokio::time::sleep(retry) => continue,
                    }
                };
                let call = domain_mgr.group_schedule(
                    &root.address,
                    GroupScheduleRequest { request_id: request_id.clone(), group: group.clone() },
                );
                match tokio::time::timeout(timeout, call).await {
                    Ok(Ok(resp)) => break Ok(resp),
                    Ok(Err(e)) => {
                        warn!(group = group.name, error = %e, "gang schedule failed, retrying");
                    }
                    Err(_) => {
                        warn!(group = group.name, "gang schedule timed out, retrying");
                    }
                }
                tokio::select! {
                    _ = cancel.cancelled() => break Err("canceled".to_string()),
                    _ = tokio::time::sleep(retry) => {}
                }
            };
            let _ = self_tx.send(Msg::GangDone { key, outcome }).await;
        });
    }

    async fn on_gang_done(&mut self, key: GroupKey, outcome: Result<GroupScheduleResponse, String>) {
        let Some(pending) = self.creating.remove(&key) else {
            return;
        };
        // A delete that arrived mid-schedule wins over the gang result (the
        // group is torn down before it ever becomes CREATED).
        if let Some(delete_reply) = pending.queued_delete {
            info!(group = key.1, "executing delete queued during scheduling");
            self.teardown(&key).await;
            let _ = pending.reply.send(CreateResourceGroupResponse {
                request_id: pending.request_id,
                code: ErrCode::ScheduleCanceled,
                message: "resource group deleted during scheduling".to_string(),
            });
            let _ = delete_reply.send((ErrCode::None, String::new()));
            return;
        }
        match outcome {
            Ok(resp) if resp.code.is_ok() => {
                let complete = {
                    let Some(group) = self.groups.get_mut(&key) else { return };
                    let all_placed = group
                        .bundles
                        .iter()
                        .all(|b| resp.schedule_results.contains_key(&b.bundle_id));
                    if all_placed {
                        for bundle in &mut group.bundles {
                            if let Some(node) = resp.schedule_results.get(&bundle.bundle_id) {
                                bundle.function_proxy_id = node.clone();
                                bundle.state = BundleState::Created;
                            }
                        }
                        group.state = ResourceGroupState::Created;
                    }
                    all_placed
                };
                if complete {
                    let group = self.groups[&key].clone();
                    if let Err(e) = self.persist(&group).await {
                        warn!(group = key.1, error = %e, "failed to persist created group");
                    }
                    let _ = pending.reply.send(CreateResourceGroupResponse {
                        request_id: pending.request_id,
                        code: ErrCode::None,
                        message: String::new(),
                    });
                } else {
                    self.fail_create(key, pending, ErrCode::InnerSystemError, "gang response missed bundles")
                        .await;
                }
            }
            Ok(resp) => {
                let code = resp.code;
                self.fail_create(key, pending, code, &resp.message).await;
            }
            Err(message) => {
                self.fail_create(key, pending, ErrCode::ScheduleCanceled, &message).await;
            }
        }
    }

    async fn fail_create(
        &mut self,
        key: GroupKey,
        pending: PendingCreate,
        code: ErrCode,
        message: &str,
    ) {
        warn!(group = key.1, %code, message, "resource group creation failed");
        self.teardown(&key).await;
        let _ = pending.reply.send(CreateResourceGroupResponse {
            request_id: pending.request_id,
            code,
            message: message.to_string(),
        });
    }

    // ── Delete ──────────────────────────────────────────────────────────

    async fn delete(
        &mut self,
        tenant_id: String,
        name: String,
        reply: oneshot::Sender<(ErrCode, String)>,
    ) {
        if !self.role.is_master() {
            let _ = reply.send(self.role.refusal());
            return;
        }
        let key = (tenant_id, name);
        if let Some(pending) = self.creating.get_mut(&key) {
            info!(group = key.1, "delete queued: gang schedule in flight");
            pending.queued_delete = Some(reply);
            pending.cancel.cancel();
            return;
        }
        if !self.groups.contains_key(&key) {
            // Idempotent: deleting the absent is fine.
            let _ = reply.send((ErrCode::None, "resource group not found".to_string()));
            return;
        }
        self.teardown(&key).await;
        let _ = reply.send((ErrCode::None, String::new()));
    }

    /// Remove bundles from every hosting local (at-least-once, idempotent),
    /// then drop the store record and forget the group.
    async fn teardown(&mut self, key: &GroupKey) {
        let Some(group) = self.groups.remove(key) else {
            return;
        };
        self.rescheduling.remove(key);
        for proxy in group.hosting_proxies() {
            let bundle_ids: Vec<String> = group
                .bundles
                .iter()
                .filter(|b| b.function_proxy_id == proxy)
                .map(|b| b.bundle_id.clone())
                .collect();
            let Some(address) = self.global.local_address(&proxy).await else {
                warn!(proxy, "no address for bundle removal, skipping");
                continue;
            };
            let req = RemoveBundleRequest {
                tenant_id: group.tenant_id.clone(),
                group_name: group.name.clone(),
                bundle_ids,
            };
            // First failure gets one more try; the RPC is idempotent.
            if self.local_mgr.remove_bundle_on_local(&address, req.clone()).await.is_err() {
                if let Err(e) = self.local_mgr.remove_bundle_on_local(&address, req).await {
                    warn!(proxy, error = %e, "bundle removal failed twice");
                }
            }
        }
        let store_key = keys::resource_group_key(&group.tenant_id, &group.name);
        if let Err(e) = self.store.delete(&store_key, DeleteOptions::default()).await {
            warn!(group = group.name, error = %e, "failed to delete group record");
        }
    }

    // ── Abnormality handling ────────────────────────────────────────────

    async fn on_local_abnormal(&mut self, proxy_id: String) {
        if !self.role.is_master() {
            return;
        }
        let mut touched = Vec::new();
        for (key, group) in self.groups.iter_mut() {
            let mut dirty = false;
            for bundle in &mut group.bundles {
                if bundle.function_proxy_id == proxy_id {
                    bundle.function_proxy_id.clear();
                    bundle.state = BundleState::Pending;
                    dirty = true;
                }
            }
            if dirty {
                group.state = ResourceGroupState::Pending;
                touched.push(key.clone());
            }
        }
        for key in touched {
            let group = self.groups[&key].clone();
            if let Err(e) = self.persist(&group).await {
                warn!(group = key.1, error = %e, "failed to persist degraded group");
            }
            info!(group = key.1, proxy = proxy_id, "bundles lost their local, rescheduling");
            self.kick_reschedule(key);
        }
    }

    /// One re-gang round for the pending bundles of a group, one bundle per
    /// request. Unplaced bundles retry after the reschedule interval.
    fn kick_reschedule(&mut self, key: GroupKey) {
        let Some(group) = self.groups.get(&key) else {
            return;
        };
        if self.creating.contains_key(&key) || self.rescheduling.contains(&key) {
            return;
        }
        let pending: Vec<String> =
            group.pending_bundles().map(|b| b.bundle_id.clone()).collect();
        if pending.is_empty() {
            return;
        }
        self.rescheduling.insert(key.clone());
        let group = group.clone();
        let global = self.global.clone();
        let domain_mgr = self.domain_mgr.clone();
        let self_tx = self.self_tx.clone();
        let timeout = Duration::from_millis(self.config.group_timeout_ms);
        tokio::spawn(async move {
            let mut results = BTreeMap::new();
            if let Some(root) = global.root_domain_info().await {
                for bundle_id in pending {
                    let mut single = group.clone();
                    single.bundles.retain(|b| b.bundle_id == bundle_id);
                    let call = domain_mgr.group_schedule(
                        &root.address,
                        GroupScheduleRequest {
                            request_id: fm_core::gen_request_id(),
                            group: single,
                        },
                    );
                    if let Ok(Ok(resp)) = tokio::time::timeout(timeout, call).await {
                        if resp.code.is_ok() {
                            results.extend(resp.schedule_results);
                        }
                    }
                }
            }
            let _ = self_tx.send(Msg::ReschedDone { key, results }).await;
        });
    }

    async fn on_resched_done(&mut self, key: GroupKey, results: BTreeMap<String, String>) {
        self.rescheduling.remove(&key);
        let still_pending = {
            let Some(group) = self.groups.get_mut(&key) else {
                return;
            };
            for bundle in &mut group.bundles {
                if let Some(node) = results.get(&bundle.bundle_id) {
                    bundle.function_proxy_id = node.clone();
                    bundle.state = BundleState::Created;
                }
            }
            let still = group.pending_bundles().count();
            if still == 0 {
                group.state = ResourceGroupState::Created;
            }
            still
        };
        let group = self.groups[&key].clone();
        if let Err(e) = self.persist(&group).await {
            warn!(group = key.1, error = %e, "failed to persist rescheduled group");
        }
        if still_pending > 0 {
            // AsyncAfter: retry until every pending bundle is placed.
            let self_tx = self.self_tx.clone();
            let interval = Duration::from_millis(self.config.reschedule_interval_ms);
            tokio::spawn(async move {
                tokio::time::sleep(interval).await;
                let _ = self_tx.send(Msg::RetryReschedule { key }).await;
            });
        }
    }

    // ── Queries & persistence ───────────────────────────────────────────

    fn query(&self, req: QueryResourceGroupRequest) -> QueryResourceGroupResponse {
        if !self.role.is_master() {
            let (code, message) = self.role.refusal();
            return QueryResourceGroupResponse { code, message, group: None };
        }
        let key = (req.tenant_id.clone(), req.group_name.clone());
        match self.groups.get(&key) {
            Some(group) => QueryResourceGroupResponse {
                code: ErrCode::None,
                message: String::new(),
                group: Some(group.clone()),
            },
            None => QueryResourceGroupResponse {
                code: ErrCode::InstanceNotFound,
                message: format!("resource group {} not found", req.group_name),
                group: None,
            },
        }
    }

    async fn persist(&self, group: &ResourceGroup) -> Result<(), String> {
        let key = keys::resource_group_key(&group.tenant_id, &group.name);
        let bytes = serde_json::to_vec(group).map_err(|e| e.to_string())?;
        self.store
            .put(&key, bytes, PutOptions::default())
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    /// Rebuild the in-memory view from the store; groups with pending
    /// bundles resume rescheduling. Bundle ids come back verbatim, so the
    /// (tenant, name, index) mapping survives restarts.
    async fn sync_from_store(&mut self) {
        let resp = match self
            .store
            .get(keys::RESOURCE_GROUP_PREFIX, GetOptions { prefix: true })
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                warn!(error = %e, "failed to sync resource groups");
                return;
            }
        };
        self.groups.clear();
        for kv in resp.kvs {
            match serde_json::from_slice::<ResourceGroup>(&kv.value) {
                Ok(group) => {
                    let key = (group.tenant_id.clone(), group.name.clone());
                    self.groups.insert(key, group);
                }
                Err(e) => warn!(key = kv.key, error = %e, "skipping unparsable group record"),
            }
        }
        info!(count = self.groups.len(), "synced resource groups from store");
        let keys: Vec<GroupKey> = self
            .groups
            .iter()
            .filter(|(_, g)| g.pending_bundles().count() > 0)
            .map(|(k, _)| k.clone())
            .collect();
        for key in keys {
            self.kick_reschedule(key);
        }
    }
}

#[cfg(test)]
#[path = "rgroup_tests.rs"]
mod tests;
