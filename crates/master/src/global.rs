// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The global scheduler actor.
//!
//! Sole writer of the topology snapshot. Drains three inputs in one loop:
//! its own command channel, domain manager events, and local manager
//! events. All tree mutation happens here; the managers only cache
//! membership and move bytes.
//!
//! Snapshot persistence keeps at most one Put in flight plus at most one
//! queued snapshot; a newer snapshot replaces the queued one (coalescing).
//! During a store outage the queued snapshot is flushed from
//! `on_healthy_status`.

use crate::activator::DomainActivator;
use crate::config::MasterConfig;
use crate::domain_mgr::{DomainEvent, DomainMgrHandle};
use crate::leader::{LeaderInfo, Role};
use crate::local_mgr::{LocalEvent, LocalMgrHandle};
use crate::tree::{SchedTree, TreeError};
use fm_core::{ErrCode, NodeInfo, NodeState};
use fm_store::{keys, GetOptions, MetaStore, PutOptions};
use fm_wire::{
    EvictAgentRequest, QueryAgentInfoRequest, QueryAgentInfoResponse, QueryInstancesInfoRequest,
    QueryInstancesInfoResponse, QueryResourcesInfoRequest, QueryResourcesInfoResponse, RegisterAck,
    ScheduleRequest, ScheduleResponse,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

/// Taint key marking local scheduler liveness on a worker.
pub const FUNCTION_PROXY_TAINT_KEY: &str = "function-proxy";

/// Why a local left the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalExitKind {
    Abnormal,
    Unregister,
}

/// Membership notification pushed to subscribers (resource group manager,
/// instance managers).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalChange {
    Added { name: String },
    Removed { name: String, kind: LocalExitKind },
}

enum Msg {
    UpdateLeaderInfo(LeaderInfo),
    OnHealthyStatus(bool),
    UpdateTaints {
        ip: String,
        key: String,
        healthy: bool,
    },
    Schedule {
        req: ScheduleRequest,
        reply: oneshot::Sender<Result<ScheduleResponse, (ErrCode, String)>>,
    },
    QueryAgentInfo {
        req: QueryAgentInfoRequest,
        reply: oneshot::Sender<Result<QueryAgentInfoResponse, (ErrCode, String)>>,
    },
    QueryResourcesInfo {
        req: QueryResourcesInfoRequest,
        reply: oneshot::Sender<Result<QueryResourcesInfoResponse, (ErrCode, String)>>,
    },
    GetSchedulingQueue {
        req: QueryInstancesInfoRequest,
        reply: oneshot::Sender<Result<QueryInstancesInfoResponse, (ErrCode, String)>>,
    },
    EvictAgent {
        local_id: String,
        req: EvictAgentRequest,
        reply: oneshot::Sender<Result<ErrCode, (ErrCode, String)>>,
    },
    GetRootDomain {
        reply: oneshot::Sender<Option<NodeInfo>>,
    },
    GetLocalAddress {
        name: String,
        reply: oneshot::Sender<Option<String>>,
    },
    QueryNodes {
        reply: oneshot::Sender<HashSet<String>>,
    },
    Subscribe {
        reply: oneshot::Sender<mpsc::UnboundedReceiver<LocalChange>>,
    },
    TopologyPutDone(bool),
    #[cfg(test)]
    Inspect {
        reply: oneshot::Sender<InspectState>,
    },
}

#[cfg(test)]
#[derive(Debug)]
pub(crate) struct InspectState {
    pub persisting: bool,
    pub queued: bool,
    pub recovered: bool,
    pub role_is_master: bool,
    pub taints: HashMap<(String, String), bool>,
}

/// Cloneable handle to the global scheduler actor.
#[derive(Clone)]
pub struct GlobalSchedHandle {
    tx: mpsc::Sender<Msg>,
}

impl GlobalSchedHandle {
    pub async fn update_leader_info(&self, leader: LeaderInfo) {
        let _ = self.tx.send(Msg::UpdateLeaderInfo(leader)).await;
    }

    /// Store health restored (or lost); flushes deferred snapshots.
    pub async fn on_healthy_status(&self, healthy: bool) {
        let _ = self.tx.send(Msg::OnHealthyStatus(healthy)).await;
    }

    pub async fn update_taints(
        &self,
        ip: impl Into<String>,
        key: impl Into<String>,
        healthy: bool,
    ) {
        let _ = self
            .tx
            .send(Msg::UpdateTaints { ip: ip.into(), key: key.into(), healthy })
            .await;
    }

    /// Forward a schedule request to the root domain.
    pub async fn schedule(
        &self,
        req: ScheduleRequest,
    ) -> Result<ScheduleResponse, (ErrCode, String)> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Msg::Schedule { req, reply })
            .await
            .map_err(|_| (ErrCode::InnerSystemError, "global scheduler stopped".to_string()))?;
        rx.await
            .map_err(|_| (ErrCode::InnerSystemError, "global scheduler dropped reply".to_string()))?
    }

    pub async fn query_agent_info(
        &self,
        req: QueryAgentInfoRequest,
    ) -> Result<QueryAgentInfoResponse, (ErrCode, String)> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Msg::QueryAgentInfo { req, reply })
            .await
            .map_err(|_| (ErrCode::InnerSystemError, "global scheduler stopped".to_string()))?;
        rx.await
            .map_err(|_| (ErrCode::InnerSystemError, "global scheduler dropped reply".to_string()))?
    }

    pub async fn query_resources_info(
        &self,
        req: QueryResourcesInfoRequest,
    ) -> Result<QueryResourcesInfoResponse, (ErrCode, String)> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Msg::QueryResourcesInfo { req, reply })
            .await
            .map_err(|_| (ErrCode::InnerSystemError, "global scheduler stopped".to_string()))?;
        rx.await
            .map_err(|_| (ErrCode::InnerSystemError, "global scheduler dropped reply".to_string()))?
    }

    pub async fn get_scheduling_queue(
        &self,
        req: QueryInstancesInfoRequest,
    ) -> Result<QueryInstancesInfoResponse, (ErrCode, String)> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Msg::GetSchedulingQueue { req, reply })
            .await
            .map_err(|_| (ErrCode::InnerSystemError, "global scheduler stopped".to_string()))?;
        rx.await
            .map_err(|_| (ErrCode::InnerSystemError, "global scheduler dropped reply".to_string()))?
    }

    pub async fn evict_agent(
        &self,
        local_id: impl Into<String>,
        req: EvictAgentRequest,
    ) -> Result<ErrCode, (ErrCode, String)> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Msg::EvictAgent { local_id: local_id.into(), req, reply })
            .await
            .map_err(|_| (ErrCode::InnerSystemError, "global scheduler stopped".to_string()))?;
        rx.await
            .map_err(|_| (ErrCode::InnerSystemError, "global scheduler dropped reply".to_string()))?
    }

    pub async fn root_domain_info(&self) -> Option<NodeInfo> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(Msg::GetRootDomain { reply }).await.ok()?;
        rx.await.ok().flatten()
    }

    pub async fn local_address(&self, name: &str) -> Option<String> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(Msg::GetLocalAddress { name: name.to_string(), reply }).await.ok()?;
        rx.await.ok().flatten()
    }

    pub async fn query_nodes(&self) -> HashSet<String> {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Msg::QueryNodes { reply }).await.is_err() {
            return HashSet::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Subscribe to local membership changes.
    pub async fn subscribe_local_changes(&self) -> Option<mpsc::UnboundedReceiver<LocalChange>> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(Msg::Subscribe { reply }).await.ok()?;
        rx.await.ok()
    }

    #[cfg(test)]
    pub(crate) async fn inspect(&self) -> InspectState {
        let (reply, rx) = oneshot::channel();
        self.tx.send(Msg::Inspect { reply }).await.ok();
        match rx.await {
            Ok(state) => state,
            Err(_) => panic!("global scheduler actor gone"),
        }
    }
}

/// The global scheduler actor. See module docs.
pub struct GlobalSchedActor {
    rx: mpsc::Receiver<Msg>,
    self_tx: mpsc::Sender<Msg>,
    domain_events: mpsc::UnboundedReceiver<DomainEvent>,
    local_events: mpsc::UnboundedReceiver<LocalEvent>,
    config: MasterConfig,
    store: Arc<dyn MetaStore>,
    activator: Arc<DomainActivator>,
    domain_mgr: DomainMgrHandle,
    local_mgr: LocalMgrHandle,
    tree: SchedTree,
    role: Role,
    // Snapshot persistence pipeline.
    persisting: bool,
    queued_snapshot: Option<Vec<u8>>,
    topo_recovered: bool,
    // Locals that registered while no domain could adopt them.
    cached_locals: VecDeque<(String, String)>,
    domain_activated: bool,
    taints: HashMap<(String, String), bool>,
    subscribers: Vec<mpsc::UnboundedSender<LocalChange>>,
}

impl GlobalSchedActor {
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        config: MasterConfig,
        store: Arc<dyn MetaStore>,
        activator: Arc<DomainActivator>,
        domain_mgr: DomainMgrHandle,
        domain_events: mpsc::UnboundedReceiver<DomainEvent>,
        local_mgr: LocalMgrHandle,
        local_events: mpsc::UnboundedReceiver<LocalEvent>,
    ) -> GlobalSchedHandle {
        let (tx, rx) = mpsc::channel(256);
        let tree = SchedTree::new(config.max_local_per_domain, config.max_domain_per_domain);
        let actor = Self {
            rx,
            self_tx: tx.clone(),
            domain_events,
            local_events,
            config,
            store,
            activator,
            domain_mgr,
            local_mgr,
            tree,
            role: Role::Master,
            persisting: false,
            queued_snapshot: None,
            topo_recovered: false,
            cached_locals: VecDeque::new(),
            domain_activated: false,
            taints: HashMap::new(),
            subscribers: Vec::new(),
        };
        tokio::spawn(actor.run());
        GlobalSchedHandle { tx }
    }

    async fn run(mut self) {
        self.recover_topology().await;
        loop {
            tokio::select! {
                msg = self.rx.recv() => match msg {
                    Some(msg) => self.handle(msg).await,
                    None => break,
                },
                Some(event) = self.domain_events.recv() => self.on_domain_event(event).await,
                Some(event) = self.local_events.recv() => self.on_local_event(event).await,
            }
        }
    }

    // ── Recovery ────────────────────────────────────────────────────────

    /// Rebuild the tree from the persisted snapshot (§ recovery workflow):
    /// bounded wait, keep old topology on parse failure, resume the root
    /// heartbeat, or launch the co-resident domain when none exists.
    async fn recover_topology(&mut self) {
        let fetched = tokio::time::timeout(
            Duration::from_millis(self.config.recover_timeout_ms),
            self.store.get(keys::SCHEDULER_TOPOLOGY_KEY, GetOptions::default()),
        )
        .await;
        match fetched {
            Ok(Ok(resp)) if !resp.kvs.is_empty() => {
                let bytes = &resp.kvs[0].value;
                match self.tree.recover(bytes) {
                    Ok(()) => info!("recovered scheduler topology from store"),
                    Err(e) => warn!(error = %e, "topology snapshot unusable, keep old topology"),
                }
            }
            Ok(Ok(_)) => info!("no persisted topology, starting fresh"),
            Ok(Err(e)) => warn!(error = %e, "failed to read topology snapshot"),
            Err(_) => warn!("timed out waiting for topology snapshot"),
        }
        self.topo_recovered = true;
        match self.root_domain() {
            Some(root) => {
                self.domain_mgr.connect(root.name.clone(), root.address.clone()).await;
            }
            None => {
                if self.role.is_master() {
                    self.try_activate_domain().await;
                }
            }
        }
        // Flush any snapshot deferred while recovery was pending.
        if self.queued_snapshot.take().is_some() {
            self.put_topology();
        }
    }

    fn root_domain(&self) -> Option<NodeInfo> {
        self.tree.root().map(|idx| self.tree.info(idx).clone())
    }

    async fn try_activate_domain(&mut self) {
        if self.domain_activated {
            return;
        }
        match self.activator.start_domain().await {
            Ok(()) => self.domain_activated = true,
            Err(e) => error!(error = %e, "failed to activate co-resident domain"),
        }
    }

    // ── Snapshot persistence ────────────────────────────────────────────

    fn put_topology(&mut self) {
        let bytes = self.tree.serialize();
        if !self.topo_recovered || self.persisting {
            // Coalesce: the newest snapshot supersedes any queued one.
            self.queued_snapshot = Some(bytes);
            return;
        }
        self.persisting = true;
        let store = self.store.clone();
        let self_tx = self.self_tx.clone();
        tokio::spawn(async move {
            let ok = match store
                .put(keys::SCHEDULER_TOPOLOGY_KEY, bytes, PutOptions::default())
                .await
            {
                Ok(_) => true,
                Err(e) => {
                    warn!(error = %e, "failed to persist topology snapshot");
                    false
                }
            };
            let _ = self_tx.send(Msg::TopologyPutDone(ok)).await;
        });
    }

    fn on_topology_put_done(&mut self, ok: bool) {
        self.persisting = false;
        if !ok && self.queued_snapshot.is_none() {
            // Keep the latest bytes around for the healthy-status retry.
            self.queued_snapshot = Some(self.tree.serialize());
            return;
        }
        if ok && self.queued_snapshot.is_some() {
            self.queued_snapshot = None;
            self.put_topology();
        }
    }

    // ── Event handling ──────────────────────────────────────────────────

    async fn on_domain_event(&mut self, event: DomainEvent) {
        match event {
            DomainEvent::Registered { name, address } => self.add_domain(name, address).await,
            DomainEvent::HeartbeatLost { name } => self.del_domain(name).await,
            DomainEvent::LocalLost { name, ip } => {
                self.del_local(name, LocalExitKind::Abnormal).await;
                self.set_taint(ip, FUNCTION_PROXY_TAINT_KEY.to_string(), false);
            }
            DomainEvent::WorkerStatus { ip, key, healthy } => self.set_taint(ip, key, healthy),
        }
    }

    async fn on_local_event(&mut self, event: LocalEvent) {
        match event {
            LocalEvent::Registered { name, address } => {
                self.set_taint(
                    ip_of(&address).to_string(),
                    FUNCTION_PROXY_TAINT_KEY.to_string(),
                    true,
                );
                self.add_local(name, address).await;
            }
            LocalEvent::Unregistered { name, ip } => {
                self.del_local(name, LocalExitKind::Unregister).await;
                self.set_taint(ip, FUNCTION_PROXY_TAINT_KEY.to_string(), false);
            }
        }
    }

    async fn add_local(&mut self, name: String, address: String) {
        if !self.role.is_master() {
            let (code, message) = self.role.refusal();
            self.local_mgr.registered(&address, RegisterAck::refused(code, message)).await;
            return;
        }
        match self.tree.add_leaf(NodeInfo::new(&name, &address)) {
            Ok(idx) => {
                self.put_topology();
                let view = self.tree.topology_view(idx);
                self.local_mgr.registered(&address, RegisterAck::ok(view.clone())).await;
                if let Some(view) = view {
                    let addresses =
                        view.members.iter().map(|m| m.address.clone()).collect::<Vec<_>>();
                    self.local_mgr.push_topology(addresses, view).await;
                }
                self.notify(LocalChange::Added { name });
            }
            Err(TreeError::TooShallow) | Err(TreeError::NoSlot(_)) => {
                info!(name, "no domain capacity, caching local and activating domain");
                self.cached_locals.push_back((name.clone(), address.clone()));
                self.try_activate_domain().await;
                if !self.domain_activated {
                    self.cached_locals.retain(|(n, _)| n != &name);
                    self.local_mgr
                        .registered(
                            &address,
                            RegisterAck::refused(
                                ErrCode::InnerSystemError,
                                "no domain available and activation failed",
                            ),
                        )
                        .await;
                }
            }
            Err(e) => {
                warn!(name, error = %e, "failed to add local scheduler");
                self.local_mgr
                    .registered(&address, RegisterAck::refused(ErrCode::InnerSystemError, e.to_string()))
                    .await;
            }
        }
    }

    async fn del_local(&mut self, name: String, kind: LocalExitKind) {
        match self.tree.remove_leaf(&name) {
            Ok(parent) => {
                info!(name, ?kind, "removed local scheduler from topology");
                self.put_topology();
                // Parent membership changed: refresh the remaining members.
                let view = self.tree.domain_view(parent);
                if !view.members.is_empty() {
                    let addresses = view.members.iter().map(|m| m.address.clone()).collect();
                    self.local_mgr.push_topology(addresses, view).await;
                }
                self.local_mgr.forget(&name).await;
                self.notify(LocalChange::Removed { name, kind });
            }
            Err(e) => warn!(name, error = %e, "failed to remove local scheduler"),
        }
    }

    async fn add_domain(&mut self, name: String, address: String) {
        if !self.role.is_master() {
            let (code, message) = self.role.refusal();
            self.domain_mgr.registered(&address, RegisterAck::refused(code, message)).await;
            return;
        }
        // A broken placeholder is replaced in preference to growing the tree.
        let added = match self.tree.broken_non_leaf() {
            Some(old) => self.tree.replace_non_leaf(&old, NodeInfo::new(&name, &address)),
            None => self.tree.add_non_leaf(NodeInfo::new(&name, &address)),
        };
        match added {
            Ok(idx) => {
                if self.tree.parent(idx).is_none() {
                    // New (or replaced) root: retarget the heartbeat link.
                    self.domain_mgr.connect(name.clone(), address.clone()).await;
                }
                self.put_topology();
                let view = self.tree.topology_view(idx);
                self.domain_mgr.registered(&address, RegisterAck::ok(view)).await;
                // Replay locals that arrived before any domain existed.
                let cached: Vec<_> = self.cached_locals.drain(..).collect();
                for (local_name, local_address) in cached {
                    self.add_local(local_name, local_address).await;
                }
            }
            Err(e) => {
                warn!(name, error = %e, "failed to add domain scheduler");
                self.domain_mgr
                    .registered(
                        &address,
                        RegisterAck::refused(ErrCode::InnerSystemError, e.to_string()),
                    )
                    .await;
            }
        }
    }

    async fn del_domain(&mut self, name: String) {
        match self.tree.find_non_leaf(&name) {
            Some(idx) => {
                warn!(name, "marking domain scheduler broken");
                self.tree.set_state(idx, NodeState::Broken);
                self.put_topology();
                // Try to repair with the co-resident launcher; the next
                // domain registration replaces the broken placeholder.
                self.domain_activated = false;
                self.try_activate_domain().await;
            }
            None => warn!(name, "unknown domain reported broken"),
        }
    }

    fn set_taint(&mut self, ip: String, key: String, healthy: bool) {
        self.taints.insert((ip, key), healthy);
    }

    fn notify(&mut self, change: LocalChange) {
        self.subscribers.retain(|tx| tx.send(change.clone()).is_ok());
    }

    // ── Command handling ────────────────────────────────────────────────

    async fn handle(&mut self, msg: Msg) {
        match msg {
            Msg::UpdateLeaderInfo(leader) => {
                let new_role = Role::from_leader(&self.config.node_id, &leader);
                let became_master = new_role.is_master() && !self.role.is_master();
                self.role = new_role;
                if became_master {
                    info!("acquired master role, re-syncing topology");
                    self.recover_topology().await;
                }
            }
            Msg::OnHealthyStatus(healthy) => {
                if healthy && self.queued_snapshot.take().is_some() {
                    self.put_topology();
                }
            }
            Msg::UpdateTaints { ip, key, healthy } => self.set_taint(ip, key, healthy),
            Msg::Schedule { req, reply } => {
                let target = if self.role.is_master() {
                    self.root_domain()
                        .map(|root| (root.name, root.address))
                        .ok_or((ErrCode::InnerSystemError, "no root domain".to_string()))
                } else {
                    Err(self.role.refusal())
                };
                let domain_mgr = self.domain_mgr.clone();
                tokio::spawn(async move {
                    let result = match target {
                        Ok((name, address)) => domain_mgr
                            .schedule(&name, &address, req)
                            .await
                            .map_err(|e| (ErrCode::InnerCommunication, e.to_string())),
                        Err(e) => Err(e),
                    };
                    let _ = reply.send(result);
                });
            }
            Msg::QueryAgentInfo { req, reply } => {
                let target = self.read_target();
                let domain_mgr = self.domain_mgr.clone();
                tokio::spawn(async move {
                    let result = match target {
                        Ok(address) => domain_mgr
                            .query_agent_info(&address, req)
                            .await
                            .map_err(|e| (ErrCode::InnerCommunication, e.to_string())),
                        Err(e) => Err(e),
                    };
                    let _ = reply.send(result);
                });
            }
            Msg::QueryResourcesInfo { req, reply } => {
                let target = self.read_target();
                let domain_mgr = self.domain_mgr.clone();
                tokio::spawn(async move {
                    let result = match target {
                        Ok(address) => domain_mgr
                            .query_resources_info(&address, req)
                            .await
                            .map_err(|e| (ErrCode::InnerCommunication, e.to_string())),
                        Err(e) => Err(e),
                    };
                    let _ = reply.send(result);
                });
            }
            Msg::GetSchedulingQueue { req, reply } => {
                let target = self.read_target();
                let domain_mgr = self.domain_mgr.clone();
                tokio::spawn(async move {
                    let result = match target {
                        Ok(address) => domain_mgr
                            .get_scheduling_queue(&address, req)
                            .await
                            .map_err(|e| (ErrCode::InnerCommunication, e.to_string())),
                        Err(e) => Err(e),
                    };
                    let _ = reply.send(result);
                });
            }
            Msg::EvictAgent { local_id, req, reply } => {
                let target = self.evict_target(&local_id).await;
                let local_mgr = self.local_mgr.clone();
                tokio::spawn(async move {
                    let result = match target {
                        Ok(address) => local_mgr
                            .evict_agent_on_local(&address, req)
                            .await
                            .map_err(|e| (ErrCode::InnerCommunication, e.to_string())),
                        Err(e) => Err(e),
                    };
                    let _ = reply.send(result);
                });
            }
            Msg::GetRootDomain { reply } => {
                let _ = reply.send(self.root_domain());
            }
            Msg::GetLocalAddress { name, reply } => {
                let address = self
                    .tree
                    .find_leaf(&name)
                    .map(|idx| self.tree.info(idx).address.clone());
                let _ = reply.send(address);
            }
            Msg::QueryNodes { reply } => {
                let _ = reply.send(self.tree.node_names());
            }
            Msg::Subscribe { reply } => {
                let (tx, rx) = mpsc::unbounded_channel();
                self.subscribers.push(tx);
                let _ = reply.send(rx);
            }
            Msg::TopologyPutDone(ok) => self.on_topology_put_done(ok),
            #[cfg(test)]
            Msg::Inspect { reply } => {
                let _ = reply.send(InspectState {
                    persisting: self.persisting,
                    queued: self.queued_snapshot.is_some(),
                    recovered: self.topo_recovered,
                    role_is_master: self.role.is_master(),
                    taints: self.taints.clone(),
                });
            }
        }
    }

    /// Address queries are served from: the root domain when master, the
    /// master global scheduler when follower.
    fn read_target(&self) -> Result<String, (ErrCode, String)> {
        match &self.role {
            Role::Master => self
                .root_domain()
                .map(|info| info.address)
                .ok_or((ErrCode::InnerSystemError, "no root domain".to_string())),
            Role::Slave { master } => Ok(master.address.clone()),
        }
    }

    /// Resolve where an eviction should go: the named local's address.
    async fn evict_target(&mut self, local_id: &str) -> Result<String, (ErrCode, String)> {
        if !self.role.is_master() {
            return Err(self.role.refusal());
        }
        if let Some(idx) = self.tree.find_leaf(local_id) {
            return Ok(self.tree.info(idx).address.clone());
        }
        match self.local_mgr.address_of(local_id).await {
            Some(address) => Ok(address),
            None => Err((
                ErrCode::ParamInvalid,
                format!("unknown local scheduler {local_id}"),
            )),
        }
    }
}

fn ip_of(address: &str) -> &str {
    address.split(':').next().unwrap_or(address)
}

#[cfg(test)]
#[path = "global_tests.rs"]
mod tests;
