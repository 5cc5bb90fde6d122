// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures: stub transports wiring masters and locals together
//! over one in-memory store.

#![allow(dead_code)]

use async_trait::async_trait;
use fm_core::{ErrCode, InstanceInfo, InstanceState, InstanceStatus, Resources};
use fm_master::clients::{ClientError as MasterClientError, DomainClient, LocalClient};
use fm_proxy::clients::ClientError as ProxyClientError;
use fm_proxy::controller::ControllerDeps;
use fm_proxy::decision::DecisionOutcome;
use fm_proxy::{
    CreatorSink, FunctionAgentClient, FunctionMetaStore, InstanceController, InstanceCtrlConfig,
    PeerProxy, RuntimeClient, ScheduleDecision, UpstreamScheduler,
};
use fm_store::MemoryStore;
use fm_wire::{
    CallResult, CallResultAck, DeployInstanceRequest, DeployInstanceResponse,
    ForwardCallResultRequest, ForwardCallResultResponse, ForwardCustomSignalRequest,
    FunctionMeta, GroupScheduleRequest, GroupScheduleResponse, HeartbeatRequest,
    HeartbeatResponse, InitCallRequest, KillRequest, KillResponse, KillRuntimeRequest,
    KillRuntimeResponse, QueryAgentInfoRequest, QueryAgentInfoResponse,
    QueryInstancesInfoRequest, QueryInstancesInfoResponse, QueryResourcesInfoRequest,
    QueryResourcesInfoResponse, ReadinessRequest, ReadinessResponse, RegisterAck,
    RuntimeExitInfo, ScheduleRequest, ScheduleResponse, ScheduleTopology, ShutdownRequest,
    ShutdownResponse,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const SPEC_WAIT_MAX_MS: u64 = 2000;

pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(60)).await;
}

/// Poll until the predicate holds or the budget runs out.
pub async fn wait_for(max_ms: u64, mut predicate: impl FnMut() -> bool) -> bool {
    let mut waited = 0;
    while waited < max_ms {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        waited += 20;
    }
    predicate()
}

pub fn new_instance(id: &str) -> InstanceInfo {
    InstanceInfo {
        instance_id: id.to_string(),
        request_id: format!("req-{id}"),
        function: "t1/func".to_string(),
        tenant_id: "t1".to_string(),
        resources: Resources::new(500, 128),
        status: InstanceStatus::new(InstanceState::New),
        schedule_times: 2,
        ..Default::default()
    }
}

// ── Local scheduler stub environment ────────────────────────────────────

pub struct StubMeta;

#[async_trait]
impl FunctionMetaStore for StubMeta {
    async fn fetch(&self, function: &str) -> Result<Option<FunctionMeta>, ProxyClientError> {
        Ok(Some(FunctionMeta {
            function: function.to_string(),
            entry_file: "main.py".to_string(),
            language: "python".to_string(),
            code_uri: "bucket/code.zip".to_string(),
            code_hash: "feed".to_string(),
            ..Default::default()
        }))
    }
}

pub struct StubAgent;

#[async_trait]
impl FunctionAgentClient for StubAgent {
    async fn deploy(
        &self,
        _agent_id: &str,
        req: DeployInstanceRequest,
    ) -> Result<DeployInstanceResponse, ProxyClientError> {
        Ok(DeployInstanceResponse {
            code: ErrCode::None,
            message: String::new(),
            runtime_id: format!("rt-{}", req.instance.instance_id),
            runtime_address: format!("rt-addr-{}", req.instance.instance_id),
        })
    }

    async fn kill_runtime(
        &self,
        _agent_id: &str,
        _req: KillRuntimeRequest,
    ) -> Result<KillRuntimeResponse, ProxyClientError> {
        Ok(KillRuntimeResponse { code: ErrCode::None, message: String::new() })
    }

    async fn query_exit_info(
        &self,
        _agent_id: &str,
        _instance_id: &str,
    ) -> Result<RuntimeExitInfo, ProxyClientError> {
        Ok(RuntimeExitInfo { runtime_gone: true, ..Default::default() })
    }
}

pub struct StubRuntime;

#[async_trait]
impl RuntimeClient for StubRuntime {
    async fn connect(&self, _address: &str) -> Result<(), ProxyClientError> {
        Ok(())
    }

    async fn readiness(
        &self,
        _address: &str,
        _req: ReadinessRequest,
    ) -> Result<ReadinessResponse, ProxyClientError> {
        Ok(ReadinessResponse { code: ErrCode::None, message: String::new() })
    }

    async fn init_call(
        &self,
        _address: &str,
        req: InitCallRequest,
    ) -> Result<CallResult, ProxyClientError> {
        Ok(CallResult {
            instance_id: req.instance_id,
            request_id: req.request_id,
            code: ErrCode::None,
            message: String::new(),
            exit_code: 0,
        })
    }

    async fn heartbeat(
        &self,
        _address: &str,
        _req: HeartbeatRequest,
    ) -> Result<HeartbeatResponse, ProxyClientError> {
        Ok(HeartbeatResponse { code: ErrCode::None, health_code: 0 })
    }

    async fn shutdown(
        &self,
        _address: &str,
        _req: ShutdownRequest,
    ) -> Result<ShutdownResponse, ProxyClientError> {
        Ok(ShutdownResponse { code: ErrCode::None, message: String::new() })
    }

    async fn checkpoint(&self, _address: &str, _instance_id: &str) -> Result<(), ProxyClientError> {
        Ok(())
    }

    async fn signal(
        &self,
        _address: &str,
        req: KillRequest,
    ) -> Result<KillResponse, ProxyClientError> {
        Ok(KillResponse::ok(&req.instance_id))
    }

    async fn close(&self, _instance_id: &str) {}
}

/// Places everything on one agent while `has_capacity` holds.
pub struct StubDecision {
    pub agent_id: String,
    pub has_capacity: AtomicBool,
}

impl StubDecision {
    pub fn with_capacity(agent_id: &str, has_capacity: bool) -> Arc<Self> {
        Arc::new(Self {
            agent_id: agent_id.to_string(),
            has_capacity: AtomicBool::new(has_capacity),
        })
    }
}

impl ScheduleDecision for StubDecision {
    fn decide(&self, _instance: &InstanceInfo) -> DecisionOutcome {
        if self.has_capacity.load(Ordering::SeqCst) {
            DecisionOutcome::Success {
                agent_id: self.agent_id.clone(),
                device_options: Vec::new(),
            }
        } else {
            DecisionOutcome::ResourceNotEnough
        }
    }

    fn release(&self, _instance_id: &str) {}
}

/// Upstream path that re-dispatches onto another local's controller,
/// standing in for C3 -> C4 -> root domain -> downward re-dispatch.
pub struct RoutingUpstream {
    pub target: Mutex<Option<Arc<InstanceController>>>,
}

impl RoutingUpstream {
    pub fn unrouted() -> Arc<Self> {
        Arc::new(Self { target: Mutex::new(None) })
    }
}

#[async_trait]
impl UpstreamScheduler for RoutingUpstream {
    async fn forward_schedule(
        &self,
        req: ScheduleRequest,
    ) -> Result<ScheduleResponse, ProxyClientError> {
        let target = self.target.lock().clone();
        match target {
            Some(controller) => Ok(controller.schedule(req).await),
            None => Ok(ScheduleResponse {
                request_id: req.request_id.clone(),
                instance_id: req.instance.instance_id.clone(),
                code: ErrCode::ResourceNotEnough,
                message: "nowhere to go".to_string(),
                scheduled_on: String::new(),
            }),
        }
    }
}

pub struct StubPeers;

#[async_trait]
impl PeerProxy for StubPeers {
    async fn resolve_local(&self, _proxy_id: &str) -> Option<String> {
        None
    }

    async fn forward_custom_signal(
        &self,
        _address: &str,
        _req: ForwardCustomSignalRequest,
    ) -> Result<(), ProxyClientError> {
        Ok(())
    }

    async fn forward_call_result(
        &self,
        _address: &str,
        req: ForwardCallResultRequest,
    ) -> Result<ForwardCallResultResponse, ProxyClientError> {
        Ok(ForwardCallResultResponse {
            request_id: req.result.request_id,
            ack: CallResultAck { code: ErrCode::None, message: String::new() },
        })
    }

    async fn kill_remote(
        &self,
        _address: &str,
        req: KillRequest,
    ) -> Result<KillResponse, ProxyClientError> {
        Ok(KillResponse::ok(&req.instance_id))
    }
}

pub struct StubCreatorSink;

#[async_trait]
impl CreatorSink for StubCreatorSink {
    async fn deliver(
        &self,
        _dst_instance_id: &str,
        _result: CallResult,
    ) -> Result<CallResultAck, ProxyClientError> {
        Ok(CallResultAck { code: ErrCode::None, message: String::new() })
    }
}

/// A local scheduler: controller plus the upstream hook to wire later.
pub struct LocalNode {
    pub controller: Arc<InstanceController>,
    pub upstream: Arc<RoutingUpstream>,
    pub decision: Arc<StubDecision>,
}

pub fn local_node(node_id: &str, store: &MemoryStore, has_capacity: bool) -> LocalNode {
    let upstream = RoutingUpstream::unrouted();
    let decision = StubDecision::with_capacity(&format!("agent-{node_id}"), has_capacity);
    let config = InstanceCtrlConfig::default()
        .node_id(node_id)
        .heartbeat_interval_ms(50)
        .max_forward_schedule_retry_times(2)
        .recover_retry_times(2);
    let controller = InstanceController::new(
        config,
        ControllerDeps {
            store: Arc::new(store.clone()),
            meta: Arc::new(StubMeta),
            agent: Arc::new(StubAgent),
            runtime: Arc::new(StubRuntime),
            decision: decision.clone(),
            upstream: upstream.clone(),
            peers: Arc::new(StubPeers),
            creator_sink: Arc::new(StubCreatorSink),
        },
    );
    LocalNode { controller, upstream, decision }
}

// ── Master stub environment ─────────────────────────────────────────────

/// Domain client whose gang scheduling places every bundle on one node.
pub struct StubDomainClient {
    pub gang_node: Mutex<String>,
    pub acks: Mutex<Vec<(String, bool)>>,
}

impl StubDomainClient {
    pub fn placing_on(node: &str) -> Arc<Self> {
        Arc::new(Self {
            gang_node: Mutex::new(node.to_string()),
            acks: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl DomainClient for StubDomainClient {
    async fn heartbeat(&self, _address: &str) -> Result<(), MasterClientError> {
        Ok(())
    }

    async fn registered(&self, address: &str, ack: RegisterAck) -> Result<(), MasterClientError> {
        self.acks.lock().push((address.to_string(), ack.code.is_ok()));
        Ok(())
    }

    async fn update_topology(
        &self,
        _address: &str,
        _topology: ScheduleTopology,
    ) -> Result<(), MasterClientError> {
        Ok(())
    }

    async fn schedule(
        &self,
        _address: &str,
        req: ScheduleRequest,
    ) -> Result<ScheduleResponse, MasterClientError> {
        Ok(ScheduleResponse::new(&req, ErrCode::ResourceNotEnough, "stub domain"))
    }

    async fn query_agent_info(
        &self,
        _address: &str,
        _req: QueryAgentInfoRequest,
    ) -> Result<QueryAgentInfoResponse, MasterClientError> {
        Ok(QueryAgentInfoResponse::default())
    }

    async fn query_resources_info(
        &self,
        _address: &str,
        _req: QueryResourcesInfoRequest,
    ) -> Result<QueryResourcesInfoResponse, MasterClientError> {
        Ok(QueryResourcesInfoResponse::default())
    }

    async fn get_scheduling_queue(
        &self,
        _address: &str,
        _req: QueryInstancesInfoRequest,
    ) -> Result<QueryInstancesInfoResponse, MasterClientError> {
        Ok(QueryInstancesInfoResponse::default())
    }

    async fn group_schedule(
        &self,
        _address: &str,
        req: GroupScheduleRequest,
    ) -> Result<GroupScheduleResponse, MasterClientError> {
        let node = self.gang_node.lock().clone();
        let mut results = BTreeMap::new();
        for bundle in &req.group.bundles {
            results.insert(bundle.bundle_id.clone(), node.clone());
        }
        Ok(GroupScheduleResponse {
            request_id: req.request_id,
            code: ErrCode::None,
            message: String::new(),
            schedule_results: results,
        })
    }
}

pub struct StubLocalClient {
    pub acks: Mutex<Vec<(String, bool)>>,
    pub topo_pushes: Mutex<Vec<(String, usize)>>,
    pub removed_bundles: Mutex<Vec<String>>,
}

impl StubLocalClient {
    pub fn arc() -> Arc<Self> {
        Arc::new(Self {
            acks: Mutex::new(Vec::new()),
            topo_pushes: Mutex::new(Vec::new()),
            removed_bundles: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl LocalClient for StubLocalClient {
    async fn registered(&self, address: &str, ack: RegisterAck) -> Result<(), MasterClientError> {
        self.acks.lock().push((address.to_string(), ack.code.is_ok()));
        Ok(())
    }

    async fn update_topology(
        &self,
        address: &str,
        topology: ScheduleTopology,
    ) -> Result<(), MasterClientError> {
        self.topo_pushes.lock().push((address.to_string(), topology.members.len()));
        Ok(())
    }

    async fn evict_agent(
        &self,
        _address: &str,
        _req: fm_wire::EvictAgentRequest,
    ) -> Result<ErrCode, MasterClientError> {
        Ok(ErrCode::None)
    }

    async fn remove_bundle(
        &self,
        _address: &str,
        req: fm_wire::RemoveBundleRequest,
    ) -> Result<fm_wire::RemoveBundleResponse, MasterClientError> {
        self.removed_bundles.lock().extend(req.bundle_ids);
        Ok(fm_wire::RemoveBundleResponse { code: ErrCode::None, message: String::new() })
    }
}

/// Launcher whose in-process domain registers through the ordinary path.
pub struct StubLauncher {
    pub fail: bool,
    pub domain_name: String,
    pub mgr: Mutex<Option<fm_master::domain_mgr::DomainMgrHandle>>,
}

impl StubLauncher {
    pub fn arc(fail: bool, domain_name: &str) -> Arc<Self> {
        Arc::new(Self {
            fail,
            domain_name: domain_name.to_string(),
            mgr: Mutex::new(None),
        })
    }
}

#[async_trait]
impl fm_master::DomainLauncher for StubLauncher {
    async fn start(&self) -> Result<(), String> {
        if self.fail {
            return Err("launch failed".to_string());
        }
        let mgr = self.mgr.lock().clone();
        if let Some(mgr) = mgr {
            let name = self.domain_name.clone();
            tokio::spawn(async move {
                mgr.register(&name, format!("addr-{name}")).await;
            });
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), String> {
        Ok(())
    }
}

/// A running master with its manager handles and stub clients.
pub struct MasterNode {
    pub global: fm_master::GlobalSchedHandle,
    pub rgroup: fm_master::ResourceGroupHandle,
    pub domain_mgr: fm_master::domain_mgr::DomainMgrHandle,
    pub local_mgr: fm_master::local_mgr::LocalMgrHandle,
    pub domain_client: Arc<StubDomainClient>,
    pub local_client: Arc<StubLocalClient>,
}

pub async fn master_node(store: &MemoryStore, launcher: Arc<StubLauncher>) -> MasterNode {
    let config = fm_master::MasterConfig::default()
        .node_id("gs-1")
        .max_local_per_domain(2)
        .max_domain_per_domain(4)
        .recover_timeout_ms(200)
        .reschedule_interval_ms(50)
        .group_timeout_ms(500);
    let domain_client = StubDomainClient::placing_on("local-b");
    let local_client = StubLocalClient::arc();
    let (domain_mgr, domain_events) = fm_master::domain_mgr::DomainMgrActor::spawn(
        domain_client.clone(),
        Duration::from_millis(50),
        3,
        Duration::from_millis(10),
    );
    *launcher.mgr.lock() = Some(domain_mgr.clone());
    let (local_mgr, local_events) = fm_master::local_mgr::LocalMgrActor::spawn(local_client.clone());
    let global = fm_master::GlobalSchedActor::spawn(
        config.clone(),
        Arc::new(store.clone()),
        Arc::new(fm_master::DomainActivator::new(launcher)),
        domain_mgr.clone(),
        domain_events,
        local_mgr.clone(),
        local_events,
    );
    settle().await;
    let changes = global
        .subscribe_local_changes()
        .await
        .unwrap_or_else(|| panic!("global actor gone"));
    let rgroup = fm_master::ResourceGroupManager::spawn(
        config,
        Arc::new(store.clone()),
        global.clone(),
        domain_mgr.clone(),
        local_mgr.clone(),
        changes,
    );
    settle().await;
    MasterNode { global, rgroup, domain_mgr, local_mgr, domain_client, local_client }
}
