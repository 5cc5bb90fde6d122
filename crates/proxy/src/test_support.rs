// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recording fakes for the controller's collaborators.

use crate::clients::{
    ClientError, CreatorSink, FunctionAgentClient, PeerProxy, RuntimeClient, UpstreamScheduler,
};
use crate::decision::{DecisionOutcome, ScheduleDecision};
use crate::meta::FunctionMetaStore;
use async_trait::async_trait;
use fm_core::ErrCode;
use fm_wire::{
    CallResult, CallResultAck, DeployInstanceRequest, DeployInstanceResponse,
    ForwardCallResultRequest, ForwardCallResultResponse, ForwardCustomSignalRequest,
    FunctionMeta, HeartbeatRequest, HeartbeatResponse, InitCallRequest, KillRequest, KillResponse,
    KillRuntimeRequest, KillRuntimeResponse, ReadinessRequest, ReadinessResponse, RuntimeExitInfo,
    ScheduleRequest, ScheduleResponse, ShutdownRequest, ShutdownResponse,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct FakeMetaStore {
    pub metas: Mutex<HashMap<String, FunctionMeta>>,
    pub fetches: AtomicU32,
}

impl FakeMetaStore {
    pub fn with(function: &str) -> Arc<Self> {
        let meta = FunctionMeta {
            function: function.to_string(),
            entry_file: "main.py".to_string(),
            language: "python".to_string(),
            code_uri: "bucket/code.zip".to_string(),
            code_hash: "abc123".to_string(),
            ..Default::default()
        };
        let store = Self { metas: Mutex::new(HashMap::new()), fetches: AtomicU32::new(0) };
        store.metas.lock().insert(function.to_string(), meta);
        Arc::new(store)
    }
}

#[async_trait]
impl FunctionMetaStore for FakeMetaStore {
    async fn fetch(&self, function: &str) -> Result<Option<FunctionMeta>, ClientError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.metas.lock().get(function).cloned())
    }
}

#[derive(Default)]
pub struct FakeAgent {
    /// Deploys that fail before the first success.
    pub deploy_failures: AtomicU32,
    pub deploys: AtomicU32,
    pub killed_runtimes: Mutex<Vec<String>>,
    pub exit_info: Mutex<RuntimeExitInfo>,
}

impl FakeAgent {
    pub fn arc() -> Arc<Self> {
        Arc::new(Self {
            exit_info: Mutex::new(RuntimeExitInfo { runtime_gone: true, ..Default::default() }),
            ..Default::default()
        })
    }
}

#[async_trait]
impl FunctionAgentClient for FakeAgent {
    async fn deploy(
        &self,
        _agent_id: &str,
        req: DeployInstanceRequest,
    ) -> Result<DeployInstanceResponse, ClientError> {
        let n = self.deploys.fetch_add(1, Ordering::SeqCst);
        if n < self.deploy_failures.load(Ordering::SeqCst) {
            return Ok(DeployInstanceResponse {
                code: ErrCode::InnerSystemError,
                message: "deploy refused".to_string(),
                runtime_id: String::new(),
                runtime_address: String::new(),
            });
        }
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
        req: KillRuntimeRequest,
    ) -> Result<KillRuntimeResponse, ClientError> {
        self.killed_runtimes.lock().push(req.instance_id);
        Ok(KillRuntimeResponse { code: ErrCode::None, message: String::new() })
    }

    async fn query_exit_info(
        &self,
        _agent_id: &str,
        _instance_id: &str,
    ) -> Result<RuntimeExitInfo, ClientError> {
        Ok(self.exit_info.lock().clone())
    }
}

#[derive(Default)]
pub struct FakeRuntime {
    pub readiness_failures: AtomicU32,
    pub readiness_probes: AtomicU32,
    pub init_calls: AtomicU32,
    pub init_delay_ms: AtomicU64,
    pub init_fail: AtomicBool,
    pub heartbeat_fail: AtomicBool,
    pub health_code: Mutex<i32>,
    pub shutdowns: Mutex<Vec<String>>,
    pub signals: Mutex<Vec<(String, i32)>>,
    pub closed: Mutex<Vec<String>>,
}

impl FakeRuntime {
    pub fn arc() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl RuntimeClient for FakeRuntime {
    async fn connect(&self, _address: &str) -> Result<(), ClientError> {
        Ok(())
    }

    async fn readiness(
        &self,
        _address: &str,
        _req: ReadinessRequest,
    ) -> Result<ReadinessResponse, ClientError> {
        let n = self.readiness_probes.fetch_add(1, Ordering::SeqCst);
        if n < self.readiness_failures.load(Ordering::SeqCst) {
            return Err(ClientError::Timeout("readiness".to_string()));
        }
        Ok(ReadinessResponse { code: ErrCode::None, message: String::new() })
    }

    async fn init_call(
        &self,
        _address: &str,
        req: InitCallRequest,
    ) -> Result<CallResult, ClientError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.init_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }
        if self.init_fail.load(Ordering::SeqCst) {
            return Ok(CallResult {
                instance_id: req.instance_id,
                request_id: req.request_id,
                code: ErrCode::UserFunctionException,
                message: "init raised".to_string(),
                exit_code: 1,
            });
        }
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
    ) -> Result<HeartbeatResponse, ClientError> {
        if self.heartbeat_fail.load(Ordering::SeqCst) {
            return Err(ClientError::Timeout("heartbeat".to_string()));
        }
        Ok(HeartbeatResponse { code: ErrCode::None, health_code: *self.health_code.lock() })
    }

    async fn shutdown(
        &self,
        _address: &str,
        req: ShutdownRequest,
    ) -> Result<ShutdownResponse, ClientError> {
        self.shutdowns.lock().push(req.instance_id);
        Ok(ShutdownResponse { code: ErrCode::None, message: String::new() })
    }

    async fn checkpoint(&self, _address: &str, _instance_id: &str) -> Result<(), ClientError> {
        Ok(())
    }

    async fn signal(&self, _address: &str, req: KillRequest) -> Result<KillResponse, ClientError> {
        self.signals.lock().push((req.instance_id.clone(), req.signal.as_i32()));
        Ok(KillResponse::ok(&req.instance_id))
    }

    async fn close(&self, instance_id: &str) {
        self.closed.lock().push(instance_id.to_string());
    }
}

pub struct FakeDecision {
    pub outcome: Mutex<DecisionOutcome>,
    pub released: Mutex<Vec<String>>,
}

impl FakeDecision {
    pub fn placing(agent_id: &str) -> Arc<Self> {
        Arc::new(Self {
            outcome: Mutex::new(DecisionOutcome::Success {
                agent_id: agent_id.to_string(),
                device_options: Vec::new(),
            }),
            released: Mutex::new(Vec::new()),
        })
    }

    pub fn refusing() -> Arc<Self> {
        Arc::new(Self {
            outcome: Mutex::new(DecisionOutcome::ResourceNotEnough),
            released: Mutex::new(Vec::new()),
        })
    }
}

impl ScheduleDecision for FakeDecision {
    fn decide(&self, _instance: &fm_core::InstanceInfo) -> DecisionOutcome {
        self.outcome.lock().clone()
    }

    fn release(&self, instance_id: &str) {
        self.released.lock().push(instance_id.to_string());
    }
}

#[derive(Default)]
pub struct FakeUpstream {
    pub code: Mutex<ErrCode>,
    pub forwards: AtomicU32,
    pub scheduled_on: Mutex<String>,
}

impl FakeUpstream {
    pub fn refusing() -> Arc<Self> {
        Arc::new(Self { code: Mutex::new(ErrCode::ResourceNotEnough), ..Default::default() })
    }

    pub fn accepting(local: &str) -> Arc<Self> {
        Arc::new(Self {
            code: Mutex::new(ErrCode::None),
            forwards: AtomicU32::new(0),
            scheduled_on: Mutex::new(local.to_string()),
        })
    }
}

#[async_trait]
impl UpstreamScheduler for FakeUpstream {
    async fn forward_schedule(
        &self,
        req: ScheduleRequest,
    ) -> Result<ScheduleResponse, ClientError> {
        self.forwards.fetch_add(1, Ordering::SeqCst);
        let code = *self.code.lock();
        let mut resp = ScheduleResponse::new(&req, code, "");
        resp.scheduled_on = self.scheduled_on.lock().clone();
        Ok(resp)
    }
}

pub struct FakePeers {
    pub locals: Mutex<HashMap<String, String>>,
    pub forwarded_signals: Mutex<Vec<ForwardCustomSignalRequest>>,
    pub forwarded_results: Mutex<Vec<ForwardCallResultRequest>>,
    pub remote_kills: Mutex<Vec<KillRequest>>,
    /// Set by tests that want to see forwards as they happen.
    pub signal_tx: Mutex<Option<mpsc::UnboundedSender<ForwardCustomSignalRequest>>>,
}

impl FakePeers {
    pub fn arc() -> Arc<Self> {
        Arc::new(Self {
            locals: Mutex::new(HashMap::new()),
            forwarded_signals: Mutex::new(Vec::new()),
            forwarded_results: Mutex::new(Vec::new()),
            remote_kills: Mutex::new(Vec::new()),
            signal_tx: Mutex::new(None),
        })
    }
}

#[async_trait]
impl PeerProxy for FakePeers {
    async fn resolve_local(&self, proxy_id: &str) -> Option<String> {
        self.locals.lock().get(proxy_id).cloned()
    }

    async fn forward_custom_signal(
        &self,
        _address: &str,
        req: ForwardCustomSignalRequest,
    ) -> Result<(), ClientError> {
        self.forwarded_signals.lock().push(req.clone());
        if let Some(tx) = self.signal_tx.lock().as_ref() {
            let _ = tx.send(req);
        }
        Ok(())
    }

    async fn forward_call_result(
        &self,
        _address: &str,
        req: ForwardCallResultRequest,
    ) -> Result<ForwardCallResultResponse, ClientError> {
        let request_id = req.result.request_id.clone();
        self.forwarded_results.lock().push(req);
        Ok(ForwardCallResultResponse {
            request_id,
            ack: CallResultAck { code: ErrCode::None, message: String::new() },
        })
    }

    async fn kill_remote(
        &self,
        _address: &str,
        req: KillRequest,
    ) -> Result<KillResponse, ClientError> {
        self.remote_kills.lock().push(req.clone());
        Ok(KillResponse::ok(&req.instance_id))
    }
}

#[derive(Default)]
pub struct FakeCreatorSink {
    pub delivered: Mutex<Vec<(String, CallResult)>>,
}

impl FakeCreatorSink {
    pub fn arc() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl CreatorSink for FakeCreatorSink {
    async fn deliver(
        &self,
        dst_instance_id: &str,
        result: CallResult,
    ) -> Result<CallResultAck, ClientError> {
        self.delivered.lock().push((dst_instance_id.to_string(), result));
        Ok(CallResultAck { code: ErrCode::None, message: String::new() })
    }
}
