// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client contracts of the instance controller.
//!
//! Transports are external; the controller depends on these call shapes:
//! the worker's function agent, the runtime control-plane stream, the
//! upward scheduling path, peer locals, and locally connected creators.

use async_trait::async_trait;
use fm_wire::{
    CallResult, CallResultAck, DeployInstanceRequest, DeployInstanceResponse,
    ForwardCallResultRequest, ForwardCallResultResponse, ForwardCustomSignalRequest,
    HeartbeatRequest, HeartbeatResponse, InitCallRequest, KillRequest, KillResponse,
    KillRuntimeRequest, KillRuntimeResponse, ReadinessRequest, ReadinessResponse, RuntimeExitInfo,
    ScheduleRequest, ScheduleResponse, ShutdownRequest, ShutdownResponse,
};
use thiserror::Error;

/// A call to an external collaborator failed at the transport level.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("peer {0} unreachable")]
    Unreachable(String),
    #[error("call to {0} timed out")]
    Timeout(String),
    #[error("transport error: {0}")]
    Transport(String),
}

/// The worker-host daemon that launches and kills runtime processes.
#[async_trait]
pub trait FunctionAgentClient: Send + Sync {
    async fn deploy(
        &self,
        agent_id: &str,
        req: DeployInstanceRequest,
    ) -> Result<DeployInstanceResponse, ClientError>;

    async fn kill_runtime(
        &self,
        agent_id: &str,
        req: KillRuntimeRequest,
    ) -> Result<KillRuntimeResponse, ClientError>;

    /// Exit information for a runtime the agent may still know about.
    async fn query_exit_info(
        &self,
        agent_id: &str,
        instance_id: &str,
    ) -> Result<RuntimeExitInfo, ClientError>;
}

/// The control-plane stream into one runtime process.
#[async_trait]
pub trait RuntimeClient: Send + Sync {
    /// Open (or reopen) the control stream.
    async fn connect(&self, address: &str) -> Result<(), ClientError>;

    async fn readiness(
        &self,
        address: &str,
        req: ReadinessRequest,
    ) -> Result<ReadinessResponse, ClientError>;

    /// Send the captured init call and await the matching call result.
    async fn init_call(
        &self,
        address: &str,
        req: InitCallRequest,
    ) -> Result<CallResult, ClientError>;

    async fn heartbeat(
        &self,
        address: &str,
        req: HeartbeatRequest,
    ) -> Result<HeartbeatResponse, ClientError>;

    async fn shutdown(
        &self,
        address: &str,
        req: ShutdownRequest,
    ) -> Result<ShutdownResponse, ClientError>;

    /// Snapshot runtime state before first run; failures are tolerated.
    async fn checkpoint(&self, address: &str, instance_id: &str) -> Result<(), ClientError>;

    async fn signal(&self, address: &str, req: KillRequest) -> Result<KillResponse, ClientError>;

    /// Drop the stream for an instance.
    async fn close(&self, instance_id: &str);
}

/// The upward scheduling path (local manager → global → root domain).
#[async_trait]
pub trait UpstreamScheduler: Send + Sync {
    async fn forward_schedule(&self, req: ScheduleRequest)
        -> Result<ScheduleResponse, ClientError>;
}

/// Other local schedulers, addressed through the route records.
#[async_trait]
pub trait PeerProxy: Send + Sync {
    /// Resolve a local scheduler id to a reachable address.
    async fn resolve_local(&self, proxy_id: &str) -> Option<String>;

    /// Fire-and-forget delivery; the reply arrives as a separate message
    /// and is matched back through the signal correlation map.
    async fn forward_custom_signal(
        &self,
        address: &str,
        req: ForwardCustomSignalRequest,
    ) -> Result<(), ClientError>;

    async fn forward_call_result(
        &self,
        address: &str,
        req: ForwardCallResultRequest,
    ) -> Result<ForwardCallResultResponse, ClientError>;

    async fn kill_remote(
        &self,
        address: &str,
        req: KillRequest,
    ) -> Result<KillResponse, ClientError>;
}

/// Delivery of call results to creators connected to this local.
#[async_trait]
pub trait CreatorSink: Send + Sync {
    async fn deliver(
        &self,
        dst_instance_id: &str,
        result: CallResult,
    ) -> Result<CallResultAck, ClientError>;
}
