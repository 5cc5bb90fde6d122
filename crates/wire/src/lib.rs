// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire protocol for control-plane communication.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod deploy;
mod framing;
mod group;
mod kill;
mod query;
mod schedule;
mod sync;
mod topology;

pub use deploy::{
    DeployInstanceRequest, DeployInstanceResponse, FunctionMeta, HeartbeatRequest,
    HeartbeatResponse, InitCallRequest, KillRuntimeRequest, KillRuntimeResponse, ReadinessRequest,
    ReadinessResponse, RuntimeExitInfo, ShutdownRequest, ShutdownResponse,
};
pub use framing::{decode, encode, read_message, write_message, ProtocolError};
pub use group::{
    CreateResourceGroupRequest, CreateResourceGroupResponse, GroupScheduleRequest,
    GroupScheduleResponse, QueryResourceGroupRequest, QueryResourceGroupResponse,
    RemoveBundleRequest, RemoveBundleResponse, ReportAgentAbnormalRequest,
};
pub use kill::{
    CallResult, CallResultAck, ForwardCallResultRequest, ForwardCallResultResponse,
    ForwardCustomSignalRequest, ForwardCustomSignalResponse, KillRequest, KillResponse,
};
pub use query::{
    decode_external_agent_id, encode_external_agent_id, AgentInfo, EvictAgentRequest,
    QueryAgentInfoRequest, QueryAgentInfoResponse, QueryInstancesInfoRequest,
    QueryInstancesInfoResponse, QueryResourcesInfoRequest, QueryResourcesInfoResponse,
    ResourceUnit, RouteInfo,
};
pub use schedule::{ScheduleRequest, ScheduleResponse};
pub use sync::{RequestSync, SyncError};
pub use topology::{RegisterAck, RegisterRequest, ScheduleTopology, SchedulerKind, SchedulerNode};
