// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Messages between a local scheduler, its function agents, and runtimes.

use fm_core::{ErrCode, InstanceInfo};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Resolved function metadata, cached by the instance controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FunctionMeta {
    pub function: String,
    pub entry_file: String,
    pub language: String,
    /// Code artifact location.
    pub code_uri: String,
    pub code_hash: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub layers: Vec<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub mounts: IndexMap<String, String>,
    #[serde(default)]
    pub is_system_func: bool,
}

/// Ask a function agent to launch a runtime for an instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployInstanceRequest {
    pub instance: InstanceInfo,
    pub meta: FunctionMeta,
    /// Opaque deploy credentials for the agent.
    #[serde(default)]
    pub credentials: String,
}

/// Agent reply to a deploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployInstanceResponse {
    pub code: ErrCode,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub runtime_id: String,
    #[serde(default)]
    pub runtime_address: String,
}

/// Runtime readiness probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessRequest {
    pub instance_id: String,
    pub runtime_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub code: ErrCode,
    #[serde(default)]
    pub message: String,
}

/// The captured init call replayed into a fresh runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitCallRequest {
    pub instance_id: String,
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<u8>,
    #[serde(default)]
    pub timeout_ms: u64,
}

/// Periodic liveness probe into the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub instance_id: String,
    pub runtime_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub code: ErrCode,
    /// Health-check code reported by the runtime; non-zero maps the
    /// instance into sub-health.
    #[serde(default)]
    pub health_code: i32,
}

/// Graceful stop of the runtime process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownRequest {
    pub instance_id: String,
    #[serde(default)]
    pub grace_period_sec: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownResponse {
    pub code: ErrCode,
    #[serde(default)]
    pub message: String,
}

/// Hard kill of the runtime at the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillRuntimeRequest {
    pub instance_id: String,
    pub runtime_id: String,
    /// Set when a recovery pipeline issues the kill before redeploying.
    #[serde(default)]
    pub recovering: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillRuntimeResponse {
    pub code: ErrCode,
    #[serde(default)]
    pub message: String,
}

/// Exit information the agent reports for a dead runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RuntimeExitInfo {
    /// True when the runtime process no longer exists on the worker.
    pub runtime_gone: bool,
    #[serde(default)]
    pub exit_code: i32,
    #[serde(default)]
    pub exit_type: String,
    #[serde(default)]
    pub message: String,
}
