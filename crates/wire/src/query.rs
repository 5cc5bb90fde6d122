// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fleet query and eviction messages.

use fm_core::{ErrCode, InstanceInfo};
use serde::{Deserialize, Serialize};

/// Delimiter between local id and agent id in the external agent id.
const EXTERNAL_AGENT_ID_DELIMITER: char = '/';

/// Build the externally visible agent id `{localID}/{agentID}`.
pub fn encode_external_agent_id(local_id: &str, agent_id: &str) -> String {
    format!("{local_id}{EXTERNAL_AGENT_ID_DELIMITER}{agent_id}")
}

/// Split an external agent id back into (local id, agent id).
pub fn decode_external_agent_id(external: &str) -> Option<(&str, &str)> {
    let (local_id, agent_id) = external.split_once(EXTERNAL_AGENT_ID_DELIMITER)?;
    if local_id.is_empty() || agent_id.is_empty() {
        return None;
    }
    Some((local_id, agent_id))
}

/// One worker agent known to the fleet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub local_id: String,
    pub agent_id: String,
    #[serde(default)]
    pub alias: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryAgentInfoRequest {
    pub request_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct QueryAgentInfoResponse {
    pub code: ErrCode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub agent_infos: Vec<AgentInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryInstancesInfoRequest {
    pub request_id: String,
}

/// Instances currently waiting in scheduling queues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct QueryInstancesInfoResponse {
    pub code: ErrCode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub instance_infos: Vec<InstanceInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResourcesInfoRequest {
    pub request_id: String,
}

/// One schedulable unit's capacity and allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUnit {
    pub node_id: String,
    pub cpu_total_milli: u64,
    pub cpu_used_milli: u64,
    pub memory_total_mb: u64,
    pub memory_used_mb: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct QueryResourcesInfoResponse {
    pub code: ErrCode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub units: Vec<ResourceUnit>,
}

/// Drain one agent: its instances are rescheduled elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvictAgentRequest {
    #[serde(rename = "agentId")]
    pub agent_id: String,
    #[serde(rename = "timeoutSec", default)]
    pub timeout_sec: u32,
}

/// Compact routing record stored under `/route/{instanceID}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteInfo {
    pub instance_id: String,
    pub function_proxy_id: String,
    #[serde(default)]
    pub runtime_address: String,
}

#[cfg(test)]
#[path = "query_tests.rs"]
mod tests;
