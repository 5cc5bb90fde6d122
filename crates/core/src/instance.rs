// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Instance record and lifecycle state machine.
//!
//! [`InstanceState`] encodes the per-instance lifecycle; [`InstanceState::can_transition`]
//! is the single source of truth for which moves are legal. [`InstanceInfo`] is
//! the record persisted to the meta store; `version` counts successful CAS
//! writes and `mod_revision` mirrors the store's revision of the last read.

use crate::affinity::Affinity;
use crate::errcode::ErrCode;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Tenant id that bypasses rate limiting and tenant checks.
pub const SYSTEM_TENANT_ID: &str = "0";

/// Label key reserved for the control plane; user requests must not carry it.
pub const RESERVED_TENANT_LABEL: &str = "tenantId";

/// Lifecycle state of one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    #[default]
    New,
    Scheduling,
    Creating,
    Running,
    SubHealth,
    Failed,
    ScheduleFailed,
    Evicting,
    Evicted,
    Exiting,
    Exited,
    Fatal,
}

impl InstanceState {
    /// Terminal states accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            InstanceState::Exited
                | InstanceState::Evicted
                | InstanceState::Fatal
                | InstanceState::ScheduleFailed
        )
    }

    /// Whether moving from `self` to `to` is a legal lifecycle transition.
    pub fn can_transition(self, to: InstanceState) -> bool {
        use InstanceState::*;
        if self.is_terminal() {
            return false;
        }
        // Kill with a shutdown signal may interrupt any non-terminal state.
        if to == Exiting {
            return true;
        }
        matches!(
            (self, to),
            (New, Scheduling)
                | (Scheduling, Scheduling)
                | (Scheduling, Creating)
                | (Scheduling, ScheduleFailed)
                | (Creating, Running)
                | (Creating, Failed)
                | (Creating, Fatal)
                | (Running, SubHealth)
                | (SubHealth, Running)
                | (Running, Failed)
                | (SubHealth, Failed)
                | (Running, Fatal)
                | (SubHealth, Fatal)
                | (Running, Evicting)
                | (SubHealth, Evicting)
                | (Evicting, Evicted)
                | (Exiting, Exited)
                | (Failed, Scheduling)
                | (Failed, Fatal)
        )
    }
}

crate::simple_display! {
    InstanceState {
        New => "new",
        Scheduling => "scheduling",
        Creating => "creating",
        Running => "running",
        SubHealth => "sub-health",
        Failed => "failed",
        ScheduleFailed => "schedule-failed",
        Evicting => "evicting",
        Evicted => "evicted",
        Exiting => "exiting",
        Exited => "exited",
        Fatal => "fatal",
    }
}

/// A transition was rejected by the lifecycle table.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid transition {from} -> {to}")]
pub struct TransitionError {
    pub from: InstanceState,
    pub to: InstanceState,
}

/// Heterogeneous device request. Either `count` alone, or exactly
/// (`memory_mb`, `latency_us`, `stream`) together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct HeteroResource {
    /// Vendor match pattern (regex).
    pub vendor: String,
    /// Product match pattern (regex).
    pub product: String,
    /// Resource kind, e.g. an accelerator family name.
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_us: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<u32>,
}

/// Scalar resource demand of one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Resources {
    /// CPU demand in millicores.
    pub cpu_milli: u64,
    /// Memory demand in MB.
    pub memory_mb: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hetero: Vec<HeteroResource>,
}

impl Resources {
    pub fn new(cpu_milli: u64, memory_mb: u64) -> Self {
        Self { cpu_milli, memory_mb, hetero: Vec::new() }
    }
}

/// Placement options attached to a schedule request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ScheduleOption {
    /// Named scheduling policy, e.g. "monopoly".
    #[serde(default)]
    pub policy: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub timeout_ms: u64,
    #[serde(default)]
    pub preempted_allowed: bool,
    #[serde(default)]
    pub affinity: Affinity,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub node_selector: IndexMap<String, String>,
    /// Resource group this instance must land inside, if any.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_group: String,
    #[serde(default)]
    pub graceful_shutdown_sec: u32,
}

/// Last observed status of an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct InstanceStatus {
    pub state: InstanceState,
    #[serde(default)]
    pub err_code: ErrCode,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub exit_code: i32,
    #[serde(default)]
    pub exit_type: String,
}

impl InstanceStatus {
    pub fn new(state: InstanceState) -> Self {
        Self { state, ..Default::default() }
    }
}

/// The authoritative per-instance record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct InstanceInfo {
    pub instance_id: String,
    pub request_id: String,
    #[serde(default)]
    pub trace_id: String,
    #[serde(default)]
    pub job_id: String,
    #[serde(default)]
    pub parent_id: String,
    pub function: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub resources: Resources,
    #[serde(default)]
    pub schedule_option: ScheduleOption,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub create_options: IndexMap<String, String>,
    #[serde(default)]
    pub status: InstanceStatus,
    /// Monotonic count of successful CAS writes.
    #[serde(default)]
    pub version: u64,
    /// Store mod-revision of the last read, used as the CAS expectation.
    #[serde(default)]
    pub mod_revision: i64,
    /// Owning local scheduler; only the current owner may change it.
    #[serde(default)]
    pub function_proxy_id: String,
    /// Owning worker agent, set once a schedule decision lands.
    #[serde(default)]
    pub function_agent_id: String,
    #[serde(default)]
    pub runtime_id: String,
    #[serde(default)]
    pub runtime_address: String,
    /// Remaining reschedule budget; strictly decreasing across reschedules.
    #[serde(default)]
    pub schedule_times: u32,
    #[serde(default)]
    pub deploy_times: u32,
    #[serde(default)]
    pub low_reliability: bool,
    #[serde(default)]
    pub is_system_func: bool,
}

impl InstanceInfo {
    pub fn state(&self) -> InstanceState {
        self.status.state
    }

    /// Whether recovery may reschedule this instance again.
    pub fn recoverable(&self) -> bool {
        self.schedule_times > 0 && !self.low_reliability
    }

    /// App drivers own a whole job; their exit tears the job down.
    pub fn is_driver(&self) -> bool {
        self.create_options.get("kind").is_some_and(|k| k == "driver")
    }
}

crate::builder! {
    pub struct InstanceInfoBuilder => InstanceInfo {
        into {
            instance_id: String = "ins-test",
            request_id: String = "req-test",
            function: String = "tenant/func",
            tenant_id: String = "t1",
            function_proxy_id: String = "",
            parent_id: String = "",
            job_id: String = "",
        }
        set {
            resources: Resources = Resources::new(500, 128),
            status: InstanceStatus = InstanceStatus::default(),
            version: u64 = 0,
            schedule_times: u32 = 2,
        }
    }
}

#[cfg(test)]
#[path = "instance_tests.rs"]
mod tests;
