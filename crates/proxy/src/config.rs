// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Instance controller configuration.

/// Ceiling on the init-call timeout a caller may request.
pub const MAX_INIT_CALL_TIMEOUT_MS: u64 = 60 * 60 * 1000;

/// Tenants whose limiters saw no traffic for this long are dropped.
pub const RATE_LIMITER_IDLE_MS: u64 = 6 * 60 * 60 * 1000;

/// Tunables of one local scheduler's instance controller.
#[derive(Debug, Clone)]
pub struct InstanceCtrlConfig {
    /// Identity of this local scheduler (the owner id written to records).
    pub node_id: String,
    pub min_cpu_milli: u64,
    pub max_cpu_milli: u64,
    pub min_memory_mb: u64,
    pub max_memory_mb: u64,
    /// Token bucket capacity per tenant; refill is capacity per second.
    pub rate_limit_capacity: u64,
    pub max_redeploy_times: u32,
    pub max_reconnect_times: u32,
    pub reconnect_interval_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub runtime_heartbeat_timeout_ms: u64,
    pub max_heartbeat_timeout_times: u32,
    pub max_forward_schedule_retry_times: u32,
    pub max_forward_kill_retry_times: u32,
    pub max_forward_kill_retry_cycle_ms: u64,
    pub max_get_local_aid_times: u32,
    pub enable_tenant_affinity: bool,
    pub enable_priority: bool,
    /// Default reschedule budget stamped onto new instances.
    pub recover_retry_times: u32,
}

impl Default for InstanceCtrlConfig {
    fn default() -> Self {
        Self {
            node_id: "local-scheduler".to_string(),
            min_cpu_milli: 100,
            max_cpu_milli: 64_000,
            min_memory_mb: 64,
            max_memory_mb: 512_000,
            rate_limit_capacity: 100,
            max_redeploy_times: 3,
            max_reconnect_times: 3,
            reconnect_interval_ms: 1000,
            heartbeat_interval_ms: 3000,
            runtime_heartbeat_timeout_ms: 3000,
            max_heartbeat_timeout_times: 3,
            max_forward_schedule_retry_times: 3,
            max_forward_kill_retry_times: 3,
            max_forward_kill_retry_cycle_ms: 1000,
            max_get_local_aid_times: 3,
            enable_tenant_affinity: true,
            enable_priority: false,
            recover_retry_times: 2,
        }
    }
}

impl InstanceCtrlConfig {
    fm_core::setters! {
        into {
            node_id: String,
        }
        set {
            min_cpu_milli: u64,
            max_cpu_milli: u64,
            min_memory_mb: u64,
            max_memory_mb: u64,
            rate_limit_capacity: u64,
            max_redeploy_times: u32,
            max_reconnect_times: u32,
            reconnect_interval_ms: u64,
            heartbeat_interval_ms: u64,
            runtime_heartbeat_timeout_ms: u64,
            max_heartbeat_timeout_times: u32,
            max_forward_schedule_retry_times: u32,
            max_forward_kill_retry_times: u32,
            max_forward_kill_retry_cycle_ms: u64,
            max_get_local_aid_times: u32,
            enable_tenant_affinity: bool,
            enable_priority: bool,
            recover_retry_times: u32,
        }
    }
}
