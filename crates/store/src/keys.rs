// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Well-known meta-store keys.

/// Serialized scheduler tree snapshot.
pub const SCHEDULER_TOPOLOGY_KEY: &str = "SCHEDULER_TOPOLOGY";

/// Count of agents that finished readiness reporting.
pub const READY_AGENT_COUNT_KEY: &str = "READY_AGENT_CNT_KEY";

/// Prefix under which resource groups are persisted.
pub const RESOURCE_GROUP_PREFIX: &str = "/yr/resourcegroup/";

/// Key of one resource group record.
pub fn resource_group_key(tenant_id: &str, name: &str) -> String {
    format!("{RESOURCE_GROUP_PREFIX}{tenant_id}/{name}")
}

/// Key of one instance record.
pub fn instance_key(function: &str, instance_id: &str, request_id: &str) -> String {
    format!("/instance/{function}/{instance_id}/{request_id}")
}

/// Prefix matching every record of one instance regardless of request.
pub fn instance_prefix(function: &str, instance_id: &str) -> String {
    format!("/instance/{function}/{instance_id}/")
}

/// Compact route record used for remote instance lookup.
pub fn route_key(instance_id: &str) -> String {
    format!("/route/{instance_id}")
}
