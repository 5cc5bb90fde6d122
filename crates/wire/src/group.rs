// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource-group creation, gang scheduling, and bundle removal messages.

use fm_core::{BundleSpec, ErrCode, GroupPolicy, ResourceGroup};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Caller request to create a resource group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateResourceGroupRequest {
    #[serde(rename = "requestID")]
    pub request_id: String,
    pub name: String,
    pub tenant_id: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub policy: GroupPolicy,
    pub bundles: Vec<BundleSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateResourceGroupResponse {
    pub request_id: String,
    pub code: ErrCode,
    #[serde(default)]
    pub message: String,
}

/// Gang-schedule request sent to the root domain's group controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupScheduleRequest {
    pub request_id: String,
    pub group: ResourceGroup,
}

/// Gang-schedule reply: a node for every bundle, or a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupScheduleResponse {
    pub request_id: String,
    pub code: ErrCode,
    #[serde(default)]
    pub message: String,
    /// bundle id -> local scheduler id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub schedule_results: BTreeMap<String, String>,
}

/// Release the reservations a local holds for a group. Idempotent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveBundleRequest {
    pub tenant_id: String,
    pub group_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bundle_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveBundleResponse {
    pub code: ErrCode,
    #[serde(default)]
    pub message: String,
}

/// A local reporting one of its agents abnormal; bundles there must move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportAgentAbnormalRequest {
    pub request_id: String,
    /// Proxy (local scheduler) whose agent went abnormal.
    pub proxy_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResourceGroupRequest {
    #[serde(rename = "requestID")]
    pub request_id: String,
    #[serde(rename = "rGroupName")]
    pub group_name: String,
    #[serde(default)]
    pub tenant_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct QueryResourceGroupResponse {
    pub code: ErrCode,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<ResourceGroup>,
}
