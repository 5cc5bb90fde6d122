// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource groups and bundles.
//!
//! A resource group gang-schedules an ordered sequence of bundles, each a
//! resource reservation on one local scheduler. Bundle ids are derived
//! deterministically so they stay stable across restart-plus-recovery.

use crate::affinity::{Affinity, LabelExpression, Selector};
use crate::instance::Resources;
use serde::{Deserialize, Serialize};

/// Owner value for a top-level group.
pub const PRIMARY_OWNER: &str = "primary";

/// Label key bundles of a group are tagged with for affinity matching.
pub const RGROUP_LABEL: &str = "rgroup";

/// Placement policy across the bundles of one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GroupPolicy {
    #[default]
    None,
    Pack,
    Spread,
    StrictPack,
    StrictSpread,
}

crate::simple_display! {
    GroupPolicy {
        None => "none",
        Pack => "pack",
        Spread => "spread",
        StrictPack => "strict-pack",
        StrictSpread => "strict-spread",
    }
}

impl GroupPolicy {
    /// Inner-group affinity rules the policy implies for each bundle.
    pub fn inner_affinity(self, group_name: &str) -> Affinity {
        let same_group = |preferred: bool| {
            Selector::new(
                preferred,
                vec![vec![LabelExpression::label_in(
                    RGROUP_LABEL,
                    vec![group_name.to_string()],
                )]],
            )
        };
        match self {
            GroupPolicy::Pack => {
                Affinity { preferred: Some(same_group(true)), ..Default::default() }
            }
            GroupPolicy::Spread => {
                Affinity { preferred_anti: Some(same_group(true)), ..Default::default() }
            }
            GroupPolicy::StrictSpread => {
                Affinity { required_anti: Some(same_group(false)), ..Default::default() }
            }
            GroupPolicy::None | GroupPolicy::StrictPack => Affinity::default(),
        }
    }
}

/// One requested reservation inside a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BundleSpec {
    pub resources: Resources,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    /// Placement rules; the group policy's inner-group affinity is merged
    /// in when the group is assembled.
    #[serde(default, skip_serializing_if = "Affinity::is_empty_ref")]
    pub affinity: Affinity,
}

/// Materialization state of one bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BundleState {
    #[default]
    Pending,
    Created,
}

/// A materialized reservation. `Created` implies a non-empty proxy id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleInfo {
    pub bundle_id: String,
    pub parent_group: String,
    pub tenant_id: String,
    pub spec: BundleSpec,
    /// Local scheduler hosting the reservation, empty while pending.
    #[serde(default)]
    pub function_proxy_id: String,
    #[serde(default)]
    pub state: BundleState,
}

/// Lifecycle state of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResourceGroupState {
    #[default]
    Pending,
    Created,
    Failed,
}

/// A gang-scheduled set of reservations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceGroup {
    pub name: String,
    pub tenant_id: String,
    /// Parent group name, or [`PRIMARY_OWNER`] for a top-level group.
    pub owner: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub policy: GroupPolicy,
    pub bundles: Vec<BundleInfo>,
    #[serde(default)]
    pub state: ResourceGroupState,
    /// Request that created the group; part of every bundle id.
    pub request_id: String,
}

impl ResourceGroup {
    /// Assemble a group from specs, materializing one pending bundle per spec.
    pub fn assemble(
        name: impl Into<String>,
        tenant_id: impl Into<String>,
        owner: impl Into<String>,
        priority: i32,
        policy: GroupPolicy,
        request_id: impl Into<String>,
        specs: Vec<BundleSpec>,
    ) -> Self {
        let name = name.into();
        let tenant_id = tenant_id.into();
        let request_id = request_id.into();
        let mut owner = owner.into();
        if owner.is_empty() {
            owner = PRIMARY_OWNER.to_string();
        }
        let inner = policy.inner_affinity(&name);
        let bundles = specs
            .into_iter()
            .enumerate()
            .map(|(index, mut spec)| {
                spec.affinity.merge_missing(inner.clone());
                BundleInfo {
                    bundle_id: bundle_id(&name, &request_id, index as i32),
                    parent_group: name.clone(),
                    tenant_id: tenant_id.clone(),
                    spec,
                    function_proxy_id: String::new(),
                    state: BundleState::Pending,
                }
            })
            .collect();
        Self {
            name,
            tenant_id,
            owner,
            priority,
            policy,
            bundles,
            state: ResourceGroupState::Pending,
            request_id,
        }
    }

    /// Locals hosting at least one bundle of this group.
    pub fn hosting_proxies(&self) -> std::collections::BTreeSet<String> {
        self.bundles
            .iter()
            .filter(|b| !b.function_proxy_id.is_empty())
            .map(|b| b.function_proxy_id.clone())
            .collect()
    }

    pub fn pending_bundles(&self) -> impl Iterator<Item = &BundleInfo> {
        self.bundles.iter().filter(|b| b.state == BundleState::Pending)
    }
}

/// Deterministic bundle id: `{len(name)}_{name}_{requestID}_{index}`.
pub fn bundle_id(group_name: &str, request_id: &str, index: i32) -> String {
    format!("{}_{}_{}_{}", group_name.len(), group_name, request_id, index)
}

/// Reverse mapping of a bundle id back to its group coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleIndex {
    pub group_name: String,
    pub request_id: String,
    pub index: i32,
}

/// Parse a bundle id produced by [`bundle_id`]. The embedded length keeps
/// parsing unambiguous even when the group name contains underscores.
pub fn parse_bundle_id(id: &str) -> Option<BundleIndex> {
    let (len_str, rest) = id.split_once('_')?;
    let name_len: usize = len_str.parse().ok()?;
    if rest.len() < name_len + 1 {
        return None;
    }
    let (name, rest) = rest.split_at(name_len);
    let rest = rest.strip_prefix('_')?;
    let (request_id, index_str) = rest.rsplit_once('_')?;
    let index: i32 = index_str.parse().ok()?;
    if request_id.is_empty() {
        return None;
    }
    Some(BundleIndex {
        group_name: name.to_string(),
        request_id: request_id.to_string(),
        index,
    })
}

#[cfg(test)]
#[path = "group_tests.rs"]
mod tests;
