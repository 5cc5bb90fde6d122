// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::group::{BundleSpec, GroupPolicy, ResourceGroup};
use crate::instance::{InstanceInfo, InstanceState, InstanceStatus, Resources};

// ── Proptest strategies ─────────────────────────────────────────────────

/// Proptest strategies for core lifecycle types.
pub mod strategies {
    use crate::instance::InstanceState;
    use proptest::prelude::*;

    pub fn arb_instance_state() -> impl Strategy<Value = InstanceState> {
        prop_oneof![
            Just(InstanceState::New),
            Just(InstanceState::Scheduling),
            Just(InstanceState::Creating),
            Just(InstanceState::Running),
            Just(InstanceState::SubHealth),
            Just(InstanceState::Failed),
            Just(InstanceState::ScheduleFailed),
            Just(InstanceState::Evicting),
            Just(InstanceState::Evicted),
            Just(InstanceState::Exiting),
            Just(InstanceState::Exited),
            Just(InstanceState::Fatal),
        ]
    }
}

// ── Record factory functions ────────────────────────────────────────────

pub fn instance_in_state(id: &str, state: InstanceState) -> InstanceInfo {
    InstanceInfo {
        instance_id: id.to_string(),
        request_id: format!("req-{id}"),
        function: "t1/func".to_string(),
        tenant_id: "t1".to_string(),
        resources: Resources::new(500, 128),
        status: InstanceStatus::new(state),
        schedule_times: 2,
        ..Default::default()
    }
}

pub fn two_bundle_group(name: &str, tenant: &str, policy: GroupPolicy) -> ResourceGroup {
    ResourceGroup::assemble(
        name,
        tenant,
        "",
        0,
        policy,
        format!("req-{name}"),
        vec![
            BundleSpec { resources: Resources::new(1000, 256), ..Default::default() },
            BundleSpec { resources: Resources::new(1000, 256), ..Default::default() },
        ],
    )
}
