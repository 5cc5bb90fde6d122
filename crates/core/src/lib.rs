// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fm-core: Domain types for the Funcmesh control plane.

pub mod macros;

pub mod affinity;
pub mod clock;
pub mod errcode;
pub mod group;
pub mod id;
pub mod instance;
pub mod node;
pub mod signal;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use affinity::{Affinity, Condition, LabelExpression, LabelOp, Selector};
pub use clock::{Clock, FakeClock, SystemClock};
pub use errcode::ErrCode;
pub use group::{
    bundle_id, parse_bundle_id, BundleIndex, BundleInfo, BundleSpec, BundleState, GroupPolicy,
    ResourceGroup, ResourceGroupState,
};
pub use id::{gen_request_id, gen_runtime_id, short, validate_instance_id, InvalidInstanceId};
#[cfg(any(test, feature = "test-support"))]
pub use instance::InstanceInfoBuilder;
pub use instance::{
    HeteroResource, InstanceInfo, InstanceState, InstanceStatus, Resources, ScheduleOption,
    TransitionError, RESERVED_TENANT_LABEL, SYSTEM_TENANT_ID,
};
pub use node::{NodeInfo, NodeState};
pub use signal::{Signal, SignalError};
