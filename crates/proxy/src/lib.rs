// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fm-proxy: instance control on a local scheduler.
//!
//! Owns the authoritative per-instance state machines, drives the dispatch
//! pipeline from schedule request to running runtime, watches runtime
//! health, and routes kill/custom signals to whichever local owns the
//! target instance.

pub mod clients;
pub mod config;
pub mod controller;
pub mod decision;
pub mod machine;
pub mod meta;
pub mod rate_limit;
pub mod validate;

#[cfg(test)]
pub(crate) mod test_support;

pub use clients::{ClientError, CreatorSink, FunctionAgentClient, PeerProxy, RuntimeClient,
    UpstreamScheduler};
pub use config::InstanceCtrlConfig;
pub use controller::InstanceController;
pub use decision::{DecisionOutcome, ScheduleDecision};
pub use machine::{InstanceControlView, SaveOutcome, StateMachineError};
pub use meta::FunctionMetaStore;
pub use rate_limit::TenantRateLimiter;
